//! Circuit breaker tracking consecutive broker-call failures.
//!
//! `spec.md` §4.2: "After N consecutive failures (default 10) the circuit
//! breaker opens and the adapter enters READ-ONLY mode". This type owns only
//! the CLOSED/OPEN/HALF_OPEN state transition; it is the caller's job to
//! decide what "READ-ONLY" means for its own domain (entries blocked, exits
//! still allowed).

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

use crate::error::IntegrationError;

/// `DataBroker::health().circuitBreaker` (`spec.md` §4.2).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug)]
struct Inner {
    state: CircuitState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
}

/// Opens after `failure_threshold` consecutive failures, stays open for
/// `open_duration`, then allows one probe call through in `HalfOpen`; a
/// probe success closes it, a probe failure re-opens it.
#[derive(Debug)]
pub struct CircuitBreaker {
    failure_threshold: u32,
    open_duration: Duration,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    /// `spec.md` §4.2 default: 10 consecutive failures.
    pub fn new(failure_threshold: u32, open_duration: Duration) -> Self {
        Self {
            failure_threshold,
            open_duration,
            inner: Mutex::new(Inner {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                opened_at: None,
            }),
        }
    }

    pub fn default_policy() -> Self {
        Self::new(10, Duration::from_secs(60))
    }

    pub fn state(&self) -> CircuitState {
        let mut inner = self.inner.lock();
        self.transition_if_cooled_down(&mut inner);
        inner.state
    }

    /// Call before issuing the broker call; returns `CircuitOpen` if calls are
    /// currently rejected.
    pub fn guard(&self) -> Result<(), IntegrationError> {
        let mut inner = self.inner.lock();
        self.transition_if_cooled_down(&mut inner);
        match inner.state {
            CircuitState::Open => {
                let elapsed = inner.opened_at.map(|t| t.elapsed()).unwrap_or_default();
                let retry_after = self.open_duration.saturating_sub(elapsed);
                Err(IntegrationError::CircuitOpen {
                    retry_after_secs: retry_after.as_secs(),
                })
            }
            CircuitState::Closed | CircuitState::HalfOpen => Ok(()),
        }
    }

    pub fn record_success(&self) {
        let mut inner = self.inner.lock();
        inner.consecutive_failures = 0;
        inner.state = CircuitState::Closed;
        inner.opened_at = None;
    }

    pub fn record_failure(&self) {
        let mut inner = self.inner.lock();
        inner.consecutive_failures = inner.consecutive_failures.saturating_add(1);
        if inner.state == CircuitState::HalfOpen || inner.consecutive_failures >= self.failure_threshold {
            inner.state = CircuitState::Open;
            inner.opened_at = Some(Instant::now());
        }
    }

    fn transition_if_cooled_down(&self, inner: &mut Inner) {
        if inner.state == CircuitState::Open {
            if let Some(opened_at) = inner.opened_at {
                if opened_at.elapsed() >= self.open_duration {
                    inner.state = CircuitState::HalfOpen;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opens_after_threshold_consecutive_failures() {
        let cb = CircuitBreaker::new(3, Duration::from_secs(60));
        assert_eq!(cb.state(), CircuitState::Closed);
        cb.record_failure();
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Closed);
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Open);
        assert!(cb.guard().is_err());
    }

    #[test]
    fn success_resets_failure_count() {
        let cb = CircuitBreaker::new(3, Duration::from_secs(60));
        cb.record_failure();
        cb.record_failure();
        cb.record_success();
        cb.record_failure();
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[test]
    fn half_open_failure_reopens_immediately() {
        let cb = CircuitBreaker::new(1, Duration::from_millis(1));
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Open);
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(cb.state(), CircuitState::HalfOpen);
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Open);
    }
}
