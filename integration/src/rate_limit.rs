//! Bounded concurrency limiter for broker calls.
//!
//! `spec.md` §4.10/§5: "A bounded semaphore per OrderBroker instance limits
//! parallel broker calls; exceeding the limit defers the row to the next
//! cycle." This is a thin, named wrapper over [`tokio::sync::Semaphore`] so
//! call sites read as domain intent rather than raw semaphore plumbing.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Semaphore, SemaphorePermit};

use crate::error::IntegrationError;

/// A permit held for the duration of one broker call; dropping it releases
/// the slot back to the limiter.
#[derive(Debug)]
pub struct Permit<'a>(#[allow(dead_code)] SemaphorePermit<'a>);

/// Caps the number of in-flight broker calls for one adapter instance.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    semaphore: Arc<Semaphore>,
}

impl RateLimiter {
    pub fn new(max_concurrent: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(max_concurrent)),
        }
    }

    /// Awaits a permit, blocking until a slot frees up.
    pub async fn acquire(&self) -> Result<Permit<'_>, IntegrationError> {
        let permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|_| IntegrationError::RateLimiterClosed)?;
        Ok(Permit(permit))
    }

    /// Non-blocking: used by reconcilers so a row whose broker is saturated
    /// is deferred to the next cycle rather than queued (`spec.md` §4.10).
    pub fn try_acquire(&self) -> Option<Permit<'_>> {
        self.semaphore.try_acquire().ok().map(Permit)
    }

    /// Awaits a permit with a deadline; used for the 10s/5s broker-call
    /// deadlines in `spec.md` §5.
    pub async fn acquire_timeout(&self, timeout: Duration) -> Result<Permit<'_>, IntegrationError> {
        tokio::time::timeout(timeout, self.acquire())
            .await
            .map_err(|_| IntegrationError::RateLimiterClosed)?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn try_acquire_fails_once_exhausted() {
        let limiter = RateLimiter::new(1);
        let permit = limiter.try_acquire();
        assert!(permit.is_some());
        assert!(limiter.try_acquire().is_none());
        drop(permit);
        assert!(limiter.try_acquire().is_some());
    }

    #[tokio::test]
    async fn acquire_waits_for_a_freed_permit() {
        let limiter = RateLimiter::new(1);
        let held = limiter.acquire().await.unwrap();
        let limiter2 = limiter.clone();
        let waiter = tokio::spawn(async move {
            let _permit = limiter2.acquire().await.unwrap();
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        drop(held);
        waiter.await.unwrap();
    }
}
