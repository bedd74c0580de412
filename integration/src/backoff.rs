use rand::Rng;
use std::time::Duration;

/// Exponential reconnect backoff, capped at a maximum delay.
///
/// Used by broker adapters driving `DataBroker::connect`/WebSocket reconnects
/// and by the reconcilers when a broker call needs to be retried. Each call to
/// [`ExponentialBackoff::next_delay`] doubles the previous delay (plus
/// jitter) until `max_delay` is reached; [`ExponentialBackoff::reset`] returns
/// the policy to its initial state once a call succeeds.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    initial_delay: Duration,
    max_delay: Duration,
    multiplier: f64,
    attempt: u32,
}

impl ExponentialBackoff {
    /// Reconnect policy default: 1s initial delay, capped at 5 minutes per
    /// `spec.md` §4.2 ("exponential backoff, capped at 5 minutes").
    pub fn reconnect_default() -> Self {
        Self::new(Duration::from_secs(1), Duration::from_secs(300), 2.0)
    }

    pub fn new(initial_delay: Duration, max_delay: Duration, multiplier: f64) -> Self {
        Self {
            initial_delay,
            max_delay,
            multiplier,
            attempt: 0,
        }
    }

    /// Returns the delay for the next attempt and advances internal state.
    /// Jitter is uniform in `[0.5, 1.0) * computed_delay` to avoid synchronized
    /// retries across adapters reconnecting at the same moment.
    pub fn next_delay(&mut self) -> Duration {
        let scaled = self.initial_delay.as_secs_f64() * self.multiplier.powi(self.attempt as i32);
        let capped = scaled.min(self.max_delay.as_secs_f64());
        self.attempt = self.attempt.saturating_add(1);

        let jitter_factor = rand::rng().random_range(0.5..1.0);
        Duration::from_secs_f64(capped * jitter_factor)
    }

    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_grows_and_caps_at_max() {
        let mut backoff = ExponentialBackoff::new(
            Duration::from_millis(100),
            Duration::from_millis(800),
            2.0,
        );

        let mut previous_uncapped = Duration::from_millis(100);
        for _ in 0..3 {
            let delay = backoff.next_delay();
            assert!(delay <= previous_uncapped || delay <= Duration::from_millis(800));
            previous_uncapped *= 2;
        }

        for _ in 0..10 {
            assert!(backoff.next_delay() <= Duration::from_millis(800));
        }
    }

    #[test]
    fn reset_restarts_the_sequence() {
        let mut backoff = ExponentialBackoff::reconnect_default();
        backoff.next_delay();
        backoff.next_delay();
        assert_eq!(backoff.attempt(), 2);
        backoff.reset();
        assert_eq!(backoff.attempt(), 0);
    }
}
