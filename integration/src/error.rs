use thiserror::Error;

/// Errors produced by the resilience primitives in this crate.
#[derive(Debug, Error)]
pub enum IntegrationError {
    #[error("circuit breaker is open, calls are rejected until {retry_after_secs}s elapse")]
    CircuitOpen { retry_after_secs: u64 },

    #[error("rate limiter permit could not be acquired: semaphore closed")]
    RateLimiterClosed,
}
