#![forbid(unsafe_code)]
#![warn(missing_debug_implementations, rust_2018_idioms)]

//! # Integration - Resilience Primitives
//!
//! Low-level framework shared by broker adapters and reconcilers: exponential
//! reconnect backoff ([`backoff::ExponentialBackoff`]), a circuit breaker
//! tracking consecutive failures ([`circuit_breaker::CircuitBreaker`]), and a
//! per-broker bounded concurrency limiter ([`rate_limit::RateLimiter`]).
//! Nothing here knows about ticks, orders, or any domain type — it is pure
//! concurrency/resilience plumbing, composed by `atlas-broker` and
//! `atlas-reconcile`.

pub mod backoff;
pub mod circuit_breaker;
pub mod error;
pub mod rate_limit;

pub use backoff::ExponentialBackoff;
pub use circuit_breaker::{CircuitBreaker, CircuitState};
pub use error::IntegrationError;
pub use rate_limit::RateLimiter;
