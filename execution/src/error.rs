//! Errors produced by the execution orchestrator and order service
//! (`spec.md` §4.7).

use atlas_core::{IntentId, TradeId};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("persistence error: {0}")]
    Persistence(#[from] atlas_persistence::PersistenceError),

    #[error("tms error: {0}")]
    Tms(#[from] atlas_tms::TmsError),

    #[error("order broker error: {0}")]
    OrderBroker(#[from] atlas_broker::OrderBrokerError),

    #[error("trade intent {0} not found")]
    IntentNotFound(IntentId),

    #[error("signal {0} not found for intent")]
    SignalNotFound(atlas_core::SignalId),

    #[error("trade {0} not found")]
    TradeNotFound(TradeId),

    #[error("broker call timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("rate limiter closed")]
    RateLimiterClosed,
}

impl From<atlas_integration::IntegrationError> for ExecutionError {
    fn from(err: atlas_integration::IntegrationError) -> Self {
        match err {
            atlas_integration::IntegrationError::RateLimiterClosed => ExecutionError::RateLimiterClosed,
            other => ExecutionError::OrderBroker(atlas_broker::OrderBrokerError::Integration(other)),
        }
    }
}
