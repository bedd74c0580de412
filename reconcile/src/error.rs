//! Errors produced by the entry/exit order reconcilers (`spec.md` §4.10).

use atlas_core::{IntentId, OrderId, TradeId};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("persistence error: {0}")]
    Persistence(#[from] atlas_persistence::PersistenceError),

    #[error("tms error: {0}")]
    Tms(#[from] atlas_tms::TmsError),

    #[error("order broker error: {0}")]
    OrderBroker(#[from] atlas_broker::OrderBrokerError),

    #[error("order {0} has no broker_order_id to reconcile")]
    MissingBrokerOrderId(OrderId),

    #[error("order {order_id} references trade {trade_id} which no longer has an active row")]
    TradeNotFound { order_id: OrderId, trade_id: TradeId },

    #[error("trade intent {0} has no active row to mark EXECUTED")]
    TradeIntentNotFound(IntentId),

    #[error("rate limiter closed")]
    RateLimiterClosed,
}

impl From<atlas_integration::IntegrationError> for ReconcileError {
    fn from(err: atlas_integration::IntegrationError) -> Self {
        match err {
            atlas_integration::IntegrationError::RateLimiterClosed => ReconcileError::RateLimiterClosed,
            other => ReconcileError::OrderBroker(atlas_broker::OrderBrokerError::Integration(other)),
        }
    }
}
