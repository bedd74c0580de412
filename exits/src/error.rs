//! Errors produced by exit condition detection and exit order placement
//! (`spec.md` §4.9).

use atlas_core::TradeId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExitsError {
    #[error("persistence error: {0}")]
    Persistence(#[from] atlas_persistence::PersistenceError),

    #[error("sms error: {0}")]
    Sms(#[from] atlas_sms::SmsError),

    #[error("tms error: {0}")]
    Tms(#[from] atlas_tms::TmsError),

    #[error("order broker error: {0}")]
    OrderBroker(#[from] atlas_broker::OrderBrokerError),

    #[error("trade {0} not found")]
    TradeNotFound(TradeId),
}
