//! Errors produced by zone detection and signal construction.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SignalsError {
    #[error("persistence error: {0}")]
    Persistence(#[from] atlas_persistence::PersistenceError),

    #[error("sms error: {0}")]
    Sms(#[from] atlas_sms::SmsError),

    #[error("market data error: {0}")]
    MarketData(#[from] atlas_marketdata::MarketDataError),
}
