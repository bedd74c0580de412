//! Errors produced by broker adapters (`spec.md` §4.2).

use thiserror::Error;

/// Errors a [`crate::traits::DataBroker`] call can fail with.
#[derive(Debug, Error)]
pub enum DataBrokerError {
    #[error("connection error: {0}")]
    Connection(String),

    #[error("data fetch error: {0}")]
    DataFetch(String),

    #[error("session auth expired")]
    AuthExpired,

    #[error(transparent)]
    Integration(#[from] atlas_integration::IntegrationError),
}

/// Errors a [`crate::traits::OrderBroker`] call can fail with.
#[derive(Debug, Error)]
pub enum OrderBrokerError {
    #[error("insufficient funds")]
    InsufficientFunds,

    #[error("invalid symbol: {0}")]
    InvalidSymbol(String),

    #[error("order already filled")]
    AlreadyFilled,

    #[error("order not found: {0}")]
    NotFound(String),

    #[error("rate limited, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("connection error: {0}")]
    Connection(String),

    #[error(transparent)]
    Integration(#[from] atlas_integration::IntegrationError),
}
