//! Top-level error aggregation for the composition root (`spec.md` §6).
//!
//! Every subsystem crate has its own narrow error enum; this is the one place
//! in the workspace that depends on all of them at once, so it's the one
//! place an aggregate makes sense (`atlas_core`'s doc comment explicitly
//! defers this here).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AtlasError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("startup gate rejected configuration: {0}")]
    StartupGate(String),

    #[error(transparent)]
    Persistence(#[from] atlas_persistence::PersistenceError),

    #[error(transparent)]
    DataBroker(#[from] atlas_broker::DataBrokerError),

    #[error(transparent)]
    OrderBroker(#[from] atlas_broker::OrderBrokerError),

    #[error(transparent)]
    Signals(#[from] atlas_signals::SignalsError),

    #[error(transparent)]
    Sms(#[from] atlas_sms::SmsError),

    #[error(transparent)]
    Risk(#[from] atlas_risk::RiskError),

    #[error(transparent)]
    Execution(#[from] atlas_execution::ExecutionError),

    #[error(transparent)]
    Tms(#[from] atlas_tms::TmsError),

    #[error(transparent)]
    Exits(#[from] atlas_exits::ExitsError),

    #[error(transparent)]
    Reconcile(#[from] atlas_reconcile::ReconcileError),

    #[error(transparent)]
    MarketData(#[from] atlas_marketdata::MarketDataError),
}
