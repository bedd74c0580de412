//! Errors produced by the validation/risk pipeline (`spec.md` §4.6).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RiskError {
    #[error("persistence error: {0}")]
    Persistence(#[from] atlas_persistence::PersistenceError),

    #[error("sms error: {0}")]
    Sms(#[from] atlas_sms::SmsError),

    #[error("signal delivery {0} not found")]
    DeliveryNotFound(atlas_core::DeliveryId),

    #[error("signal {0} not found")]
    SignalNotFound(atlas_core::SignalId),

    #[error("user broker {0} not found")]
    UserBrokerNotFound(atlas_core::UserBrokerId),
}
