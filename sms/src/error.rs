//! Errors surfaced by the Signal Management Service.

use atlas_core::{ExitSignalId, SignalId, TradeId};
use atlas_persistence::model::{ExitReason, ExitSignalStatus, SignalStatus};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SmsError {
    #[error("persistence error: {0}")]
    Persistence(#[from] atlas_persistence::PersistenceError),

    #[error("signal {0} has no active row")]
    SignalNotFound(SignalId),

    #[error("exit signal {0} has no active row")]
    ExitSignalNotFound(ExitSignalId),

    #[error("illegal signal transition {from:?} -> {to:?}")]
    IllegalSignalTransition { from: SignalStatus, to: SignalStatus },

    #[error("illegal exit signal transition {from:?} -> {to:?}")]
    IllegalExitSignalTransition {
        from: ExitSignalStatus,
        to: ExitSignalStatus,
    },

    #[error("signal has effective_floor >= effective_ceiling: {0}")]
    InvalidSignal(String),

    #[error("exit episode for trade {trade_id} reason {exit_reason:?} is in cooldown")]
    InCooldown {
        trade_id: TradeId,
        exit_reason: ExitReason,
    },
}
