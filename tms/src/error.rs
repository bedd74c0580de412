//! Errors produced by the trade state machine (`spec.md` §4.8).

use atlas_core::TradeId;
use atlas_persistence::model::TradeStatus;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TmsError {
    #[error("persistence error: {0}")]
    Persistence(#[from] atlas_persistence::PersistenceError),

    #[error("trade {0} has no active row")]
    TradeNotFound(TradeId),

    #[error("trade {trade_id} cannot move from {from:?} to {to:?}")]
    IllegalTransition {
        trade_id: TradeId,
        from: TradeStatus,
        to: TradeStatus,
    },

    #[error("exit quantity {exit_qty} exceeds remaining open quantity {remaining}")]
    ExitExceedsPosition { exit_qty: i64, remaining: i64 },
}
