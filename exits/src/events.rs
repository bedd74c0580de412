//! Telemetry events for exit detection and placement. Not the source of
//! truth — `exit_signals`/`exit_intents`/`trades` rows are — so these flow
//! through the bounded, drop-oldest [`atlas_core::EventWriter`].

use atlas_core::{ExitIntentId, ExitSignalId, TradeId};
use atlas_persistence::model::ExitReason;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ExitsEvent {
    TrailingStopArmed { trade_id: TradeId, exit_signal_id: ExitSignalId },
    ExitConditionConfirmed { trade_id: TradeId, exit_signal_id: ExitSignalId, reason: ExitReason },
    ExitOrderPlaced { trade_id: TradeId, exit_intent_id: ExitIntentId, broker_order_id: String },
    ExitOrderRejected { trade_id: TradeId, exit_intent_id: ExitIntentId, reason: String },
    ExitOrderTimedOut { trade_id: TradeId, exit_intent_id: ExitIntentId },
}
