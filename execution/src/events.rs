//! Telemetry events emitted by the orchestrator and order service. Not the
//! source of truth — `trades`/`orders` rows are — so these flow through the
//! bounded, drop-oldest [`atlas_core::EventWriter`] like every other
//! subsystem's event stream.

use atlas_core::{IntentId, OrderId, TradeId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ExecutionEvent {
    IntentPicked { intent_id: IntentId },
    OrderPlaced { intent_id: IntentId, order_id: OrderId, broker_order_id: String },
    OrderRejected { intent_id: IntentId, reason: String },
    OrderFilled { order_id: OrderId, trade_id: TradeId, fill_qty: i64 },
    PlacementTimedOut { intent_id: IntentId },
    PlacementAmbiguous { intent_id: IntentId, reason: String },
}
