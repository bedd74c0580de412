//! Telemetry events emitted by the service. Non-critical observability, not
//! the source of truth — the `trades` row is — so these flow through the
//! bounded, drop-oldest [`atlas_core::EventWriter`] like every other
//! subsystem's event stream.

use atlas_core::TradeId;
use atlas_persistence::model::{ExitReason, TradeStatus};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TmsEvent {
    TradeCreated { trade_id: TradeId },
    TradePending { trade_id: TradeId, broker_order_id: String },
    TradeOpened { trade_id: TradeId },
    TradeRejected { trade_id: TradeId, reason: String },
    TradeCancelled { trade_id: TradeId },
    TradeTransitioned { trade_id: TradeId, from: TradeStatus, to: TradeStatus },
    TradeExited { trade_id: TradeId, reason: ExitReason, qty: i64 },
    TrailingStopUpdated { trade_id: TradeId, stop_price: rust_decimal::Decimal },
}
