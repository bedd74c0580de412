//! Exit signal and exit intent rows, sole-written by SMS / the exit service
//! (`spec.md` §4.9).

use atlas_core::{ExitIntentId, ExitSignalId, TradeId, UserBrokerId};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::model::trade::ExitReason;
use crate::versioned::VersionedEntity;

#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type, Serialize, Deserialize)]
#[sqlx(type_name = "text", rename_all = "UPPERCASE")]
pub enum ExitSignalStatus {
    Detected,
    Confirmed,
    Published,
    Executed,
    Cancelled,
    Superseded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type, Serialize, Deserialize)]
#[sqlx(type_name = "text", rename_all = "UPPERCASE")]
pub enum ExitIntentStatus {
    Pending,
    Approved,
    Rejected,
    Placed,
    Filled,
    Failed,
}

/// `exit_signals(exitSignalId, tradeId, exitReason, episodeId,
/// exitPriceAtDetection, brickMovement, favorableMovement, trailingStopPrice,
/// status)`. Invariant 9/`spec.md` §4.9: `(tradeId, exitReason, episodeId)` is
/// partial-unique-indexed; episode ids for a `(tradeId, exitReason)` pair are
/// a strictly increasing contiguous sequence starting at 1 (Testable
/// Property 8).
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ExitSignalRow {
    pub exit_signal_id: ExitSignalId,
    pub version: i64,
    pub trade_id: TradeId,
    pub exit_reason: ExitReason,
    pub episode_id: i64,
    pub exit_price_at_detection: Decimal,
    pub brick_movement: Decimal,
    pub favorable_movement: Decimal,
    pub trailing_stop_price: Option<Decimal>,
    pub status: ExitSignalStatus,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl VersionedEntity for ExitSignalRow {
    fn business_id(&self) -> String {
        self.exit_signal_id.to_string()
    }
    fn version(&self) -> i64 {
        self.version
    }
}

/// `exit_intents(exitIntentId, tradeId, userBrokerId, exitReason, episodeId,
/// calculatedQty, orderType, limitPrice, status, brokerOrderId,
/// cooldownUntil)`. Invariant 7: exists only if a matching `ExitSignal`
/// exists for the same `(tradeId, exitReason, episodeId)`.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ExitIntentRow {
    pub exit_intent_id: ExitIntentId,
    pub version: i64,
    pub trade_id: TradeId,
    pub user_broker_id: UserBrokerId,
    pub exit_reason: ExitReason,
    pub episode_id: i64,
    pub calculated_qty: i64,
    pub order_type: String,
    pub limit_price: Option<Decimal>,
    pub status: ExitIntentStatus,
    pub broker_order_id: Option<String>,
    pub cooldown_until: Option<DateTime<Utc>>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl VersionedEntity for ExitIntentRow {
    fn business_id(&self) -> String {
        self.exit_intent_id.to_string()
    }
    fn version(&self) -> i64 {
        self.version
    }
}
