//! The `trades` row, sole-written by TMS (`spec.md` §4.8).

use atlas_core::{Direction, IntentId, PortfolioId, SignalId, TradeId, UserBrokerId, UserId};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::versioned::VersionedEntity;

/// `Trade.status` (`spec.md` §4.8 state machine table). Invariant 8: the
/// sequence for a given `tradeId` monotonically traverses `Created →
/// Pending → (Open|Rejected|Cancelled) → (PartialExit)* → Closed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type, Serialize, Deserialize)]
#[sqlx(type_name = "text", rename_all = "UPPERCASE")]
pub enum TradeStatus {
    Created,
    Pending,
    Open,
    PartialExit,
    Closed,
    Rejected,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type, Serialize, Deserialize)]
#[sqlx(type_name = "text", rename_all = "UPPERCASE")]
pub enum ExitReason {
    TargetHit,
    StopLoss,
    TrailingStop,
    TimeBased,
    Manual,
    BrickReversal,
}

/// `trades(tradeId, intentId, portfolioId, userId, userBrokerId, signalId,
/// symbol, direction, entryQty, entryPrice, entryValue, status, MTF-zone-at-
/// entry, targets, maxLossAllowed, trailing, exit, brokerOrderId,
/// brokerTradeId, lastBrokerUpdateAt)`.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct TradeRow {
    pub trade_id: TradeId,
    pub version: i64,
    pub intent_id: IntentId,
    pub portfolio_id: PortfolioId,
    pub user_id: UserId,
    pub user_broker_id: UserBrokerId,
    pub signal_id: SignalId,
    pub exchange: String,
    pub code: String,
    pub direction: Direction,
    pub entry_qty: i64,
    pub entry_price: Decimal,
    pub entry_value: Decimal,
    pub status: TradeStatus,

    // MTF zone snapshot at entry.
    pub htf_low_at_entry: Decimal,
    pub htf_high_at_entry: Decimal,
    pub itf_low_at_entry: Decimal,
    pub itf_high_at_entry: Decimal,
    pub ltf_low_at_entry: Decimal,
    pub ltf_high_at_entry: Decimal,

    // Targets.
    pub min_profit: Decimal,
    pub target: Decimal,
    pub stretch: Decimal,
    pub max_loss_allowed: Decimal,

    // Trailing stop.
    pub trailing_active: bool,
    pub trailing_high_price: Option<Decimal>,
    pub trailing_stop_price: Option<Decimal>,

    // Exit outcome, populated once the trade is (partially) closed.
    pub exit_price: Option<Decimal>,
    pub exit_reason: Option<ExitReason>,
    pub exit_qty: Option<i64>,
    pub realized_pnl: Option<Decimal>,
    pub holding_minutes: Option<i64>,

    pub broker_order_id: Option<String>,
    pub broker_trade_id: Option<String>,
    pub last_broker_update_at: Option<DateTime<Utc>>,

    pub deleted_at: Option<DateTime<Utc>>,
}

impl VersionedEntity for TradeRow {
    fn business_id(&self) -> String {
        self.trade_id.to_string()
    }
    fn version(&self) -> i64 {
        self.version
    }
}

impl TradeRow {
    /// `spec.md` §4.8: the only transitions a row may ever take.
    pub fn can_transition(from: TradeStatus, to: TradeStatus) -> bool {
        use TradeStatus::*;
        matches!(
            (from, to),
            (Created, Pending)
                | (Created, Rejected)
                | (Pending, Open)
                | (Pending, Cancelled)
                | (Open, PartialExit)
                | (Open, Closed)
                | (PartialExit, PartialExit)
                | (PartialExit, Closed)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_machine_rejects_backwards_transitions() {
        assert!(!TradeRow::can_transition(TradeStatus::Open, TradeStatus::Pending));
        assert!(!TradeRow::can_transition(TradeStatus::Closed, TradeStatus::Open));
    }

    #[test]
    fn state_machine_allows_the_documented_edges() {
        assert!(TradeRow::can_transition(TradeStatus::Created, TradeStatus::Pending));
        assert!(TradeRow::can_transition(TradeStatus::Pending, TradeStatus::Open));
        assert!(TradeRow::can_transition(TradeStatus::Open, TradeStatus::Closed));
        assert!(TradeRow::can_transition(TradeStatus::PartialExit, TradeStatus::Closed));
    }

    #[test]
    fn state_machine_allows_repeated_partial_exits() {
        assert!(TradeRow::can_transition(TradeStatus::PartialExit, TradeStatus::PartialExit));
    }
}
