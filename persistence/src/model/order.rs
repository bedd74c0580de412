//! Unified entry/exit order row plus its append-only fills (`spec.md` §3, §4.7).

use atlas_core::{Direction, ExitIntentId, FillId, IntentId, OrderId, TradeId, UserBrokerId};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::versioned::VersionedEntity;

#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type, Serialize, Deserialize)]
#[sqlx(type_name = "text", rename_all = "UPPERCASE")]
pub enum OrderKind {
    Entry,
    Exit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type, Serialize, Deserialize)]
#[sqlx(type_name = "text", rename_all = "UPPERCASE")]
pub enum OrderStatus {
    Pending,
    Placed,
    Open,
    Complete,
    Rejected,
    Cancelled,
    Expired,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type, Serialize, Deserialize)]
#[sqlx(type_name = "text", rename_all = "UPPERCASE")]
pub enum ReconcileStatus {
    Pending,
    InSync,
    OutOfSync,
    Failed,
}

/// `orders(orderId, orderType, tradeId, intentId, exitIntentId, userBrokerId,
/// symbol, direction, productType, priceType, limitPrice, triggerPrice,
/// orderedQty, filledQty, avgFillPrice, brokerOrderId[unique-active-nonnull],
/// clientOrderId[unique-active], status, lastBrokerUpdateAt, reconcileStatus)`.
///
/// Invariant 5: at most one active row per `clientOrderId`, additionally at
/// most one per non-null `brokerOrderId`. `clientOrderId` is `intentId` for
/// `Entry` orders, `exitIntentId` for `Exit` orders (`spec.md` §9 Open
/// Questions: one Order + many `OrderFill` rows, not one Order per partial).
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct OrderRow {
    pub order_id: OrderId,
    pub version: i64,
    pub order_type: OrderKind,
    pub trade_id: Option<TradeId>,
    pub intent_id: Option<IntentId>,
    pub exit_intent_id: Option<ExitIntentId>,
    pub user_broker_id: UserBrokerId,
    pub exchange: String,
    pub code: String,
    pub direction: Direction,
    pub product_type: String,
    pub price_type: String,
    pub limit_price: Option<Decimal>,
    pub trigger_price: Option<Decimal>,
    pub ordered_qty: i64,
    pub filled_qty: i64,
    pub avg_fill_price: Option<Decimal>,
    pub broker_order_id: Option<String>,
    pub client_order_id: String,
    pub status: OrderStatus,
    pub last_broker_update_at: Option<DateTime<Utc>>,
    pub reconcile_status: ReconcileStatus,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl OrderRow {
    pub fn pending_qty(&self) -> i64 {
        self.ordered_qty - self.filled_qty
    }
}

impl VersionedEntity for OrderRow {
    fn business_id(&self) -> String {
        self.order_id.to_string()
    }
    fn version(&self) -> i64 {
        self.version
    }
}

/// `order_fills(fillId, orderId, fillQty, fillPrice, fillTs, brokerFillId)`.
/// Append-only — not versioned, never soft-deleted.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct OrderFillRow {
    pub fill_id: FillId,
    pub order_id: OrderId,
    pub fill_qty: i64,
    pub fill_price: Decimal,
    pub fill_ts: DateTime<Utc>,
    pub broker_fill_id: String,
}
