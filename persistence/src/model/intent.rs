//! Trade intent rows, written by the validation/risk layer (`spec.md` §4.6).

use atlas_core::{DeliveryId, IntentId, OrderId, SignalId, TradeId, UserBrokerId, UserId};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::versioned::VersionedEntity;

#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type, Serialize, Deserialize)]
#[sqlx(type_name = "text", rename_all = "UPPERCASE")]
pub enum IntentStatus {
    Pending,
    Approved,
    Rejected,
    Placed,
    Executed,
    Failed,
}

/// `trade_intents(intentId, signalId, signalDeliveryId, userId, userBrokerId,
/// validationPassed, validationErrors, calculatedQty, limitPrice, orderType,
/// productType, status, orderId, tradeId, executedAt)`.
///
/// Invariant 5a: at most one active row per `intentId` (the business id IS
/// the primary key here, so this is really "never re-inserted", enforced by
/// `insert_v1` alone without a separate partial index).
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct TradeIntentRow {
    pub intent_id: IntentId,
    pub version: i64,
    pub signal_id: SignalId,
    pub signal_delivery_id: DeliveryId,
    pub user_id: UserId,
    pub user_broker_id: UserBrokerId,
    pub validation_passed: bool,
    pub validation_errors: Vec<String>,
    pub calculated_qty: i64,
    pub limit_price: Option<Decimal>,
    pub order_type: String,
    pub product_type: String,
    pub status: IntentStatus,
    pub order_id: Option<OrderId>,
    pub trade_id: Option<TradeId>,
    pub executed_at: Option<DateTime<Utc>>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl VersionedEntity for TradeIntentRow {
    fn business_id(&self) -> String {
        self.intent_id.to_string()
    }
    fn version(&self) -> i64 {
        self.version
    }
}
