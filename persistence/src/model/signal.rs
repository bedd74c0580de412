//! Signal and per-user-broker delivery rows, sole-written by SMS (`spec.md` §4.5).

use atlas_core::{Direction, DeliveryId, IntentId, SignalId, UserBrokerId, UserId};
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::versioned::VersionedEntity;

#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type, Serialize, Deserialize)]
#[sqlx(type_name = "text", rename_all = "UPPERCASE")]
pub enum ConfluenceType {
    None,
    Single,
    Double,
    Triple,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type, Serialize, Deserialize)]
#[sqlx(type_name = "text", rename_all = "UPPERCASE")]
pub enum SignalStatus {
    Detected,
    Published,
    Expired,
    Cancelled,
    Superseded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type, Serialize, Deserialize)]
#[sqlx(type_name = "text", rename_all = "UPPERCASE")]
pub enum DeliveryStatus {
    Created,
    Delivered,
    Consumed,
    Expired,
    Rejected,
}

/// `signals(signalId, symbol, direction, signalType, confluenceType,
/// confluenceScore, pWin, pFill, kelly, refPrice, entryLow, entryHigh,
/// htfLow/High, itfLow/High, ltfLow/High, effectiveFloor, effectiveCeiling,
/// expiresAt, status)`.
///
/// Invariant 2: `effective_floor < effective_ceiling`, enforced both by a
/// `CHECK` constraint in the migration and by [`crate::repo::signal`] refusing
/// to construct a row that violates it. Invariant 3: at most one active row
/// per `(symbol, direction, confluence_type, trading_day, effective_floor,
/// effective_ceiling)` via a partial unique index.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct SignalRow {
    pub signal_id: SignalId,
    pub version: i64,
    pub exchange: String,
    pub code: String,
    pub direction: Direction,
    pub signal_type: String,
    pub confluence_type: ConfluenceType,
    pub confluence_score: Decimal,
    pub p_win: Decimal,
    pub p_fill: Decimal,
    pub kelly: Decimal,
    pub ref_price: Decimal,
    pub entry_low: Decimal,
    pub entry_high: Decimal,
    pub htf_low: Decimal,
    pub htf_high: Decimal,
    pub itf_low: Decimal,
    pub itf_high: Decimal,
    pub ltf_low: Decimal,
    pub ltf_high: Decimal,
    pub effective_floor: Decimal,
    pub effective_ceiling: Decimal,
    pub trading_day: NaiveDate,
    pub expires_at: DateTime<Utc>,
    pub status: SignalStatus,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl VersionedEntity for SignalRow {
    fn business_id(&self) -> String {
        self.signal_id.to_string()
    }
    fn version(&self) -> i64 {
        self.version
    }
}

/// `signal_deliveries(deliveryId, signalId, userBrokerId, userId, status,
/// intentId, consumedAt)`. Invariant 4: at most one active row per
/// `(signalId, userBrokerId)`.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct SignalDeliveryRow {
    pub delivery_id: DeliveryId,
    pub version: i64,
    pub signal_id: SignalId,
    pub user_broker_id: UserBrokerId,
    pub user_id: UserId,
    pub status: DeliveryStatus,
    pub intent_id: Option<IntentId>,
    pub consumed_at: Option<DateTime<Utc>>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl VersionedEntity for SignalDeliveryRow {
    fn business_id(&self) -> String {
        self.delivery_id.to_string()
    }
    fn version(&self) -> i64 {
        self.version
    }
}
