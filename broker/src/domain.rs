//! Wire-adjacent value types shared by both broker capability traits
//! (`spec.md` §4.2, §6: "Broker wire formats. Per adapter (not specified
//! here); the spec requires only...").

use atlas_core::{Direction, Environment, Symbol, UserBrokerId};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Connection parameters passed to `DataBroker::connect` / `OrderBroker::connect`
/// (`spec.md` §4.2). A broker-agnostic projection of
/// `persistence::model::UserBrokerRow` plus the current session token — this
/// crate sits below `persistence` in the dependency order (`spec.md` §2) and
/// has no notion of versioning, so it defines its own narrow view rather than
/// depending on the row type (the same reasoning as [`RawCandle`] below).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserBrokerHandle {
    pub user_broker_id: UserBrokerId,
    pub broker_code: String,
    pub environment: Environment,
    pub access_token: String,
}

/// Immutable tick as delivered by a [`crate::traits::DataBroker`]
/// (`spec.md` §4.2: "Tick objects are immutable").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tick {
    pub symbol: Symbol,
    pub last_price: Decimal,
    pub ltq: i64,
    pub volume: i64,
    pub bid: Option<Decimal>,
    pub ask: Option<Decimal>,
    /// Exchange-stamped time, when the adapter's wire format carries one.
    pub exchange_ts: Option<DateTime<Utc>>,
    pub received_ts: DateTime<Utc>,
}

/// `DataBroker::health()` (`spec.md` §4.2).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionState {
    Connected,
    Reconnecting,
    Disconnected,
    Stale,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthSnapshot {
    pub state: ConnectionState,
    pub last_tick_at: Option<DateTime<Utc>>,
    pub consecutive_errors: u32,
    pub circuit_breaker: atlas_integration::CircuitState,
}

impl HealthSnapshot {
    /// `spec.md` §4.2: "STALE ⇔ now − lastTickAt > staleThreshold (default 5
    /// min) with state=CONNECTED."
    pub fn is_stale(&self, now: DateTime<Utc>, stale_threshold: chrono::Duration) -> bool {
        matches!(self.state, ConnectionState::Connected)
            && self.last_tick_at.is_some_and(|at| now - at > stale_threshold)
    }
}

/// Order side/price-type/product-type vocabulary for [`OrderRequest`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PriceType {
    Market,
    Limit,
    StopLoss,
    StopLimit,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProductType {
    Intraday,
    Delivery,
}

/// A client-supplied order request (`spec.md` §4.2: "`place_order(OrderRequest)
/// → brokerOrderId` with client-supplied `clientOrderId` for idempotency").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderRequest {
    pub client_order_id: String,
    pub symbol: Symbol,
    pub direction: Direction,
    pub quantity: i64,
    pub price_type: PriceType,
    pub product_type: ProductType,
    pub limit_price: Option<Decimal>,
    pub trigger_price: Option<Decimal>,
}

/// Broker-reported state of a placed order (`spec.md` §6: "status lookups
/// return `{status, filledQty, avgPrice, exchangeTs}`").
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BrokerOrderState {
    Open,
    Placed,
    Complete,
    Cancelled,
    Rejected,
    Partial,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderStatusSnapshot {
    pub broker_order_id: String,
    pub status: BrokerOrderState,
    pub filled_qty: i64,
    pub avg_price: Option<Decimal>,
    pub exchange_ts: DateTime<Utc>,
}

/// `OrderBroker::get_positions()` result row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerPosition {
    pub symbol: Symbol,
    pub direction: Direction,
    pub quantity: i64,
    pub avg_price: Decimal,
}

/// Instrument-master record from `DataBroker::get_instruments()`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerInstrument {
    pub symbol: Symbol,
    pub token: String,
    pub lot_size: i32,
    pub tick_size: Decimal,
}

/// A historical OHLCV bar from `DataBroker::get_historical_candles`
/// (`spec.md` §4.3). Deliberately not `persistence::model::CandleRow` — this
/// crate sits below `persistence` in the dependency order and has no notion
/// of versioning; `atlas-marketdata` maps this into a `CandleRow` to persist.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RawCandle {
    pub start: DateTime<Utc>,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: i64,
}
