//! `DataBroker` / `OrderBroker` capability traits (`spec.md` §4.2).
//!
//! Two orthogonal interfaces with *no shared supertrait* (REDESIGN FLAGS:
//! dynamic dispatch / inheritance of broker adapters becomes two independent
//! trait impls on the same concrete type, not a `FullBroker : MarketDataProvider
//! + OrderExecutor` combinator the way the predecessor's `markets::broker::traits`
//! does it). A concrete adapter implements one, the other, or both.

use async_trait::async_trait;
use atlas_core::{Symbol, Timeframe};
use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::domain::{
    BrokerInstrument, BrokerPosition, HealthSnapshot, OrderRequest, OrderStatusSnapshot, RawCandle, Tick,
    UserBrokerHandle,
};
use crate::error::{DataBrokerError, OrderBrokerError};

/// Callback invoked by an adapter for every tick on a subscribed symbol.
/// Multiple listeners may be registered per symbol (`spec.md` §4.2); the
/// adapter deduplicates upstream subscriptions, not listeners.
pub trait TickListener: Send + Sync {
    fn on_tick(&self, tick: Tick);
}

/// Blanket impl so a plain closure can be passed as a listener.
impl<F> TickListener for F
where
    F: Fn(Tick) + Send + Sync,
{
    fn on_tick(&self, tick: Tick) {
        (self)(tick)
    }
}

/// Market-data capability: tick subscription, historical candles, instrument
/// master, connection health (`spec.md` §4.2).
#[async_trait]
pub trait DataBroker: Send + Sync {
    async fn connect(&self, user_broker: &UserBrokerHandle) -> Result<(), DataBrokerError>;

    async fn subscribe_ticks(
        &self,
        symbol: &Symbol,
        listener: Arc<dyn TickListener>,
    ) -> Result<(), DataBrokerError>;

    async fn unsubscribe_ticks(&self, symbol: &Symbol, listener: Arc<dyn TickListener>) -> Result<(), DataBrokerError>;

    /// Fetches the broker's natively-supported timeframe; if `timeframe` isn't
    /// native, implementations fetch the finest native one and the caller
    /// aggregates via `atlas_marketdata::aggregator` (this trait itself does
    /// not aggregate — that stays in `marketdata`, the layer above).
    async fn get_historical_candles(
        &self,
        symbol: &Symbol,
        timeframe: Timeframe,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<RawCandle>, DataBrokerError>;

    async fn get_instruments(&self) -> Result<Vec<BrokerInstrument>, DataBrokerError>;

    async fn health(&self) -> HealthSnapshot;
}

/// Order-execution capability: placement, modification, cancellation, status,
/// positions, history (`spec.md` §4.2).
#[async_trait]
pub trait OrderBroker: Send + Sync {
    async fn connect(&self, user_broker: &UserBrokerHandle) -> Result<(), OrderBrokerError>;

    /// Returns the broker-assigned order id. `req.client_order_id` is the
    /// idempotency key (`spec.md` §4.2/§4.7); a conforming adapter that
    /// receives a request with a `client_order_id` it already accepted
    /// returns the same `brokerOrderId` rather than placing a duplicate.
    async fn place_order(&self, req: OrderRequest) -> Result<String, OrderBrokerError>;

    async fn modify_order(&self, broker_order_id: &str, req: OrderRequest) -> Result<(), OrderBrokerError>;

    /// Idempotent: cancelling an already-cancelled order returns success
    /// (`spec.md` §4.2).
    async fn cancel_order(&self, broker_order_id: &str) -> Result<(), OrderBrokerError>;

    async fn get_order_status(&self, broker_order_id: &str) -> Result<OrderStatusSnapshot, OrderBrokerError>;

    async fn get_positions(&self) -> Result<Vec<BrokerPosition>, OrderBrokerError>;

    async fn get_order_history(&self, day: chrono::NaiveDate) -> Result<Vec<OrderStatusSnapshot>, OrderBrokerError>;
}
