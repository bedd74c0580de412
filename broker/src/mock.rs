//! In-memory mock adapters.
//!
//! [`PaperOrderBroker`] is the "trivial degenerate `OrderBroker`" named in
//! `spec.md` §1 Non-goals: it fills every order immediately at the
//! caller-supplied limit price (or a fixed reference price for market
//! orders), with no slippage or partial fills modelled. [`MockDataBroker`]
//! lets tests drive ticks and historical candles without a live feed.

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use atlas_core::{Direction, Symbol, Timeframe};

use crate::domain::{
    BrokerInstrument, BrokerOrderState, BrokerPosition, ConnectionState, HealthSnapshot, OrderRequest,
    OrderStatusSnapshot, PriceType, RawCandle, Tick, UserBrokerHandle,
};
use crate::error::{DataBrokerError, OrderBrokerError};
use crate::traits::{DataBroker, OrderBroker, TickListener};

/// Fills every order instantly at its limit price, or at `reference_price`
/// for market orders, with no rejection path beyond `InvalidSymbol`.
#[derive(Debug)]
pub struct PaperOrderBroker {
    reference_price: Decimal,
    next_broker_order_id: AtomicU64,
    orders: DashMap<String, OrderStatusSnapshot>,
    seen_client_order_ids: DashMap<String, String>,
    positions: Mutex<Vec<BrokerPosition>>,
}

impl PaperOrderBroker {
    pub fn new(reference_price: Decimal) -> Self {
        Self {
            reference_price,
            next_broker_order_id: AtomicU64::new(1),
            orders: DashMap::new(),
            seen_client_order_ids: DashMap::new(),
            positions: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl OrderBroker for PaperOrderBroker {
    async fn connect(&self, _user_broker: &UserBrokerHandle) -> Result<(), OrderBrokerError> {
        Ok(())
    }

    async fn place_order(&self, req: OrderRequest) -> Result<String, OrderBrokerError> {
        if let Some(existing) = self.seen_client_order_ids.get(&req.client_order_id) {
            return Ok(existing.value().clone());
        }

        let broker_order_id = self.next_broker_order_id.fetch_add(1, Ordering::SeqCst).to_string();
        let fill_price = match req.price_type {
            PriceType::Limit | PriceType::StopLimit => req.limit_price.unwrap_or(self.reference_price),
            PriceType::Market | PriceType::StopLoss => self.reference_price,
        };

        self.orders.insert(
            broker_order_id.clone(),
            OrderStatusSnapshot {
                broker_order_id: broker_order_id.clone(),
                status: BrokerOrderState::Complete,
                filled_qty: req.quantity,
                avg_price: Some(fill_price),
                exchange_ts: Utc::now(),
            },
        );
        self.seen_client_order_ids
            .insert(req.client_order_id.clone(), broker_order_id.clone());

        let mut positions = self.positions.lock();
        positions.push(BrokerPosition {
            symbol: req.symbol,
            direction: req.direction,
            quantity: req.quantity,
            avg_price: fill_price,
        });

        Ok(broker_order_id)
    }

    async fn modify_order(&self, broker_order_id: &str, _req: OrderRequest) -> Result<(), OrderBrokerError> {
        if self.orders.contains_key(broker_order_id) {
            Ok(())
        } else {
            Err(OrderBrokerError::NotFound(broker_order_id.to_string()))
        }
    }

    async fn cancel_order(&self, broker_order_id: &str) -> Result<(), OrderBrokerError> {
        if let Some(mut entry) = self.orders.get_mut(broker_order_id) {
            if entry.status == BrokerOrderState::Complete {
                return Err(OrderBrokerError::AlreadyFilled);
            }
            entry.status = BrokerOrderState::Cancelled;
        }
        Ok(())
    }

    async fn get_order_status(&self, broker_order_id: &str) -> Result<OrderStatusSnapshot, OrderBrokerError> {
        self.orders
            .get(broker_order_id)
            .map(|e| e.value().clone())
            .ok_or_else(|| OrderBrokerError::NotFound(broker_order_id.to_string()))
    }

    async fn get_positions(&self) -> Result<Vec<BrokerPosition>, OrderBrokerError> {
        Ok(self.positions.lock().clone())
    }

    async fn get_order_history(&self, _day: NaiveDate) -> Result<Vec<OrderStatusSnapshot>, OrderBrokerError> {
        Ok(self.orders.iter().map(|e| e.value().clone()).collect())
    }
}

/// Test double for `DataBroker`: ticks and candles are pushed in by the
/// caller rather than arriving over a wire connection.
#[derive(Debug, Default)]
pub struct MockDataBroker {
    listeners: DashMap<Symbol, Vec<()>>,
    candles: DashMap<Symbol, Vec<RawCandle>>,
    instruments: Mutex<Vec<BrokerInstrument>>,
}

impl MockDataBroker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed_candles(&self, symbol: Symbol, candles: Vec<RawCandle>) {
        self.candles.insert(symbol, candles);
    }

    pub fn seed_instruments(&self, instruments: Vec<BrokerInstrument>) {
        *self.instruments.lock() = instruments;
    }

    /// Pushes a tick directly to a listener, simulating what a live
    /// subscription would deliver.
    pub fn push_tick(&self, listener: &Arc<dyn TickListener>, tick: Tick) {
        listener.on_tick(tick);
    }
}

#[async_trait]
impl DataBroker for MockDataBroker {
    async fn connect(&self, _user_broker: &UserBrokerHandle) -> Result<(), DataBrokerError> {
        Ok(())
    }

    async fn subscribe_ticks(&self, symbol: &Symbol, _listener: Arc<dyn TickListener>) -> Result<(), DataBrokerError> {
        self.listeners.entry(symbol.clone()).or_default().push(());
        Ok(())
    }

    async fn unsubscribe_ticks(&self, symbol: &Symbol, _listener: Arc<dyn TickListener>) -> Result<(), DataBrokerError> {
        self.listeners.remove(symbol);
        Ok(())
    }

    async fn get_historical_candles(
        &self,
        symbol: &Symbol,
        _timeframe: Timeframe,
        _from: chrono::DateTime<Utc>,
        _to: chrono::DateTime<Utc>,
    ) -> Result<Vec<RawCandle>, DataBrokerError> {
        Ok(self.candles.get(symbol).map(|e| e.value().clone()).unwrap_or_default())
    }

    async fn get_instruments(&self) -> Result<Vec<BrokerInstrument>, DataBrokerError> {
        Ok(self.instruments.lock().clone())
    }

    async fn health(&self) -> HealthSnapshot {
        HealthSnapshot {
            state: ConnectionState::Connected,
            last_tick_at: Some(Utc::now()),
            consecutive_errors: 0,
            circuit_breaker: atlas_integration::CircuitState::Closed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn sample_request(client_order_id: &str) -> OrderRequest {
        OrderRequest {
            client_order_id: client_order_id.to_string(),
            symbol: Symbol::new_unchecked("NSE", "RELIANCE"),
            direction: Direction::Buy,
            quantity: 10,
            price_type: PriceType::Market,
            product_type: crate::domain::ProductType::Intraday,
            limit_price: None,
            trigger_price: None,
        }
    }

    #[tokio::test]
    async fn place_order_is_idempotent_on_client_order_id() {
        let broker = PaperOrderBroker::new(dec!(100.00));
        let id1 = broker.place_order(sample_request("cid-1")).await.unwrap();
        let id2 = broker.place_order(sample_request("cid-1")).await.unwrap();
        assert_eq!(id1, id2);
    }

    #[tokio::test]
    async fn cancel_on_filled_order_errors_already_filled() {
        let broker = PaperOrderBroker::new(dec!(100.00));
        let id = broker.place_order(sample_request("cid-2")).await.unwrap();
        let err = broker.cancel_order(&id).await.unwrap_err();
        assert!(matches!(err, OrderBrokerError::AlreadyFilled));
    }

    #[tokio::test]
    async fn unknown_order_status_is_not_found() {
        let broker = PaperOrderBroker::new(dec!(100.00));
        let err = broker.get_order_status("does-not-exist").await.unwrap_err();
        assert!(matches!(err, OrderBrokerError::NotFound(_)));
    }
}
