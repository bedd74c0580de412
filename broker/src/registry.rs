//! Adapter registry: one boxed [`DataBroker`]/[`OrderBroker`] per active
//! `UserBroker` (`spec.md` §4.2: "Each active `UserBroker` (role, environment)
//! maps to exactly one live adapter instance, cached for the process
//! lifetime and rebuilt on reconnect.").

use dashmap::DashMap;
use std::sync::Arc;

use atlas_core::{Symbol, UserBrokerId};

use crate::domain::UserBrokerHandle;
use crate::error::{DataBrokerError, OrderBrokerError};
use crate::traits::{DataBroker, OrderBroker};

/// Caches one boxed adapter per `UserBrokerId`, keyed separately for the
/// `DataBroker` and `OrderBroker` capabilities since a given `UserBroker`
/// implements at most one of them in practice (`spec.md` §3 invariant 1: a
/// tenant has one active DATA `UserBroker` and any number of EXEC ones).
#[derive(Clone, Default)]
pub struct BrokerRegistry {
    data: DashMap<UserBrokerId, Arc<dyn DataBroker>>,
    orders: DashMap<UserBrokerId, Arc<dyn OrderBroker>>,
    /// Symbols currently subscribed per DATA `UserBroker`, so that
    /// `sync_subscriptions` can diff the watchlist against what's already live
    /// instead of resubscribing everything on every call.
    subscriptions: DashMap<UserBrokerId, Vec<Symbol>>,
}

impl std::fmt::Debug for BrokerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrokerRegistry")
            .field("data_brokers", &self.data.len())
            .field("order_brokers", &self.orders.len())
            .finish()
    }
}

impl BrokerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_data_broker(&self, user_broker_id: UserBrokerId, adapter: Arc<dyn DataBroker>) {
        self.data.insert(user_broker_id, adapter);
    }

    pub fn register_order_broker(&self, user_broker_id: UserBrokerId, adapter: Arc<dyn OrderBroker>) {
        self.orders.insert(user_broker_id, adapter);
    }

    pub fn deregister(&self, user_broker_id: UserBrokerId) {
        self.data.remove(&user_broker_id);
        self.orders.remove(&user_broker_id);
        self.subscriptions.remove(&user_broker_id);
    }

    pub fn data_broker(&self, user_broker_id: UserBrokerId) -> Option<Arc<dyn DataBroker>> {
        self.data.get(&user_broker_id).map(|e| e.value().clone())
    }

    pub fn order_broker(&self, user_broker_id: UserBrokerId) -> Option<Arc<dyn OrderBroker>> {
        self.orders.get(&user_broker_id).map(|e| e.value().clone())
    }

    /// Reconciles the live tick subscriptions for a DATA `UserBroker` against
    /// the current watchlist: subscribes to newly-added symbols, unsubscribes
    /// from dropped ones. Ambient behaviour supplementing `spec.md` §4.3's
    /// "watchlist drives which symbols the candle builder maintains state
    /// for" — the adapter-level subscription set must track it.
    pub async fn sync_subscriptions(
        &self,
        user_broker_id: UserBrokerId,
        watchlist: &[Symbol],
        listener: Arc<dyn crate::traits::TickListener>,
    ) -> Result<(), DataBrokerError> {
        let Some(adapter) = self.data_broker(user_broker_id) else {
            return Err(DataBrokerError::Connection(format!(
                "no DataBroker registered for {user_broker_id}"
            )));
        };

        let current = self
            .subscriptions
            .get(&user_broker_id)
            .map(|e| e.value().clone())
            .unwrap_or_default();

        for symbol in watchlist {
            if !current.contains(symbol) {
                adapter.subscribe_ticks(symbol, listener.clone()).await?;
            }
        }
        for symbol in &current {
            if !watchlist.contains(symbol) {
                adapter.unsubscribe_ticks(symbol, listener.clone()).await?;
            }
        }

        self.subscriptions.insert(user_broker_id, watchlist.to_vec());
        Ok(())
    }
}

/// Helper alias used by `atlas-execution`/`atlas-reconcile` call sites that
/// need to surface a missing-adapter condition as an `OrderBrokerError`
/// rather than a bare `Option`.
pub fn require_order_broker(
    registry: &BrokerRegistry,
    user_broker_id: UserBrokerId,
) -> Result<Arc<dyn OrderBroker>, OrderBrokerError> {
    registry
        .order_broker(user_broker_id)
        .ok_or_else(|| OrderBrokerError::Connection(format!("no OrderBroker registered for {user_broker_id}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{
        BrokerInstrument, BrokerPosition, HealthSnapshot, OrderRequest, OrderStatusSnapshot, RawCandle, Tick,
    };
    use crate::traits::TickListener;
    use async_trait::async_trait;
    use atlas_core::Timeframe;
    use chrono::{DateTime, Utc};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct FakeDataBroker {
        subscribe_calls: AtomicUsize,
        unsubscribe_calls: AtomicUsize,
    }

    #[async_trait]
    impl DataBroker for FakeDataBroker {
        async fn connect(&self, _user_broker: &UserBrokerHandle) -> Result<(), DataBrokerError> {
            Ok(())
        }

        async fn subscribe_ticks(&self, _symbol: &Symbol, _listener: Arc<dyn TickListener>) -> Result<(), DataBrokerError> {
            self.subscribe_calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn unsubscribe_ticks(&self, _symbol: &Symbol, _listener: Arc<dyn TickListener>) -> Result<(), DataBrokerError> {
            self.unsubscribe_calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn get_historical_candles(
            &self,
            _symbol: &Symbol,
            _timeframe: Timeframe,
            _from: DateTime<Utc>,
            _to: DateTime<Utc>,
        ) -> Result<Vec<RawCandle>, DataBrokerError> {
            Ok(vec![])
        }

        async fn get_instruments(&self) -> Result<Vec<BrokerInstrument>, DataBrokerError> {
            Ok(vec![])
        }

        async fn health(&self) -> HealthSnapshot {
            HealthSnapshot {
                state: crate::domain::ConnectionState::Connected,
                last_tick_at: None,
                consecutive_errors: 0,
                circuit_breaker: atlas_integration::CircuitState::Closed,
            }
        }
    }

    fn noop_listener() -> Arc<dyn TickListener> {
        Arc::new(|_tick: Tick| {})
    }

    #[tokio::test]
    async fn sync_subscriptions_subscribes_new_and_unsubscribes_dropped() {
        let registry = BrokerRegistry::new();
        let user_broker_id = UserBrokerId::new();
        let adapter = Arc::new(FakeDataBroker::default());
        registry.register_data_broker(user_broker_id, adapter.clone());

        let a = Symbol::new_unchecked("NSE", "A");
        let b = Symbol::new_unchecked("NSE", "B");
        registry
            .sync_subscriptions(user_broker_id, &[a.clone(), b.clone()], noop_listener())
            .await
            .unwrap();
        assert_eq!(adapter.subscribe_calls.load(Ordering::SeqCst), 2);

        registry
            .sync_subscriptions(user_broker_id, &[a.clone()], noop_listener())
            .await
            .unwrap();
        assert_eq!(adapter.unsubscribe_calls.load(Ordering::SeqCst), 1);
        assert_eq!(adapter.subscribe_calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn missing_order_broker_surfaces_as_connection_error() {
        let registry = BrokerRegistry::new();
        let err = require_order_broker(&registry, UserBrokerId::new()).unwrap_err();
        assert!(matches!(err, OrderBrokerError::Connection(_)));
    }

    #[allow(dead_code)]
    fn unused_types_are_referenced(_: OrderRequest, _: OrderStatusSnapshot, _: BrokerPosition) {}
}
