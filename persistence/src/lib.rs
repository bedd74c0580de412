//! Immutable, versioned persistence substrate for the Atlas trading platform.
//!
//! Every table in `spec.md` §3 follows one recipe — composite `(id, version)`
//! primary key, `deleted_at` soft delete, partial unique indexes on active
//! rows — captured once in [`versioned::VersionedRepository`]. [`Repositories`]
//! is the single injectable handle the rest of the workspace constructs once
//! in `main` and passes down; nothing here reaches for a global/static pool
//! (`spec.md` §9 REDESIGN FLAGS).

pub mod error;
pub mod model;
pub mod repo;
pub mod versioned;

pub use error::PersistenceError;
pub use versioned::{Database, VersionedEntity, VersionedRepository};

use sqlx::PgPool;

/// Every repository the trading pipeline needs, constructed once from a
/// shared [`PgPool`] and cloned cheaply (each repo is just the pool handle)
/// into each subsystem crate that needs it.
#[derive(Clone)]
pub struct Repositories {
    pub users: repo::UserRepo,
    pub brokers: repo::BrokerRepo,
    pub user_brokers: repo::UserBrokerRepo,
    pub user_broker_sessions: repo::UserBrokerSessionRepo,
    pub oauth_states: repo::OAuthStateRepo,
    pub instruments: repo::InstrumentRepo,
    pub watchlist: repo::WatchlistRepo,
    pub candles: repo::CandleRepo,
    pub signals: repo::SignalRepo,
    pub signal_deliveries: repo::SignalDeliveryRepo,
    pub trade_intents: repo::TradeIntentRepo,
    pub trades: repo::TradeRepo,
    pub orders: repo::OrderRepo,
    pub order_fills: repo::OrderFillRepo,
    pub exit_signals: repo::ExitSignalRepo,
    pub exit_intents: repo::ExitIntentRepo,
}

impl Repositories {
    pub fn new(pool: PgPool) -> Self {
        Self {
            users: repo::UserRepo::new(pool.clone()),
            brokers: repo::BrokerRepo::new(pool.clone()),
            user_brokers: repo::UserBrokerRepo::new(pool.clone()),
            user_broker_sessions: repo::UserBrokerSessionRepo::new(pool.clone()),
            oauth_states: repo::OAuthStateRepo::new(pool.clone()),
            instruments: repo::InstrumentRepo::new(pool.clone()),
            watchlist: repo::WatchlistRepo::new(pool.clone()),
            candles: repo::CandleRepo::new(pool.clone()),
            signals: repo::SignalRepo::new(pool.clone()),
            signal_deliveries: repo::SignalDeliveryRepo::new(pool.clone()),
            trade_intents: repo::TradeIntentRepo::new(pool.clone()),
            trades: repo::TradeRepo::new(pool.clone()),
            orders: repo::OrderRepo::new(pool.clone()),
            order_fills: repo::OrderFillRepo::new(pool.clone()),
            exit_signals: repo::ExitSignalRepo::new(pool.clone()),
            exit_intents: repo::ExitIntentRepo::new(pool),
        }
    }
}
