//! Instrument master, watchlist and candle rows (`spec.md` §3, §4.3).

use atlas_core::{Symbol, Timeframe};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::versioned::VersionedEntity;

/// `instruments(symbol, exchange, token, lotSize, tickSize)` — source of
/// broker-specific ids. Business id is `(exchange, code)`, not a surrogate.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct InstrumentRow {
    pub exchange: String,
    pub code: String,
    pub version: i64,
    pub token: String,
    pub lot_size: i32,
    pub tick_size: Decimal,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl InstrumentRow {
    pub fn symbol(&self) -> Symbol {
        Symbol::new_unchecked(self.exchange.clone(), self.code.clone())
    }
}

impl VersionedEntity for InstrumentRow {
    fn business_id(&self) -> String {
        format!("{}:{}", self.exchange, self.code)
    }
    fn version(&self) -> i64 {
        self.version
    }
}

/// `watchlist(userBrokerId, symbol, enabled, lastPrice, lastTickTime)`.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct WatchlistRow {
    pub user_broker_id: atlas_core::UserBrokerId,
    pub exchange: String,
    pub code: String,
    pub version: i64,
    pub enabled: bool,
    pub last_price: Option<Decimal>,
    pub last_tick_time: Option<DateTime<Utc>>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl WatchlistRow {
    pub fn symbol(&self) -> Symbol {
        Symbol::new_unchecked(self.exchange.clone(), self.code.clone())
    }
}

impl VersionedEntity for WatchlistRow {
    fn business_id(&self) -> String {
        format!("{}:{}:{}", self.user_broker_id, self.exchange, self.code)
    }
    fn version(&self) -> i64 {
        self.version
    }
}

/// `candles(symbol, timeframe, ts, open, high, low, close, volume)`. Primary
/// key `(symbol, timeframe, ts, version)` — candles are never mutated, only
/// superseded by a corrected row via the immutable update pattern (`spec.md`
/// §3 Lifecycles).
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct CandleRow {
    pub exchange: String,
    pub code: String,
    pub timeframe: String,
    pub ts: DateTime<Utc>,
    pub version: i64,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: i64,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl CandleRow {
    pub fn symbol(&self) -> Symbol {
        Symbol::new_unchecked(self.exchange.clone(), self.code.clone())
    }

    pub fn timeframe(&self) -> Timeframe {
        match self.timeframe.as_str() {
            "LTF" => Timeframe::Ltf,
            "ITF" => Timeframe::Itf,
            "HTF" => Timeframe::Htf,
            "DAILY" => Timeframe::Daily,
            other => unreachable!("unknown timeframe column value {other}"),
        }
    }
}

impl VersionedEntity for CandleRow {
    fn business_id(&self) -> String {
        format!("{}:{}:{}:{}", self.exchange, self.code, self.timeframe, self.ts.timestamp())
    }
    fn version(&self) -> i64 {
        self.version
    }
}
