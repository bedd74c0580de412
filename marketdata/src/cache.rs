//! Latest-price cache: `symbol → (lastPrice, ts)` with replace-whole-record
//! semantics (`spec.md` §4.3). O(1) lock-free reads via `DashMap`.

use atlas_core::{Symbol, Timed};
use atlas_persistence::repo::CandleRepo;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use rust_decimal::Decimal;

use crate::error::MarketDataError;

/// Three-tier LTP fallback for HTTP queries (`spec.md` §4.3): (1) cache hit,
/// (2) latest DAILY close from DB, (3) `None`.
#[derive(Debug, Default)]
pub struct MarketDataCache {
    prices: DashMap<Symbol, Timed<Decimal>>,
}

impl MarketDataCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the whole record for `symbol`; never merges with the prior
    /// entry.
    pub fn update(&self, symbol: Symbol, price: Decimal, at: DateTime<Utc>) {
        self.prices.insert(symbol, Timed::new(price, at));
    }

    /// Tier 1: cache hit only, no DB fallback — used by the ingest path where
    /// a miss simply means "no tick yet this session".
    pub fn get(&self, symbol: &Symbol) -> Option<Timed<Decimal>> {
        self.prices.get(symbol).map(|e| *e.value())
    }

    /// Full three-tier LTP lookup for HTTP query handlers.
    pub async fn ltp(
        &self,
        symbol: &Symbol,
        candles: &CandleRepo,
    ) -> Result<Option<Decimal>, MarketDataError> {
        if let Some(timed) = self.get(symbol) {
            return Ok(Some(timed.value));
        }

        let today = Utc::now();
        let day_start = today
            .date_naive()
            .and_hms_opt(0, 0, 0)
            .expect("midnight is a valid time")
            .and_utc();
        let rows = candles
            .range(&symbol.exchange, &symbol.code, atlas_core::Timeframe::Daily, day_start, today)
            .await?;
        Ok(rows.last().map(|row| row.close))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn update_replaces_whole_record() {
        let cache = MarketDataCache::new();
        let symbol = Symbol::new_unchecked("NSE", "RELIANCE");
        let t0 = Utc::now();
        cache.update(symbol.clone(), dec!(100.0), t0);
        let t1 = t0 + chrono::Duration::seconds(1);
        cache.update(symbol.clone(), dec!(101.0), t1);

        let timed = cache.get(&symbol).unwrap();
        assert_eq!(timed.value, dec!(101.0));
        assert_eq!(timed.time, t1);
    }

    #[test]
    fn miss_returns_none() {
        let cache = MarketDataCache::new();
        let symbol = Symbol::new_unchecked("NSE", "TCS");
        assert!(cache.get(&symbol).is_none());
    }
}
