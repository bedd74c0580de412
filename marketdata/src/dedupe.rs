//! Tick deduplication: two rolling 30 s windows per symbol, swapped every 30
//! s, O(1) rotation, no per-tick scan (`spec.md` §4.3).

use std::collections::HashSet;
use std::time::{Duration, Instant};

use atlas_broker::Tick;
use rust_decimal::Decimal;

const WINDOW: Duration = Duration::from_secs(30);

/// Dedupe key: `(symbol_code, exchangeTs_or_receivedTs_millis, price, volume)`.
/// `exchangeTs` is preferred; `receivedTs` is the documented fallback when the
/// adapter doesn't stamp one (`spec.md` §4.3: "Log a rate-limited warning when
/// the fallback is used").
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct DedupeKey {
    symbol: String,
    ts_millis: i64,
    price: Decimal,
    volume: i64,
}

/// Per-symbol rolling dedupe state: current + previous 30 s window.
pub struct TickDeduplicator {
    current: HashSet<DedupeKey>,
    previous: HashSet<DedupeKey>,
    window_started_at: Instant,
    used_fallback_warned: bool,
}

impl Default for TickDeduplicator {
    fn default() -> Self {
        Self {
            current: HashSet::new(),
            previous: HashSet::new(),
            window_started_at: Instant::now(),
            used_fallback_warned: false,
        }
    }
}

impl TickDeduplicator {
    pub fn new() -> Self {
        Self::default()
    }

    fn key_for(tick: &Tick) -> (DedupeKey, bool) {
        let (ts_millis, used_fallback) = match tick.exchange_ts {
            Some(ts) => (ts.timestamp_millis(), false),
            None => (tick.received_ts.timestamp_millis(), true),
        };
        (
            DedupeKey {
                symbol: tick.symbol.to_string(),
                ts_millis,
                price: tick.last_price,
                volume: tick.volume,
            },
            used_fallback,
        )
    }

    /// Rotates windows if 30 s have elapsed, then checks and records `tick`.
    /// Returns `true` if the tick is new (should be processed), `false` if it
    /// is a duplicate (should be discarded).
    pub fn admit(&mut self, tick: &Tick) -> bool {
        self.rotate_if_due();

        let (key, used_fallback) = Self::key_for(tick);
        if used_fallback && !self.used_fallback_warned {
            tracing::warn!(symbol = %tick.symbol, "tick has no exchangeTs, falling back to receivedTs for dedupe key");
            self.used_fallback_warned = true;
        }

        if self.current.contains(&key) || self.previous.contains(&key) {
            return false;
        }
        self.current.insert(key);
        true
    }

    fn rotate_if_due(&mut self) {
        if self.window_started_at.elapsed() >= WINDOW {
            std::mem::swap(&mut self.previous, &mut self.current);
            self.current.clear();
            self.window_started_at = Instant::now();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use atlas_core::Symbol;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn tick(price: Decimal, volume: i64, exchange_ts: Option<chrono::DateTime<Utc>>) -> Tick {
        Tick {
            symbol: Symbol::new_unchecked("NSE", "RELIANCE"),
            last_price: price,
            ltq: volume,
            volume,
            bid: None,
            ask: None,
            exchange_ts,
            received_ts: Utc::now(),
        }
    }

    #[test]
    fn identical_tick_within_window_is_discarded() {
        let mut dedup = TickDeduplicator::new();
        let ts = Utc::now();
        let t1 = tick(dec!(2450.0), 100, Some(ts));
        let t2 = tick(dec!(2450.0), 100, Some(ts));

        assert!(dedup.admit(&t1));
        assert!(!dedup.admit(&t2));
    }

    #[test]
    fn different_price_is_not_a_duplicate() {
        let mut dedup = TickDeduplicator::new();
        let ts = Utc::now();
        let t1 = tick(dec!(2450.0), 100, Some(ts));
        let t2 = tick(dec!(2451.0), 100, Some(ts));

        assert!(dedup.admit(&t1));
        assert!(dedup.admit(&t2));
    }

    #[test]
    fn missing_exchange_ts_falls_back_to_received_ts() {
        let mut dedup = TickDeduplicator::new();
        let t1 = tick(dec!(2450.0), 100, None);
        assert!(dedup.admit(&t1));
    }
}
