//! Per-timeframe zone detection (`spec.md` §4.4): partition a recent N-candle
//! range into equal zones, classify the current price, and flag a trigger
//! when price sits in the bottom or top `threshold_pct` of the range.

use atlas_core::Direction;
use atlas_persistence::model::CandleRow;
use rust_decimal::Decimal;

/// The `(low, high)` range of the most recent `lookback` candles, divided
/// into `zone_count` equal-width zones.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ZonePartition {
    pub low: Decimal,
    pub high: Decimal,
    pub zone_count: usize,
}

impl ZonePartition {
    /// Builds a partition from the trailing `lookback` candles in `candles`
    /// (already ordered by `ts` ascending, per `CandleRepo::range`). Returns
    /// `None` if there are no candles or the range is degenerate (`low ==
    /// high`, e.g. a single flat candle) — nothing to partition.
    pub fn from_candles(candles: &[CandleRow], lookback: usize, zone_count: usize) -> Option<Self> {
        if zone_count == 0 || candles.is_empty() {
            return None;
        }
        let window = &candles[candles.len().saturating_sub(lookback)..];
        let low = window.iter().map(|c| c.low).min()?;
        let high = window.iter().map(|c| c.high).max()?;
        if low >= high {
            return None;
        }
        Some(Self { low, high, zone_count })
    }

    fn zone_width(&self) -> Decimal {
        (self.high - self.low) / Decimal::from(self.zone_count as i64)
    }

    /// Zone index for `price`, clamped to `[0, zone_count - 1]` so prices
    /// outside the observed range still classify into the nearest edge zone.
    pub fn zone_index(&self, price: Decimal) -> usize {
        let width = self.zone_width();
        if price <= self.low {
            return 0;
        }
        if price >= self.high {
            return self.zone_count - 1;
        }
        let idx = ((price - self.low) / width)
            .floor()
            .to_string()
            .parse::<i64>()
            .unwrap_or(0)
            .max(0) as usize;
        idx.min(self.zone_count - 1)
    }

    pub fn zone_bounds(&self, index: usize) -> (Decimal, Decimal) {
        let width = self.zone_width();
        let low = self.low + width * Decimal::from(index as i64);
        let high = low + width;
        (low, high)
    }

    /// How many zones at each edge count as a trigger zone, per
    /// `MtfConfig::threshold_pct` — at least one, so a nonzero threshold on a
    /// short `zone_count` still triggers something.
    fn edge_zone_span(&self, threshold_pct: Decimal) -> usize {
        let span = (Decimal::from(self.zone_count as i64) * threshold_pct)
            .ceil()
            .to_string()
            .parse::<i64>()
            .unwrap_or(1)
            .max(1) as usize;
        span.min(self.zone_count)
    }

    /// `Some(Buy)` if `price` classifies into the bottom edge zone(s) (near
    /// support), `Some(Sell)` if the top edge zone(s) (near resistance),
    /// `None` otherwise.
    pub fn trigger(&self, price: Decimal, threshold_pct: Decimal) -> Option<Direction> {
        let span = self.edge_zone_span(threshold_pct);
        let index = self.zone_index(price);
        if index < span {
            Some(Direction::Buy)
        } else if index >= self.zone_count - span {
            Some(Direction::Sell)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use atlas_core::Timeframe;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn candle(low: Decimal, high: Decimal) -> CandleRow {
        CandleRow {
            exchange: "NSE".into(),
            code: "RELIANCE".into(),
            timeframe: "LTF".into(),
            ts: Utc::now(),
            version: 1,
            open: low,
            high,
            low,
            close: high,
            volume: 100,
            deleted_at: None,
        }
    }

    #[test]
    fn price_at_range_low_triggers_buy() {
        let candles = vec![candle(dec!(100), dec!(200))];
        let partition = ZonePartition::from_candles(&candles, 10, 5).unwrap();
        assert_eq!(partition.trigger(dec!(101), dec!(0.20)), Some(Direction::Buy));
    }

    #[test]
    fn price_at_range_high_triggers_sell() {
        let candles = vec![candle(dec!(100), dec!(200))];
        let partition = ZonePartition::from_candles(&candles, 10, 5).unwrap();
        assert_eq!(partition.trigger(dec!(199), dec!(0.20)), Some(Direction::Sell));
    }

    #[test]
    fn price_in_middle_zones_does_not_trigger() {
        let candles = vec![candle(dec!(100), dec!(200))];
        let partition = ZonePartition::from_candles(&candles, 10, 5).unwrap();
        assert_eq!(partition.trigger(dec!(150), dec!(0.20)), None);
    }

    #[test]
    fn flat_range_yields_no_partition() {
        let candles = vec![candle(dec!(100), dec!(100))];
        assert!(ZonePartition::from_candles(&candles, 10, 5).is_none());
    }

    #[test]
    fn zone_count_for_unused_daily_timeframe_is_a_noop() {
        assert_eq!(Timeframe::Daily.interval_minutes(), None);
    }
}
