//! Average True Range, the volatility unit the averaging gate spaces entries
//! against (`spec.md` §4.6 step 4).

use atlas_persistence::model::CandleRow;
use rust_decimal::Decimal;

/// Mean true range over the trailing `lookback` candles in `candles` (already
/// ordered by `ts` ascending). `None` if there are fewer than two candles —
/// true range needs a previous close.
pub fn average_true_range(candles: &[CandleRow], lookback: usize) -> Option<Decimal> {
    if candles.len() < 2 {
        return None;
    }
    let window = &candles[candles.len().saturating_sub(lookback + 1)..];
    let mut ranges = Vec::with_capacity(window.len());
    for pair in window.windows(2) {
        let (prev, current) = (&pair[0], &pair[1]);
        let high_low = current.high - current.low;
        let high_prev_close = (current.high - prev.close).abs();
        let low_prev_close = (current.low - prev.close).abs();
        ranges.push(high_low.max(high_prev_close).max(low_prev_close));
    }
    if ranges.is_empty() {
        return None;
    }
    let sum: Decimal = ranges.iter().sum();
    Some(sum / Decimal::from(ranges.len() as i64))
}

#[cfg(test)]
mod tests {
    use super::*;
    use atlas_core::Timeframe;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn candle(high: Decimal, low: Decimal, close: Decimal) -> CandleRow {
        CandleRow {
            exchange: "NSE".into(),
            code: "RELIANCE".into(),
            timeframe: Timeframe::Ltf.to_string(),
            ts: Utc::now(),
            version: 1,
            open: low,
            high,
            low,
            close,
            volume: 100,
            deleted_at: None,
        }
    }

    #[test]
    fn single_candle_has_no_true_range() {
        assert!(average_true_range(&[candle(dec!(110), dec!(100), dec!(105))], 14).is_none());
    }

    #[test]
    fn true_range_accounts_for_gap_beyond_prior_close() {
        let candles = vec![
            candle(dec!(100), dec!(95), dec!(98)),
            candle(dec!(120), dec!(115), dec!(118)),
        ];
        // high-low = 5, but high-prevClose = 120-98 = 22, the true range.
        assert_eq!(average_true_range(&candles, 14), Some(dec!(22)));
    }
}
