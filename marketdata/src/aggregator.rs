//! Aggregates a run of finer-timeframe candles into one coarser candle, used
//! when a `DataBroker` only exposes its native (finest) interval and the
//! caller needs `ITF`/`HTF`/`DAILY` bars for historical backfill
//! (`SPEC_FULL.md` §4.2: "the caller aggregates via
//! `atlas_marketdata::aggregator`").

use atlas_core::{Symbol, Timeframe};
use atlas_persistence::model::CandleRow;

use crate::candle::{session_start, PartialCandle};

/// Aggregates `source` candles (assumed contiguous, ascending by `ts`, all the
/// same finer `Timeframe`) into one row per bucket of `target`. Source
/// candles spanning a bucket boundary are assigned to the bucket containing
/// their own start time — matching the live builder's own bucketing rule so
/// backfilled history and live-built candles agree bucket-for-bucket.
pub fn aggregate(symbol: &Symbol, target: Timeframe, source: &[CandleRow]) -> Vec<CandleRow> {
    let mut out: Vec<PartialCandle> = Vec::new();

    for candle in source {
        let bucket_start = match target.interval_minutes() {
            Some(minutes) => {
                let epoch_minutes = candle.ts.timestamp() / 60;
                let bucket = (epoch_minutes / minutes) * minutes;
                chrono::DateTime::from_timestamp(bucket * 60, 0).expect("valid bucket start")
            }
            None => session_start(candle.ts),
        };

        match out.last_mut() {
            Some(last) if last.start == bucket_start => {
                last.high = last.high.max(candle.high);
                last.low = last.low.min(candle.low);
                last.close = candle.close;
                last.volume += candle.volume;
            }
            _ => out.push(PartialCandle {
                start: bucket_start,
                open: candle.open,
                high: candle.high,
                low: candle.low,
                close: candle.close,
                volume: candle.volume,
            }),
        }
    }

    out.into_iter().map(|p| p.into_row(symbol, target)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use rust_decimal_macros::dec;

    fn minute_candle(minute: u32, open: i64, high: i64, low: i64, close: i64, volume: i64) -> CandleRow {
        CandleRow {
            exchange: "NSE".into(),
            code: "RELIANCE".into(),
            timeframe: "LTF".into(),
            ts: Utc.with_ymd_and_hms(2026, 1, 14, 9, minute, 0).unwrap(),
            version: 1,
            open: rust_decimal::Decimal::from(open),
            high: rust_decimal::Decimal::from(high),
            low: rust_decimal::Decimal::from(low),
            close: rust_decimal::Decimal::from(close),
            volume,
            deleted_at: None,
        }
    }

    #[test]
    fn aggregates_one_minute_candles_into_itf_bucket() {
        let symbol = Symbol::new_unchecked("NSE", "RELIANCE");
        let source = vec![
            minute_candle(15, 2450, 2460, 2445, 2455, 100),
            minute_candle(16, 2455, 2470, 2450, 2465, 200),
        ];
        let aggregated = aggregate(&symbol, Timeframe::Itf, &source);

        assert_eq!(aggregated.len(), 1);
        assert_eq!(aggregated[0].open, dec!(2450));
        assert_eq!(aggregated[0].high, dec!(2470));
        assert_eq!(aggregated[0].low, dec!(2445));
        assert_eq!(aggregated[0].close, dec!(2465));
        assert_eq!(aggregated[0].volume, 300);
    }
}
