//! MTF zone-confluence signal generator (`spec.md` §4.4).
//!
//! Mirrors the execution orchestrator's polling stance (`SPEC_FULL.md` §4.7):
//! rather than subscribing to a `CANDLE_CLOSED` push channel, [`MtfSignalGenerator`]
//! is driven by a poll loop that re-reads the latest LTF candle per watched
//! symbol and only does the (relatively expensive) three-timeframe zone
//! evaluation when that candle has actually advanced. A restarted generator
//! picks up cleanly — there is no in-memory state to lose except the
//! last-seen timestamp, which just means one extra no-op poll.

use std::collections::HashMap;
use std::sync::Arc;

use atlas_analytics::{p_fill, p_win, round_price, ConfluenceTier};
use atlas_core::{Direction, Symbol, Timeframe};
use atlas_marketdata::MarketDataCache;
use atlas_persistence::model::ConfluenceType;
use atlas_persistence::repo::CandleRepo;
use atlas_sms::{NewSignal, SignalManagementService};
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;

use crate::config::MtfConfigResolver;
use crate::confluence::{evaluate, TimeframeTrigger};
use crate::error::SignalsError;
use crate::zone::ZonePartition;

/// The three timeframes zone detection runs over; `Daily` never participates
/// (`spec.md` §4.4 only names HTF/ITF/LTF).
const WATCHED_TIMEFRAMES: [Timeframe; 3] = [Timeframe::Htf, Timeframe::Itf, Timeframe::Ltf];

pub struct MtfSignalGenerator {
    candles: CandleRepo,
    cache: Arc<MarketDataCache>,
    config: MtfConfigResolver,
    sms: Arc<SignalManagementService>,
    last_seen: HashMap<Symbol, DateTime<Utc>>,
}

impl std::fmt::Debug for MtfSignalGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MtfSignalGenerator").finish_non_exhaustive()
    }
}

impl MtfSignalGenerator {
    pub fn new(
        candles: CandleRepo,
        cache: Arc<MarketDataCache>,
        config: MtfConfigResolver,
        sms: Arc<SignalManagementService>,
    ) -> Self {
        Self { candles, cache, config, sms, last_seen: HashMap::new() }
    }

    /// Evaluates one symbol. No-op if the LTF candle hasn't advanced, if any
    /// timeframe's partition isn't populated yet (too little history), or if
    /// no majority confluence fires this tick.
    pub async fn poll_symbol(&mut self, symbol: &Symbol) -> Result<(), SignalsError> {
        let now = Utc::now();
        let config = self.config.resolve(symbol).clone();

        let mut windows = HashMap::new();
        for timeframe in WATCHED_TIMEFRAMES {
            windows.insert(timeframe, self.fetch_window(symbol, timeframe, &config, now).await?);
        }

        let Some(latest_ltf) = windows[&Timeframe::Ltf].last() else {
            return Ok(());
        };
        if self.last_seen.get(symbol) == Some(&latest_ltf.ts) {
            return Ok(());
        }
        self.last_seen.insert(symbol.clone(), latest_ltf.ts);

        let Some(ref_price) = self.cache.ltp(symbol, &self.candles).await? else {
            return Ok(());
        };

        let mut partitions = HashMap::new();
        for timeframe in WATCHED_TIMEFRAMES {
            let Some(partition) =
                ZonePartition::from_candles(&windows[&timeframe], config.lookback(timeframe), config.zone_count(timeframe))
            else {
                // Not enough history on this timeframe yet; nothing to evaluate.
                return Ok(());
            };
            partitions.insert(timeframe, partition);
        }

        let triggers: Vec<TimeframeTrigger> = WATCHED_TIMEFRAMES
            .iter()
            .filter_map(|&timeframe| {
                partitions[&timeframe]
                    .trigger(ref_price, config.threshold_pct)
                    .map(|direction| TimeframeTrigger { timeframe, direction })
            })
            .collect();

        let Some(confluence) = evaluate(&triggers) else {
            return Ok(());
        };

        let zone_bounds = |timeframe: Timeframe| -> (Decimal, Decimal) {
            let partition = &partitions[&timeframe];
            partition.zone_bounds(partition.zone_index(ref_price))
        };
        let (htf_low, htf_high) = zone_bounds(Timeframe::Htf);
        let (itf_low, itf_high) = zone_bounds(Timeframe::Itf);
        let (ltf_low, ltf_high) = zone_bounds(Timeframe::Ltf);

        // `spec.md` §4.4: "entryLow/entryHigh as the narrow band around the
        // zone boundary" — the LTF zone gives the tightest entry resolution.
        let entry_low = round_price(ltf_low);
        let entry_high = round_price(ltf_high);
        let effective_floor = round_price(htf_low.min(itf_low).min(ltf_low));
        let effective_ceiling = round_price(htf_high.max(itf_high).max(ltf_high));
        if effective_floor >= effective_ceiling {
            return Ok(());
        }

        let tier = match confluence.confluence_type {
            ConfluenceType::Triple => ConfluenceTier::Triple,
            ConfluenceType::Double => ConfluenceTier::Double,
            ConfluenceType::Single | ConfluenceType::None => ConfluenceTier::Single,
        };
        let win_probability = p_win(tier, confluence.score);
        let fill_probability = p_fill(ref_price, entry_low, entry_high);
        let reward_risk = config.target_multiplier / config.min_profit_multiplier;
        let kelly = atlas_analytics::kelly_fraction(win_probability, reward_risk);

        let signal_type = match confluence.direction {
            Direction::Buy => "LONG_ENTRY",
            Direction::Sell => "SHORT_ENTRY",
        };

        let trading_day = atlas_core::trading_day_ist(now);
        let expires_at = now + Duration::minutes(config.expiry_minutes);

        let new_signal = NewSignal {
            exchange: symbol.exchange.clone(),
            code: symbol.code.clone(),
            direction: confluence.direction,
            signal_type: signal_type.to_string(),
            confluence_type: confluence.confluence_type,
            confluence_score: confluence.score,
            p_win: win_probability,
            p_fill: fill_probability,
            kelly,
            ref_price: round_price(ref_price),
            entry_low,
            entry_high,
            htf_low: round_price(htf_low),
            htf_high: round_price(htf_high),
            itf_low: round_price(itf_low),
            itf_high: round_price(itf_high),
            ltf_low: round_price(ltf_low),
            ltf_high: round_price(ltf_high),
            effective_floor,
            effective_ceiling,
            trading_day,
            expires_at,
        };

        let (signal, deliveries) = self.sms.persist_and_publish(new_signal).await?;
        tracing::info!(
            symbol = %symbol,
            signal_id = %signal.signal_id,
            confluence = ?signal.confluence_type,
            deliveries = deliveries.len(),
            "mtf signal published"
        );
        Ok(())
    }

    async fn fetch_window(
        &self,
        symbol: &Symbol,
        timeframe: Timeframe,
        config: &crate::config::MtfConfig,
        now: DateTime<Utc>,
    ) -> Result<Vec<atlas_persistence::model::CandleRow>, SignalsError> {
        let interval_minutes = timeframe.interval_minutes().unwrap_or(24 * 60);
        // Fetch a generous multiple of the lookback so `ZonePartition::from_candles`
        // always has the trailing window it asks for, even across gaps.
        let span = Duration::minutes(interval_minutes * config.lookback(timeframe) as i64 * 3).max(Duration::hours(1));
        Ok(self.candles.range(&symbol.exchange, &symbol.code, timeframe, now - span, now).await?)
    }
}
