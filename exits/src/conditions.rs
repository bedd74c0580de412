//! Direction-aware exit condition evaluation and trailing-stop ratchet
//! (`spec.md` §4.9 steps 1-2).

use atlas_core::Direction;
use atlas_persistence::model::{ExitReason, TradeRow};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

/// Tunables the evaluator needs beyond what's stored on the trade row.
#[derive(Debug, Clone, Copy)]
pub struct ExitConfig {
    /// Trailing-stop retracement fraction `k` (`spec.md` §4.9 step 2:
    /// `stopPrice = highPrice · (1 − k)`).
    pub trailing_retracement: Decimal,
    /// Favorable excursion past `min_profit` required before trailing arms.
    pub trailing_arm_threshold: Decimal,
    /// Adverse retracement from the best favorable price, in price units,
    /// that confirms a `BRICK_REVERSAL` exit independent of the trailing
    /// stop — this is the coarser, non-ratcheting reversal check.
    pub brick_reversal_distance: Decimal,
    /// Brick size for the generic confirmation accumulator applied to every
    /// condition (`spec.md` §4.9 step 3, Glossary "Brick movement").
    pub brick_size: Decimal,
    pub max_holding: chrono::Duration,
    /// `spec.md` §9 Open Questions: DB-backed cooldown duration applied to a
    /// re-armed episode after a rejected/failed placement attempt.
    pub cooldown: chrono::Duration,
}

impl Default for ExitConfig {
    fn default() -> Self {
        Self {
            trailing_retracement: Decimal::new(5, 2),
            trailing_arm_threshold: Decimal::ZERO,
            brick_reversal_distance: Decimal::new(150, 2),
            brick_size: Decimal::new(25, 2),
            max_holding: chrono::Duration::hours(6),
            cooldown: chrono::Duration::minutes(2),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct TrailingUpdate {
    pub high_price: Decimal,
    pub stop_price: Decimal,
}

/// Recomputes the trailing high/stop from the latest price, arming trailing
/// once favorable movement clears `trailing_arm_threshold` past `min_profit`.
/// Returns `None` until trailing is armed.
pub fn compute_trailing_update(trade: &TradeRow, price: Decimal, config: &ExitConfig) -> Option<TrailingUpdate> {
    let arm_level = trade.min_profit + config.trailing_arm_threshold;
    let armed = trade.trailing_active
        || match trade.direction {
            Direction::Buy => price >= arm_level,
            Direction::Sell => price <= arm_level,
        };
    if !armed {
        return None;
    }

    let current_high = trade.trailing_high_price.unwrap_or(trade.entry_price);
    let high_price = match trade.direction {
        Direction::Buy => current_high.max(price),
        Direction::Sell => current_high.min(price),
    };

    let one = Decimal::ONE;
    let stop_price = match trade.direction {
        Direction::Buy => high_price * (one - config.trailing_retracement),
        Direction::Sell => high_price * (one + config.trailing_retracement),
    };
    Some(TrailingUpdate { high_price, stop_price })
}

/// Best favorable price reached so far, used both to arm the brick-reversal
/// check and to compute `favorableMovement` on the generated `ExitSignal`.
pub fn update_peak_favorable(direction: Direction, current_peak: Decimal, price: Decimal) -> Decimal {
    match direction {
        Direction::Buy => current_peak.max(price),
        Direction::Sell => current_peak.min(price),
    }
}

/// Direction-aware condition checks (`spec.md` §4.9 step 1), in priority
/// order: the hard `TARGET_HIT`/`STOP_LOSS` levels first, then the armed
/// `TRAILING_STOP`, then the coarser `BRICK_REVERSAL` momentum check, then
/// `TIME_BASED`.
pub fn detect_condition(trade: &TradeRow, price: Decimal, peak_favorable: Decimal, now: DateTime<Utc>, config: &ExitConfig) -> Option<ExitReason> {
    let (target_hit, stop_loss_hit) = match trade.direction {
        Direction::Buy => (price >= trade.target, price <= trade.max_loss_allowed),
        Direction::Sell => (price <= trade.target, price >= trade.max_loss_allowed),
    };
    if target_hit {
        return Some(ExitReason::TargetHit);
    }
    if stop_loss_hit {
        return Some(ExitReason::StopLoss);
    }

    if trade.trailing_active {
        if let Some(stop) = trade.trailing_stop_price {
            let hit = match trade.direction {
                Direction::Buy => price <= stop,
                Direction::Sell => price >= stop,
            };
            if hit {
                return Some(ExitReason::TrailingStop);
            }
        }
    } else if price != trade.entry_price {
        let in_profit = match trade.direction {
            Direction::Buy => peak_favorable > trade.entry_price,
            Direction::Sell => peak_favorable < trade.entry_price,
        };
        if in_profit {
            let retracement = (peak_favorable - price).abs();
            if retracement >= config.brick_reversal_distance {
                return Some(ExitReason::BrickReversal);
            }
        }
    }

    if let Some(last_update) = trade.last_broker_update_at {
        if now - last_update > config.max_holding {
            return Some(ExitReason::TimeBased);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use atlas_core::{IntentId, PortfolioId, SignalId, TradeId, UserBrokerId, UserId};
    use atlas_persistence::model::{TradeRow, TradeStatus};
    use rust_decimal_macros::dec;

    /// `spec.md` §8 E5/E6 fixture: LONG entry=2500, target=2550, stop=2470.
    fn long_trade() -> TradeRow {
        TradeRow {
            trade_id: TradeId::new(),
            version: 1,
            intent_id: IntentId::new(),
            portfolio_id: PortfolioId::new(),
            user_id: UserId::new(),
            user_broker_id: UserBrokerId::new(),
            signal_id: SignalId::new(),
            exchange: "NSE".to_string(),
            code: "RELIANCE".to_string(),
            direction: Direction::Buy,
            entry_qty: 100,
            entry_price: dec!(2500),
            entry_value: dec!(250_000),
            status: TradeStatus::Open,
            htf_low_at_entry: dec!(2400),
            htf_high_at_entry: dec!(2600),
            itf_low_at_entry: dec!(2450),
            itf_high_at_entry: dec!(2550),
            ltf_low_at_entry: dec!(2480),
            ltf_high_at_entry: dec!(2520),
            min_profit: dec!(2510),
            target: dec!(2550),
            stretch: dec!(2570),
            max_loss_allowed: dec!(2470),
            trailing_active: false,
            trailing_high_price: None,
            trailing_stop_price: None,
            exit_price: None,
            exit_reason: None,
            exit_qty: None,
            realized_pnl: None,
            holding_minutes: None,
            broker_order_id: None,
            broker_trade_id: None,
            last_broker_update_at: Some(Utc::now()),
            deleted_at: None,
        }
    }

    /// E5: tick stream 2520, 2540, 2550, 2530 — `TARGET_HIT` fires exactly at
    /// the 2550 tick, not a tick later.
    #[test]
    fn target_hit_fires_at_the_exact_tick_that_crosses_it() {
        let trade = long_trade();
        let config = ExitConfig::default();
        let now = Utc::now();

        assert_eq!(detect_condition(&trade, dec!(2520), dec!(2520), now, &config), None);
        assert_eq!(detect_condition(&trade, dec!(2540), dec!(2540), now, &config), None);
        assert_eq!(detect_condition(&trade, dec!(2550), dec!(2550), now, &config), Some(ExitReason::TargetHit));
    }

    /// E6: tick stream 2520, 2540, 2580, 2560, 2540, then 2525 — highPrice
    /// ratchets to 2580, stopPrice = 2580 * (1 - 0.02) = 2528.40; no exit
    /// until a tick crosses 2528.40, which 2525 does.
    #[test]
    fn trailing_stop_ratchets_and_then_fires_once_crossed() {
        let mut trade = long_trade();
        let config = ExitConfig::default();

        for price in [dec!(2520), dec!(2540), dec!(2580)] {
            let update = compute_trailing_update(&trade, price, &config).expect("armed once past min_profit");
            trade.trailing_high_price = Some(update.high_price);
            trade.trailing_stop_price = Some(update.stop_price);
            trade.trailing_active = true;
        }
        assert_eq!(trade.trailing_high_price, Some(dec!(2580)));
        assert_eq!(trade.trailing_stop_price, Some(dec!(2528.40)));

        let now = Utc::now();
        let peak = dec!(2580);
        assert_eq!(detect_condition(&trade, dec!(2560), peak, now, &config), None);
        assert_eq!(detect_condition(&trade, dec!(2540), peak, now, &config), None);
        assert_eq!(detect_condition(&trade, dec!(2525), peak, now, &config), Some(ExitReason::TrailingStop));
    }
}
