//! The ordered gate pipeline (`spec.md` §4.6 step 2-4): a `Vec<Box<dyn
//! RiskGate>>` evaluated in a fixed order, each either passing through or
//! producing a [`RejectionCode`].

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::config::RiskConfig;

/// The enumerated rejection reasons `spec.md` §4.6 step 2 names.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RejectionCode {
    InsufficientCapital,
    ExceedsMaxExposure,
    ExceedsPerTradeCap,
    DailyLossCapHit,
    ExistingPosition,
    BrokerDisabled,
    SymbolBlocked,
    UtilityGateFailed,
    AveragingGateFailed,
    StaleDataFeed,
    KellyNegative,
    /// All gates passed and `kelly > 0`, but `position_size` still floored
    /// the quantity to zero (equity too small relative to `entry_price` for
    /// even one share) — distinct from [`RejectionCode::KellyNegative`],
    /// which means the `KellyNegativeGate` itself fired.
    ZeroQuantityAfterSizing,
}

impl std::fmt::Display for RejectionCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let code = match self {
            RejectionCode::InsufficientCapital => "INSUFFICIENT_CAPITAL",
            RejectionCode::ExceedsMaxExposure => "EXCEEDS_MAX_EXPOSURE",
            RejectionCode::ExceedsPerTradeCap => "EXCEEDS_PER_TRADE_CAP",
            RejectionCode::DailyLossCapHit => "DAILY_LOSS_CAP_HIT",
            RejectionCode::ExistingPosition => "EXISTING_POSITION",
            RejectionCode::BrokerDisabled => "BROKER_DISABLED",
            RejectionCode::SymbolBlocked => "SYMBOL_BLOCKED",
            RejectionCode::UtilityGateFailed => "UTILITY_GATE_FAILED",
            RejectionCode::AveragingGateFailed => "AVERAGING_GATE_FAILED",
            RejectionCode::StaleDataFeed => "STALE_DATA_FEED",
            RejectionCode::KellyNegative => "KELLY_NEGATIVE",
            RejectionCode::ZeroQuantityAfterSizing => "ZERO_QUANTITY_AFTER_SIZING",
        };
        f.write_str(code)
    }
}

/// Everything a gate needs to decide pass/fail. Assembled once per intent by
/// `ValidationService::validate_delivery` from the repositories it owns
/// (`spec.md` §4.6 step 1: "load user context").
#[derive(Debug, Clone)]
pub struct RiskContext {
    pub equity: Decimal,
    pub deployed_capital: Decimal,
    pub max_exposure: Decimal,
    pub max_per_trade: Decimal,
    pub max_daily_loss: Decimal,
    pub today_realized_loss: Decimal,
    pub has_existing_position: bool,
    pub broker_enabled: bool,
    pub symbol_blocked: bool,
    pub last_tick_age: Option<chrono::Duration>,
    pub p_win: Decimal,
    pub reward_distance: Decimal,
    pub risk_distance: Decimal,
    pub atr: Option<Decimal>,
    pub distance_since_last_entry: Option<Decimal>,
    pub kelly: Decimal,
    pub entry_price: Decimal,
}

pub trait RiskGate: Send + Sync + std::fmt::Debug {
    fn evaluate(&self, ctx: &RiskContext, config: &RiskConfig) -> Result<(), RejectionCode>;
}

#[derive(Debug, Default)]
pub struct CapitalGate;
impl RiskGate for CapitalGate {
    fn evaluate(&self, ctx: &RiskContext, config: &RiskConfig) -> Result<(), RejectionCode> {
        if ctx.equity - ctx.deployed_capital < config.per_trade_max_notional.min(ctx.entry_price) {
            return Err(RejectionCode::InsufficientCapital);
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct MaxExposureGate;
impl RiskGate for MaxExposureGate {
    fn evaluate(&self, ctx: &RiskContext, _config: &RiskConfig) -> Result<(), RejectionCode> {
        if ctx.deployed_capital >= ctx.max_exposure {
            return Err(RejectionCode::ExceedsMaxExposure);
        }
        Ok(())
    }
}

/// Rejects outright rather than letting `position_size` silently downsize:
/// the uncapped Kelly-sized notional (`kelly * config-fraction * equity`)
/// must clear `ctx.max_per_trade` on its own, the same ceiling
/// `ValidationService` later caps the actual order quantity against.
#[derive(Debug, Default)]
pub struct PerTradeCapGate;
impl RiskGate for PerTradeCapGate {
    fn evaluate(&self, ctx: &RiskContext, config: &RiskConfig) -> Result<(), RejectionCode> {
        if ctx.max_per_trade <= Decimal::ZERO {
            return Err(RejectionCode::ExceedsPerTradeCap);
        }
        if ctx.kelly <= Decimal::ZERO || ctx.entry_price <= Decimal::ZERO {
            return Ok(());
        }
        let intended_notional = ctx.kelly * config.kelly_fraction_multiplier * ctx.equity;
        if intended_notional > ctx.max_per_trade {
            return Err(RejectionCode::ExceedsPerTradeCap);
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct DailyLossCapGate;
impl RiskGate for DailyLossCapGate {
    fn evaluate(&self, ctx: &RiskContext, _config: &RiskConfig) -> Result<(), RejectionCode> {
        if ctx.today_realized_loss.abs() >= ctx.max_daily_loss {
            return Err(RejectionCode::DailyLossCapHit);
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct ExistingPositionGate;
impl RiskGate for ExistingPositionGate {
    fn evaluate(&self, ctx: &RiskContext, _config: &RiskConfig) -> Result<(), RejectionCode> {
        if ctx.has_existing_position {
            return Err(RejectionCode::ExistingPosition);
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct BrokerDisabledGate;
impl RiskGate for BrokerDisabledGate {
    fn evaluate(&self, ctx: &RiskContext, _config: &RiskConfig) -> Result<(), RejectionCode> {
        if !ctx.broker_enabled {
            return Err(RejectionCode::BrokerDisabled);
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct SymbolBlockedGate;
impl RiskGate for SymbolBlockedGate {
    fn evaluate(&self, ctx: &RiskContext, _config: &RiskConfig) -> Result<(), RejectionCode> {
        if ctx.symbol_blocked {
            return Err(RejectionCode::SymbolBlocked);
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct StaleDataFeedGate;
impl RiskGate for StaleDataFeedGate {
    fn evaluate(&self, ctx: &RiskContext, config: &RiskConfig) -> Result<(), RejectionCode> {
        let stale = match ctx.last_tick_age {
            Some(age) => age > config.stale_feed_threshold,
            None => true,
        };
        if stale {
            return Err(RejectionCode::StaleDataFeed);
        }
        Ok(())
    }
}

/// `U(x) = x^alpha` for `x > 0`, `-lambda * |x|^beta` for `x < 0`
/// (`spec.md` §4.6 step 3). Exponentiation by a fractional `Decimal` power has
/// no exact decimal representation, so this goes through `f64` and back —
/// acceptable here since the result only feeds a pass/fail comparison, never
/// a persisted money amount.
fn utility(x: Decimal, alpha: Decimal, beta: Decimal, lambda: Decimal) -> Decimal {
    let x = x.to_f64().unwrap_or(0.0);
    let alpha = alpha.to_f64().unwrap_or(0.6);
    let beta = beta.to_f64().unwrap_or(1.5);
    let lambda = lambda.to_f64().unwrap_or(2.0);
    let value = if x > 0.0 {
        x.powf(alpha)
    } else {
        -lambda * x.abs().powf(beta)
    };
    Decimal::from_f64_retain(value).unwrap_or(Decimal::ZERO)
}

/// `spec.md` §4.6 step 3: `p*U(win) >= ratio * (1-p) * |U(loss)|`.
#[derive(Debug, Default)]
pub struct UtilityAsymmetryGate;
impl RiskGate for UtilityAsymmetryGate {
    fn evaluate(&self, ctx: &RiskContext, config: &RiskConfig) -> Result<(), RejectionCode> {
        let win_utility = utility(ctx.reward_distance, config.utility_alpha, config.utility_beta, config.utility_lambda);
        let loss_utility = utility(-ctx.risk_distance, config.utility_alpha, config.utility_beta, config.utility_lambda);
        let lhs = ctx.p_win * win_utility;
        let rhs = config.utility_ratio * (Decimal::ONE - ctx.p_win) * loss_utility.abs();
        if lhs < rhs {
            return Err(RejectionCode::UtilityGateFailed);
        }
        Ok(())
    }
}

/// `spec.md` §4.6 step 4: spacing since the last entry on the symbol must
/// clear `multiplier x ATR`. Passes vacuously if there is no prior entry or
/// no ATR reading yet (nothing to space against).
#[derive(Debug, Default)]
pub struct AveragingGate;
impl RiskGate for AveragingGate {
    fn evaluate(&self, ctx: &RiskContext, config: &RiskConfig) -> Result<(), RejectionCode> {
        let (Some(atr), Some(distance)) = (ctx.atr, ctx.distance_since_last_entry) else {
            return Ok(());
        };
        if distance < config.averaging_atr_multiplier * atr {
            return Err(RejectionCode::AveragingGateFailed);
        }
        Ok(())
    }
}

/// `spec.md` §4.6 step 5 / rejection code `KELLY_NEGATIVE`: a negative edge
/// rejects outright rather than clamping to a zero-size no-op trade.
#[derive(Debug, Default)]
pub struct KellyNegativeGate;
impl RiskGate for KellyNegativeGate {
    fn evaluate(&self, ctx: &RiskContext, _config: &RiskConfig) -> Result<(), RejectionCode> {
        if ctx.kelly <= Decimal::ZERO {
            return Err(RejectionCode::KellyNegative);
        }
        Ok(())
    }
}

/// `spec.md` §4.6 step 2's fixed gate order.
pub fn default_pipeline() -> Vec<Box<dyn RiskGate>> {
    vec![
        Box::new(CapitalGate),
        Box::new(MaxExposureGate),
        Box::new(PerTradeCapGate),
        Box::new(DailyLossCapGate),
        Box::new(ExistingPositionGate),
        Box::new(BrokerDisabledGate),
        Box::new(SymbolBlockedGate),
        Box::new(StaleDataFeedGate),
        Box::new(UtilityAsymmetryGate),
        Box::new(AveragingGate),
        Box::new(KellyNegativeGate),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn base_context() -> RiskContext {
        RiskContext {
            equity: dec!(1_000_000),
            deployed_capital: dec!(0),
            max_exposure: dec!(500_000),
            max_per_trade: dec!(50_000),
            max_daily_loss: dec!(20_000),
            today_realized_loss: dec!(0),
            has_existing_position: false,
            broker_enabled: true,
            symbol_blocked: false,
            last_tick_age: Some(chrono::Duration::seconds(1)),
            p_win: dec!(0.6),
            reward_distance: dec!(50),
            risk_distance: dec!(20),
            atr: None,
            distance_since_last_entry: None,
            kelly: dec!(0.2),
            entry_price: dec!(2450),
        }
    }

    #[test]
    fn all_gates_pass_for_a_healthy_context() {
        let config = RiskConfig::default();
        for gate in default_pipeline() {
            assert!(gate.evaluate(&base_context(), &config).is_ok(), "{gate:?} unexpectedly failed");
        }
    }

    #[test]
    fn daily_loss_cap_rejects_once_breached() {
        let config = RiskConfig::default();
        let mut ctx = base_context();
        ctx.today_realized_loss = dec!(-25_000);
        assert_eq!(DailyLossCapGate.evaluate(&ctx, &config), Err(RejectionCode::DailyLossCapHit));
    }

    #[test]
    fn per_trade_cap_rejects_when_kelly_sizing_exceeds_it() {
        let config = RiskConfig::default();
        let mut ctx = base_context();
        // kelly*frac*equity = 0.2 * 0.25 * 1_000_000 = 50_000, just over a 40_000 cap.
        ctx.max_per_trade = dec!(40_000);
        assert_eq!(PerTradeCapGate.evaluate(&ctx, &config), Err(RejectionCode::ExceedsPerTradeCap));
    }

    #[test]
    fn negative_kelly_is_rejected() {
        let config = RiskConfig::default();
        let mut ctx = base_context();
        ctx.kelly = dec!(-0.05);
        assert_eq!(KellyNegativeGate.evaluate(&ctx, &config), Err(RejectionCode::KellyNegative));
    }

    #[test]
    fn averaging_gate_rejects_entries_too_close_together() {
        let config = RiskConfig::default();
        let mut ctx = base_context();
        ctx.atr = Some(dec!(10));
        ctx.distance_since_last_entry = Some(dec!(5));
        assert_eq!(AveragingGate.evaluate(&ctx, &config), Err(RejectionCode::AveragingGateFailed));
    }

    #[test]
    fn stale_feed_rejects_when_no_recent_tick() {
        let config = RiskConfig::default();
        let mut ctx = base_context();
        ctx.last_tick_age = None;
        assert_eq!(StaleDataFeedGate.evaluate(&ctx, &config), Err(RejectionCode::StaleDataFeed));
    }
}
