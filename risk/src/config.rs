//! Risk-gate parameters (`spec.md` §4.6 step 3: "parameters ... configurable").

use rust_decimal::Decimal;

/// Tunables for the gate pipeline and position sizing. All defaults sit at
/// the conservative end of the ranges `spec.md` §4.6 gives for the
/// utility-asymmetry gate.
#[derive(Debug, Clone)]
pub struct RiskConfig {
    /// Fraction of the Kelly-optimal stake actually risked
    /// (`spec.md` §4.6 step 5: "Kelly × config-fraction").
    pub kelly_fraction_multiplier: Decimal,
    pub per_trade_max_notional: Decimal,
    pub per_symbol_max_notional: Decimal,

    /// `U(x) = x^alpha` for `x > 0`.
    pub utility_alpha: Decimal,
    /// `U(x) = -lambda * |x|^beta` for `x < 0`.
    pub utility_beta: Decimal,
    pub utility_lambda: Decimal,
    /// Minimum required `p*U(win) / ((1-p)*|U(loss)|)` ratio.
    pub utility_ratio: Decimal,

    /// Minimum spacing from the last entry on the same symbol, in multiples
    /// of ATR (`spec.md` §4.6 step 4).
    pub averaging_atr_multiplier: Decimal,
    pub atr_lookback: usize,

    /// A data feed older than this is treated as `STALE_DATA_FEED`.
    pub stale_feed_threshold: chrono::Duration,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            kelly_fraction_multiplier: Decimal::new(25, 2),
            per_trade_max_notional: Decimal::new(50_000_00, 2),
            per_symbol_max_notional: Decimal::new(150_000_00, 2),
            utility_alpha: Decimal::new(60, 2),
            utility_beta: Decimal::new(150, 2),
            utility_lambda: Decimal::new(200, 2),
            utility_ratio: Decimal::new(300, 2),
            averaging_atr_multiplier: Decimal::new(150, 2),
            atr_lookback: 14,
            stale_feed_threshold: chrono::Duration::minutes(5),
        }
    }
}
