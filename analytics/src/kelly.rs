//! Kelly-fraction position sizing (`spec.md` §4.4 "`kelly`" field; §4.6 step 5
//! "position sizing: compute quantity via Kelly × config-fraction, capped by
//! per-trade and per-symbol max-log-loss").

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

/// Classic single-asset Kelly fraction `f* = p - (1-p)/b`, where `b` is the
/// reward:risk ratio (target distance over stop distance). Negative when the
/// edge doesn't clear the odds — callers (validation's `KELLY_NEGATIVE` gate)
/// reject rather than clamp to zero, so the sign is preserved here.
pub fn kelly_fraction(p_win: Decimal, reward_risk_ratio: Decimal) -> Decimal {
    if reward_risk_ratio <= Decimal::ZERO {
        return -Decimal::ONE;
    }
    p_win - (Decimal::ONE - p_win) / reward_risk_ratio
}

/// Position size in shares: `kelly * config_fraction * equity / entry_price`,
/// floored to a whole share and capped so the resulting notional never
/// exceeds `max_notional` (the per-trade or per-symbol max-log-loss-derived
/// ceiling `spec.md` §4.6 step 5 requires).
pub fn position_size(
    kelly: Decimal,
    config_fraction: Decimal,
    equity: Decimal,
    entry_price: Decimal,
    max_notional: Decimal,
) -> i64 {
    if kelly <= Decimal::ZERO || entry_price <= Decimal::ZERO {
        return 0;
    }
    let notional = (kelly * config_fraction * equity).min(max_notional);
    if notional <= Decimal::ZERO {
        return 0;
    }
    (notional / entry_price).floor().to_i64().unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn negative_edge_yields_negative_kelly() {
        assert!(kelly_fraction(dec!(0.3), dec!(1.0)).is_sign_negative());
    }

    #[test]
    fn position_size_respects_max_notional_cap() {
        let qty = position_size(dec!(0.2), dec!(0.5), dec!(1_000_000), dec!(2500), dec!(10_000));
        // kelly*frac*equity = 100_000, capped to 10_000 notional / 2500 price = 4 shares
        assert_eq!(qty, 4);
    }

    #[test]
    fn non_positive_kelly_sizes_to_zero() {
        assert_eq!(position_size(dec!(-0.1), dec!(0.5), dec!(1_000_000), dec!(2500), dec!(10_000)), 0);
    }
}
