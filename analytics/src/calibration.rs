//! Win-probability and fill-probability calibration (`spec.md` §4.4: "Compute
//! `pWin`, `pFill`, `kelly` from calibrated tables or formulas").
//!
//! No historical calibration dataset ships with this workspace, so both
//! functions are closed-form approximations keyed on the inputs the signal
//! generator already has at hand (confluence strength, zone geometry) rather
//! than a lookup table trained offline. Swapping in a trained table later
//! only touches this module — every caller only sees `p_win`/`p_fill`.

use rust_decimal::Decimal;

/// Confluence strength, in the same three tiers `spec.md` §4.4 confluence
/// scoring uses, each with a calibrated floor/ceiling win rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfluenceTier {
    Single,
    Double,
    Triple,
}

impl ConfluenceTier {
    /// `(floor, ceiling)` win rate for a confluence score of 0.0 / 1.0
    /// respectively within this tier — more aligned timeframes calibrate to
    /// a higher floor, matching the weighting (HTF=0.5, ITF=0.3, LTF=0.2)
    /// `spec.md` §4.4 assigns when computing the score itself.
    fn bounds(self) -> (Decimal, Decimal) {
        match self {
            ConfluenceTier::Single => (Decimal::new(45, 2), Decimal::new(58, 2)),
            ConfluenceTier::Double => (Decimal::new(52, 2), Decimal::new(66, 2)),
            ConfluenceTier::Triple => (Decimal::new(60, 2), Decimal::new(75, 2)),
        }
    }
}

/// Linear interpolation between a tier's calibrated floor/ceiling by the raw
/// confluence score (expected in `[0, 1]`; clamped defensively otherwise).
pub fn p_win(tier: ConfluenceTier, confluence_score: Decimal) -> Decimal {
    let score = confluence_score.clamp(Decimal::ZERO, Decimal::ONE);
    let (floor, ceiling) = tier.bounds();
    floor + (ceiling - floor) * score
}

/// Probability the limit entry fills before the signal's expiry window
/// elapses, modeled as inversely proportional to how far the reference price
/// sits from the entry band relative to the band's own width — a price
/// already inside `[entryLow, entryHigh]` fills with near-certainty, one far
/// outside the band is unlikely to trade back in before expiry.
pub fn p_fill(ref_price: Decimal, entry_low: Decimal, entry_high: Decimal) -> Decimal {
    let width = entry_high - entry_low;
    if width <= Decimal::ZERO {
        return Decimal::new(50, 2);
    }
    let distance = if ref_price < entry_low {
        entry_low - ref_price
    } else if ref_price > entry_high {
        ref_price - entry_high
    } else {
        return Decimal::new(95, 2);
    };
    let ratio = distance / width;
    let floor = Decimal::new(10, 2);
    (Decimal::new(95, 2) - ratio * Decimal::new(85, 2)).max(floor)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn triple_confluence_calibrates_above_single_at_equal_score() {
        let score = dec!(0.5);
        assert!(p_win(ConfluenceTier::Triple, score) > p_win(ConfluenceTier::Single, score));
    }

    #[test]
    fn price_inside_entry_band_fills_with_high_probability() {
        assert_eq!(p_fill(dec!(2450), dec!(2448), dec!(2452)), dec!(0.95));
    }

    #[test]
    fn price_far_outside_band_floors_at_minimum_fill_probability() {
        let p = p_fill(dec!(3000), dec!(2448), dec!(2452));
        assert_eq!(p, dec!(0.10));
    }
}
