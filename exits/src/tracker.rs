//! Brick-movement confirmation accumulator (`spec.md` §4.9 step 3; Glossary
//! "Brick movement: a discretized directional price move used to confirm
//! exits; a tick is brick-confirmed when cumulative signed displacement
//! since the last confirmation exceeds a threshold"). A single noisy tick
//! can't fire an exit on its own — the triggering condition must persist
//! across enough adverse movement to cross `brick_size`.

use rust_decimal::Decimal;

#[derive(Debug, Clone, Copy)]
pub struct BrickTracker {
    brick_size: Decimal,
    reference_price: Decimal,
}

impl BrickTracker {
    pub fn new(brick_size: Decimal, reference_price: Decimal) -> Self {
        Self { brick_size, reference_price }
    }

    /// Feeds the latest price for a condition that has been triggering since
    /// `reference_price`. Returns the cumulative signed displacement and
    /// whether it has crossed the brick threshold.
    pub fn observe(&self, price: Decimal) -> (Decimal, bool) {
        let displacement = price - self.reference_price;
        (displacement, displacement.abs() >= self.brick_size)
    }

    /// Re-anchors the accumulator, e.g. when the triggering condition changes
    /// or once a confirmation has fired.
    pub fn reset(&mut self, reference_price: Decimal) {
        self.reference_price = reference_price;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn confirms_once_cumulative_displacement_crosses_brick_size() {
        let tracker = BrickTracker::new(dec!(1.0), dec!(100.0));
        let (_, confirmed) = tracker.observe(dec!(100.4));
        assert!(!confirmed);
        let (_, confirmed) = tracker.observe(dec!(101.2));
        assert!(confirmed);
    }

    #[test]
    fn reset_re_anchors_the_reference_price() {
        let mut tracker = BrickTracker::new(dec!(1.0), dec!(100.0));
        tracker.reset(dec!(102.0));
        let (displacement, confirmed) = tracker.observe(dec!(102.4));
        assert_eq!(displacement, dec!(0.4));
        assert!(!confirmed);
    }
}
