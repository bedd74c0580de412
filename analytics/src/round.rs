//! Decimal normalization shared by signal construction and reporting
//! (`spec.md` §4.4: "normalize all prices to 2 decimal places (ROUND_HALF_EVEN)").

use rust_decimal::{Decimal, RoundingStrategy};

/// Rounds `value` to 2 decimal places using banker's rounding, matching the
/// `DECIMAL(18,2)` column normalization every price field in `spec.md` §3 uses.
pub fn round_price(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointNearestEven)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn half_rounds_to_even_neighbor() {
        assert_eq!(round_price(dec!(2450.125)), dec!(2450.12));
        assert_eq!(round_price(dec!(2450.135)), dec!(2450.14));
    }
}
