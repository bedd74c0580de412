//! Confluence scoring (`spec.md` §4.4): combine per-timeframe triggers into a
//! single directional signal. HTF carries the most weight, LTF the least —
//! a trigger on the slowest timeframe implies the other two are more likely
//! to agree by the time price gets there.

use atlas_core::{Direction, Timeframe};
use atlas_persistence::model::ConfluenceType;
use rust_decimal::Decimal;

/// A single timeframe's zone trigger at the moment of evaluation.
#[derive(Debug, Clone, Copy)]
pub struct TimeframeTrigger {
    pub timeframe: Timeframe,
    pub direction: Direction,
}

fn weight(timeframe: Timeframe) -> Decimal {
    match timeframe {
        Timeframe::Htf => Decimal::new(50, 2),
        Timeframe::Itf => Decimal::new(30, 2),
        Timeframe::Ltf => Decimal::new(20, 2),
        Timeframe::Daily => Decimal::ZERO,
    }
}

/// The outcome of combining zero or more simultaneous per-timeframe triggers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConfluenceResult {
    pub direction: Direction,
    pub confluence_type: ConfluenceType,
    pub score: Decimal,
}

/// Groups `triggers` by direction and scores the majority side. Returns
/// `None` if there are no triggers, or if both directions fire with equal
/// weight and neither side carries the HTF trigger (no majority, no
/// tie-break — nothing to act on this tick).
pub fn evaluate(triggers: &[TimeframeTrigger]) -> Option<ConfluenceResult> {
    if triggers.is_empty() {
        return None;
    }

    let (buy, sell): (Vec<_>, Vec<_>) =
        triggers.iter().partition(|t| t.direction == Direction::Buy);
    let buy_score: Decimal = buy.iter().map(|t| weight(t.timeframe)).sum();
    let sell_score: Decimal = sell.iter().map(|t| weight(t.timeframe)).sum();

    let (direction, count, score) = match buy_score.cmp(&sell_score) {
        std::cmp::Ordering::Greater => (Direction::Buy, buy.len(), buy_score),
        std::cmp::Ordering::Less => (Direction::Sell, sell.len(), sell_score),
        std::cmp::Ordering::Equal => {
            // A weight tie between opposing sides still has a tie-break: the
            // HTF trigger alone outweighs the other two combined (its weight
            // equals their sum, but "a trigger on the slowest timeframe
            // implies the other two are more likely to agree" means HTF's
            // side wins when they instead disagree with it).
            let htf_buy = buy.iter().any(|t| t.timeframe == Timeframe::Htf);
            let htf_sell = sell.iter().any(|t| t.timeframe == Timeframe::Htf);
            match (htf_buy, htf_sell) {
                (true, false) => (Direction::Buy, buy.len(), buy_score),
                (false, true) => (Direction::Sell, sell.len(), sell_score),
                _ => return None,
            }
        }
    };

    let confluence_type = match count {
        1 => ConfluenceType::Single,
        2 => ConfluenceType::Double,
        _ => ConfluenceType::Triple,
    };

    Some(ConfluenceResult { direction, confluence_type, score })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trigger(timeframe: Timeframe, direction: Direction) -> TimeframeTrigger {
        TimeframeTrigger { timeframe, direction }
    }

    #[test]
    fn single_htf_trigger_yields_single_confluence() {
        let triggers = [trigger(Timeframe::Htf, Direction::Buy)];
        let result = evaluate(&triggers).unwrap();
        assert_eq!(result.confluence_type, ConfluenceType::Single);
        assert_eq!(result.direction, Direction::Buy);
    }

    #[test]
    fn all_three_agreeing_yields_triple_confluence() {
        let triggers = [
            trigger(Timeframe::Htf, Direction::Sell),
            trigger(Timeframe::Itf, Direction::Sell),
            trigger(Timeframe::Ltf, Direction::Sell),
        ];
        let result = evaluate(&triggers).unwrap();
        assert_eq!(result.confluence_type, ConfluenceType::Triple);
        assert_eq!(result.direction, Direction::Sell);
    }

    #[test]
    fn htf_outweighs_conflicting_itf_and_ltf() {
        let triggers = [
            trigger(Timeframe::Htf, Direction::Buy),
            trigger(Timeframe::Itf, Direction::Sell),
            trigger(Timeframe::Ltf, Direction::Sell),
        ];
        let result = evaluate(&triggers).unwrap();
        assert_eq!(result.direction, Direction::Buy);
        assert_eq!(result.confluence_type, ConfluenceType::Single);
    }

    #[test]
    fn no_triggers_yields_no_result() {
        assert!(evaluate(&[]).is_none());
    }
}
