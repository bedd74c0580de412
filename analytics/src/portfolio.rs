//! Portfolio tear-sheet style summaries computed over closed trades. A
//! read-only reporting concern layered on top of the trading pipeline, not
//! part of any single-writer state machine — so it takes plain value types
//! rather than depending on `atlas-persistence`'s row types.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// The subset of a closed trade's fields a tear-sheet needs. Callers (the
/// composition root, a reporting endpoint) project `TradeRow` into this.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClosedTrade {
    pub realized_pnl: Decimal,
    pub holding_minutes: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortfolioSummary {
    pub trade_count: usize,
    pub win_count: usize,
    pub win_rate: Decimal,
    pub gross_profit: Decimal,
    pub gross_loss: Decimal,
    pub profit_factor: Option<Decimal>,
    pub avg_win: Decimal,
    pub avg_loss: Decimal,
    pub avg_holding_minutes: Decimal,
}

/// Summarizes a slice of closed trades. Returns `None` for ratios that are
/// undefined on an empty or all-winning/all-losing set rather than dividing
/// by zero.
pub fn summarize(trades: &[ClosedTrade]) -> PortfolioSummary {
    let trade_count = trades.len();
    if trade_count == 0 {
        return PortfolioSummary {
            trade_count: 0,
            win_count: 0,
            win_rate: Decimal::ZERO,
            gross_profit: Decimal::ZERO,
            gross_loss: Decimal::ZERO,
            profit_factor: None,
            avg_win: Decimal::ZERO,
            avg_loss: Decimal::ZERO,
            avg_holding_minutes: Decimal::ZERO,
        };
    }

    let mut win_count = 0usize;
    let mut loss_count = 0usize;
    let mut gross_profit = Decimal::ZERO;
    let mut gross_loss = Decimal::ZERO;
    let mut total_holding = 0i64;

    for trade in trades {
        total_holding += trade.holding_minutes;
        if trade.realized_pnl.is_sign_positive() && !trade.realized_pnl.is_zero() {
            win_count += 1;
            gross_profit += trade.realized_pnl;
        } else if trade.realized_pnl.is_sign_negative() {
            loss_count += 1;
            gross_loss += trade.realized_pnl.abs();
        }
    }

    let win_rate = Decimal::from(win_count as i64) / Decimal::from(trade_count as i64);
    let avg_win = if win_count > 0 { gross_profit / Decimal::from(win_count as i64) } else { Decimal::ZERO };
    let avg_loss = if loss_count > 0 { gross_loss / Decimal::from(loss_count as i64) } else { Decimal::ZERO };
    let profit_factor = if gross_loss.is_zero() { None } else { Some(gross_profit / gross_loss) };
    let avg_holding_minutes = Decimal::from(total_holding) / Decimal::from(trade_count as i64);

    PortfolioSummary {
        trade_count,
        win_count,
        win_rate,
        gross_profit,
        gross_loss,
        profit_factor,
        avg_win,
        avg_loss,
        avg_holding_minutes,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn mixed_trades_compute_win_rate_and_profit_factor() {
        let trades = vec![
            ClosedTrade { realized_pnl: dec!(100), holding_minutes: 30 },
            ClosedTrade { realized_pnl: dec!(-50), holding_minutes: 10 },
            ClosedTrade { realized_pnl: dec!(200), holding_minutes: 20 },
        ];
        let summary = summarize(&trades);
        assert_eq!(summary.trade_count, 3);
        assert_eq!(summary.win_count, 2);
        assert_eq!(summary.win_rate, dec!(2) / dec!(3));
        assert_eq!(summary.profit_factor, Some(dec!(300) / dec!(50)));
    }

    #[test]
    fn empty_trade_set_has_no_profit_factor() {
        assert_eq!(summarize(&[]).profit_factor, None);
    }
}
