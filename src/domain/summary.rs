//! Aggregate statistics over a trade list, expressed in R.

use crate::domain::trade::{Trade, TradeResult};

#[derive(Debug, Clone, PartialEq)]
pub struct TradeSummary {
    pub trades: usize,
    pub wins: usize,
    pub losses: usize,
    pub timeouts: usize,
    /// wins / trades, in [0, 1].
    pub win_rate: f64,
    pub total_r: f64,
    pub avg_r: f64,
    /// Gross positive R over gross negative R.
    pub profit_factor: f64,
    pub best_r: f64,
    pub worst_r: f64,
    /// Deepest peak-to-trough fall of the cumulative R curve.
    pub max_drawdown_r: f64,
    pub max_consecutive_losses: usize,
    pub avg_candles_held: f64,
}

impl TradeSummary {
    pub fn compute(trades: &[Trade]) -> Self {
        let mut wins = 0usize;
        let mut losses = 0usize;
        let mut timeouts = 0usize;
        let mut gross_win = 0.0_f64;
        let mut gross_loss = 0.0_f64;
        let mut best_r = 0.0_f64;
        let mut worst_r = 0.0_f64;
        let mut streak = 0usize;
        let mut max_streak = 0usize;
        let mut held = 0usize;

        for trade in trades {
            match trade.result {
                TradeResult::Win => wins += 1,
                TradeResult::Loss => losses += 1,
                TradeResult::Timeout => timeouts += 1,
            }
            let r = trade.r_multiple;
            if r > 0.0 {
                gross_win += r;
            } else {
                gross_loss += r.abs();
            }
            best_r = best_r.max(r);
            worst_r = worst_r.min(r);

            if trade.result == TradeResult::Loss {
                streak += 1;
                max_streak = max_streak.max(streak);
            } else {
                streak = 0;
            }
            held += trade.candles_held;
        }

        let n = trades.len();
        let total_r = gross_win - gross_loss;
        let ratio = |num: f64| if n > 0 { num / n as f64 } else { 0.0 };

        let profit_factor = if gross_loss > 0.0 {
            gross_win / gross_loss
        } else if gross_win > 0.0 {
            f64::INFINITY
        } else {
            0.0
        };

        TradeSummary {
            trades: n,
            wins,
            losses,
            timeouts,
            win_rate: ratio(wins as f64),
            total_r,
            avg_r: ratio(total_r),
            profit_factor,
            best_r,
            worst_r,
            max_drawdown_r: drawdown_r(trades),
            max_consecutive_losses: max_streak,
            avg_candles_held: ratio(held as f64),
        }
    }
}

fn drawdown_r(trades: &[Trade]) -> f64 {
    let mut equity = 0.0_f64;
    let mut peak = 0.0_f64;
    let mut max_dd = 0.0_f64;
    for trade in trades {
        equity += trade.r_multiple;
        peak = peak.max(equity);
        max_dd = max_dd.max(peak - equity);
    }
    max_dd
}
