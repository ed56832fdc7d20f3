//! Trade records produced by the simulator, and checks over a trade list.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

use crate::domain::position::Position;
use crate::domain::strategy::Direction;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TradeResult {
    Win,
    Loss,
    Timeout,
}

impl TradeResult {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeResult::Win => "WIN",
            TradeResult::Loss => "LOSS",
            TradeResult::Timeout => "TIMEOUT",
        }
    }
}

impl fmt::Display for TradeResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Trade {
    pub symbol: String,
    pub direction: Direction,
    pub entry_time: DateTime<Utc>,
    pub exit_time: DateTime<Utc>,
    pub entry_price: f64,
    pub exit_price: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
    pub pnl: f64,
    pub pnl_pct: f64,
    pub r_multiple: f64,
    pub result: TradeResult,
    pub candles_held: usize,
}

impl Trade {
    /// Close `position` at `exit_price` on candle `exit_index`.
    pub fn close(
        symbol: &str,
        position: &Position,
        exit_index: usize,
        exit_time: DateTime<Utc>,
        exit_price: f64,
        result: TradeResult,
    ) -> Self {
        let pnl = position.pnl_at(exit_price);
        Trade {
            symbol: symbol.to_string(),
            direction: position.direction,
            entry_time: position.entry_time,
            exit_time,
            entry_price: position.entry_price,
            exit_price,
            stop_loss: position.stop_loss,
            take_profit: position.take_profit,
            pnl,
            pnl_pct: pnl / position.entry_price * 100.0,
            r_multiple: position.r_multiple_at(exit_price),
            result,
            candles_held: exit_index.saturating_sub(position.entry_index),
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TradeViolation {
    #[error("trade {index} exits before it enters")]
    ExitBeforeEntry { index: usize },

    #[error("trade {index} overlaps the previous trade")]
    Overlap { index: usize },

    #[error("trade {index} is {result} with r_multiple {r_multiple}")]
    RSign {
        index: usize,
        result: TradeResult,
        r_multiple: f64,
    },
}

/// Check that trades are chronological and non-overlapping (a trade may not
/// enter on the candle the previous one exited), and that wins carry
/// positive and losses negative R.
pub fn validate_trades(trades: &[Trade]) -> Result<(), TradeViolation> {
    for (index, trade) in trades.iter().enumerate() {
        if trade.exit_time <= trade.entry_time {
            return Err(TradeViolation::ExitBeforeEntry { index });
        }
        if index > 0 && trade.entry_time <= trades[index - 1].exit_time {
            return Err(TradeViolation::Overlap { index });
        }
        let sign_ok = match trade.result {
            TradeResult::Win => trade.r_multiple > 0.0,
            TradeResult::Loss => trade.r_multiple < 0.0,
            TradeResult::Timeout => true,
        };
        if !sign_ok {
            return Err(TradeViolation::RSign {
                index,
                result: trade.result,
                r_multiple: trade.r_multiple,
            });
        }
    }
    Ok(())
}
