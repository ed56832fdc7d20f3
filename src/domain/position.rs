//! The single open position of a simulation.

use chrono::{DateTime, Utc};

use crate::domain::strategy::Direction;

/// Apply slippage to an entry close: long entries pay up, short entries sell
/// down. `fraction` is a plain fraction (0.0001 = 1 bp).
pub fn apply_entry_slippage(close: f64, fraction: f64, direction: Direction) -> f64 {
    close + direction.sign() * close * fraction
}

/// Exit levels derived from the entry candle's close.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Levels {
    pub stop_loss: f64,
    pub take_profit: f64,
    /// Price distance of 1R (entry close to stop-loss).
    pub risk: f64,
}

impl Levels {
    /// One risk unit is `close * risk_pct / 100`; the stop sits `sl_r` units
    /// away and the target `tp_r` units away, on the sides implied by
    /// `direction`.
    pub fn new(close: f64, direction: Direction, risk_pct: f64, tp_r: f64, sl_r: f64) -> Self {
        let unit = close * risk_pct / 100.0;
        let sign = direction.sign();
        Levels {
            stop_loss: close - sign * unit * sl_r,
            take_profit: close + sign * unit * tp_r,
            risk: unit * sl_r,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Position {
    pub direction: Direction,
    pub entry_index: usize,
    pub entry_time: DateTime<Utc>,
    /// Post-slippage fill.
    pub entry_price: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
    pub risk: f64,
}

impl Position {
    pub fn open(
        direction: Direction,
        entry_index: usize,
        entry_time: DateTime<Utc>,
        entry_price: f64,
        levels: Levels,
    ) -> Self {
        Position {
            direction,
            entry_index,
            entry_time,
            entry_price,
            stop_loss: levels.stop_loss,
            take_profit: levels.take_profit,
            risk: levels.risk,
        }
    }

    pub fn is_long(&self) -> bool {
        self.direction == Direction::Long
    }

    /// Whether a candle spanning `[low, high]` touches the take-profit.
    pub fn should_take_profit(&self, high: f64, low: f64) -> bool {
        if self.is_long() {
            high >= self.take_profit
        } else {
            low <= self.take_profit
        }
    }

    /// Whether a candle spanning `[low, high]` touches the stop-loss.
    pub fn should_stop_loss(&self, high: f64, low: f64) -> bool {
        if self.is_long() {
            low <= self.stop_loss
        } else {
            high >= self.stop_loss
        }
    }

    /// Directional price delta of exiting at `price`.
    pub fn pnl_at(&self, price: f64) -> f64 {
        self.direction.sign() * (price - self.entry_price)
    }

    pub fn r_multiple_at(&self, price: f64) -> f64 {
        if self.risk > 0.0 {
            self.pnl_at(price) / self.risk
        } else {
            0.0
        }
    }
}
