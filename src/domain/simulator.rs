//! Trade simulator: a two-state machine run once over the candles.
//!
//! `Flat` opens a position on a candle whose combined entry signal is set
//! (and whose hour is inside the session filter, if any). `InPosition` checks
//! every later candle's high/low against take-profit and stop-loss. A candle
//! makes at most one transition. The final candle is reserved: a position
//! still open there is closed at its close as `Timeout`.

use chrono::{DateTime, Utc};
use std::str::FromStr;

use crate::domain::error::ModtraderError;
use crate::domain::event::Event;
use crate::domain::position::{Levels, Position, apply_entry_slippage};
use crate::domain::series::Series;
use crate::domain::session::Session;
use crate::domain::strategy::Direction;
use crate::domain::trade::{Trade, TradeResult};
use crate::ports::event_port::EventSink;

/// Which level wins when one candle touches both.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TieBreak {
    #[default]
    TakeProfitFirst,
    StopLossFirst,
}

impl FromStr for TieBreak {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "take_profit_first" | "tp_first" => Ok(TieBreak::TakeProfitFirst),
            "stop_loss_first" | "sl_first" => Ok(TieBreak::StopLossFirst),
            other => Err(format!(
                "unknown tie_break {:?}, expected take_profit_first or stop_loss_first",
                other
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SimulationParams {
    pub symbol: String,
    pub direction: Direction,
    pub session: Option<Session>,
    pub tp_r: f64,
    pub sl_r: f64,
    pub risk_pct: f64,
    /// Entry slippage as a fraction of the close.
    pub slippage: f64,
    pub tie_break: TieBreak,
}

#[derive(Debug)]
enum State {
    Flat,
    InPosition(Position),
}

fn exit_hit(position: &Position, high: f64, low: f64, tie_break: TieBreak) -> Option<(f64, TradeResult)> {
    let tp = position
        .should_take_profit(high, low)
        .then_some((position.take_profit, TradeResult::Win));
    let sl = position
        .should_stop_loss(high, low)
        .then_some((position.stop_loss, TradeResult::Loss));
    match tie_break {
        TieBreak::TakeProfitFirst => tp.or(sl),
        TieBreak::StopLossFirst => sl.or(tp),
    }
}

/// Run the state machine. `entries` must have one value per candle and the
/// series must carry timestamps (see `Series::timestamps`).
pub fn simulate(
    series: &Series,
    entries: &[bool],
    params: &SimulationParams,
    events: &dyn EventSink,
) -> Result<Vec<Trade>, ModtraderError> {
    let times: Vec<DateTime<Utc>> = series.timestamps()?;
    if entries.len() != series.len() {
        return Err(ModtraderError::StandardizationFailure {
            reason: format!(
                "entry signal has {} rows, series has {}",
                entries.len(),
                series.len()
            ),
        });
    }

    let mut trades = Vec::new();
    let mut state = State::Flat;
    let last = series.len().saturating_sub(1);

    for i in 0..last {
        let bar = series.bar(i);
        state = match state {
            State::Flat => {
                let in_session = params.session.is_none_or(|s| s.contains(times[i]));
                if entries[i] && in_session && bar.is_tradable() {
                    let entry_price = apply_entry_slippage(bar.close, params.slippage, params.direction);
                    let levels = Levels::new(bar.close, params.direction, params.risk_pct, params.tp_r, params.sl_r);
                    let position = Position::open(params.direction, i, times[i], entry_price, levels);
                    events.emit(Event::PositionOpened {
                        index: i,
                        time: times[i],
                        direction: params.direction,
                        entry_price,
                        stop_loss: position.stop_loss,
                        take_profit: position.take_profit,
                    });
                    State::InPosition(position)
                } else {
                    State::Flat
                }
            }
            State::InPosition(position) => {
                match exit_hit(&position, bar.high, bar.low, params.tie_break) {
                    Some((price, result)) => {
                        let trade = Trade::close(&params.symbol, &position, i, times[i], price, result);
                        events.emit(Event::PositionClosed {
                            index: i,
                            time: times[i],
                            result,
                            exit_price: price,
                            r_multiple: trade.r_multiple,
                        });
                        trades.push(trade);
                        State::Flat
                    }
                    None => State::InPosition(position),
                }
            }
        };
    }

    if let State::InPosition(position) = state {
        let price = series.bar(last).close;
        let trade = Trade::close(&params.symbol, &position, last, times[last], price, TradeResult::Timeout);
        events.emit(Event::PositionClosed {
            index: last,
            time: times[last],
            result: TradeResult::Timeout,
            exit_price: price,
            r_multiple: trade.r_multiple,
        });
        trades.push(trade);
    }

    Ok(trades)
}
