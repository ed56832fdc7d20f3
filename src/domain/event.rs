//! Diagnostics emitted by the backtest pipeline.

use chrono::{DateTime, Utc};

use crate::domain::module::SignalPath;
use crate::domain::standardize::StandardizeReport;
use crate::domain::strategy::Direction;
use crate::domain::trade::TradeResult;

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Fetched {
        symbol: String,
        timeframe: String,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        rows: usize,
    },
    Standardized(StandardizeReport),
    ModuleCalculated {
        label: String,
        module: String,
        columns: Vec<String>,
    },
    ColumnRenamed {
        label: String,
        from: String,
        to: String,
    },
    ModuleRetry {
        label: String,
        reason: String,
    },
    Cleaned {
        rows_before: usize,
        rows_after: usize,
        /// Rows with a missing price or a non-positive close.
        missing_prices: usize,
        undefined_columns: usize,
    },
    ModuleSignals {
        label: String,
        path: SignalPath,
        /// Vectorized path failed and row-wise evaluation was used instead.
        fell_back: bool,
        positives: usize,
        row_errors: usize,
    },
    PositionOpened {
        index: usize,
        time: DateTime<Utc>,
        direction: Direction,
        entry_price: f64,
        stop_loss: f64,
        take_profit: f64,
    },
    PositionClosed {
        index: usize,
        time: DateTime<Utc>,
        result: TradeResult,
        exit_price: f64,
        r_multiple: f64,
    },
    Completed {
        rows: usize,
        signals: usize,
        trades: usize,
    },
}
