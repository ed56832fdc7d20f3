#![allow(dead_code)]

use chrono::{DateTime, Duration, TimeZone, Utc};
use modtrader::domain::error::{ModtraderError, ModuleError};
use modtrader::domain::event::Event;
use modtrader::domain::module::{
    ConfigSchema, ModuleConfig, ModuleView, SignalPath, StrategyModule,
};
pub use modtrader::domain::series::{Bar, RowKey, Series};
use modtrader::domain::series::Column;
use modtrader::domain::strategy::{Direction, Period, StrategyConfig, Timeframe};
use modtrader::ports::data_port::DataPort;
use modtrader::ports::event_port::EventSink;
use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::collections::HashMap;

pub struct MockDataPort {
    pub data: HashMap<String, Series>,
    pub errors: HashMap<String, String>,
    pub fetches: Cell<usize>,
}

impl MockDataPort {
    pub fn new() -> Self {
        Self {
            data: HashMap::new(),
            errors: HashMap::new(),
            fetches: Cell::new(0),
        }
    }

    pub fn with_series(mut self, symbol: &str, series: Series) -> Self {
        self.data.insert(symbol.to_string(), series);
        self
    }

    pub fn with_error(mut self, symbol: &str, reason: &str) -> Self {
        self.errors.insert(symbol.to_string(), reason.to_string());
        self
    }
}

impl DataPort for MockDataPort {
    fn fetch_ohlcv(
        &self,
        symbol: &str,
        _timeframe: Timeframe,
        _start: DateTime<Utc>,
        _end: DateTime<Utc>,
    ) -> Result<Series, ModtraderError> {
        self.fetches.set(self.fetches.get() + 1);
        if let Some(reason) = self.errors.get(symbol) {
            return Err(ModtraderError::DataSource {
                reason: reason.clone(),
            });
        }
        Ok(self.data.get(symbol).cloned().unwrap_or_default())
    }

    fn list_symbols(&self) -> Result<Vec<String>, ModtraderError> {
        let mut symbols: Vec<String> = self.data.keys().cloned().collect();
        symbols.sort();
        Ok(symbols)
    }
}

/// Keeps every emitted event for inspection.
#[derive(Default)]
pub struct RecordingSink {
    pub events: RefCell<Vec<Event>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self, pred: impl Fn(&Event) -> bool) -> usize {
        self.events.borrow().iter().filter(|&e| pred(e)).count()
    }
}

impl EventSink for RecordingSink {
    fn emit(&self, event: Event) {
        self.events.borrow_mut().push(event);
    }
}

pub fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 4, 0, 0, 0).unwrap()
}

/// `n` flat candles at `price`, 15 minutes apart from `start_time()`.
pub fn flat_bars(n: usize, price: f64) -> Vec<Bar> {
    vec![Bar::flat(price); n]
}

pub fn quarter_hours(bars: Vec<Bar>) -> Series {
    quarter_hours_from(start_time(), bars)
}

pub fn quarter_hours_from(start: DateTime<Utc>, bars: Vec<Bar>) -> Series {
    Series::from_bars(
        bars.into_iter()
            .enumerate()
            .map(|(i, b)| (start + Duration::minutes(15 * i as i64), b)),
    )
}

/// Oscillating closes around 100 with a small candle body.
pub fn wave_bars(n: usize, period: f64, amplitude: f64) -> Vec<Bar> {
    (0..n)
        .map(|i| {
            let x = i as f64 * std::f64::consts::TAU / period;
            let close = 100.0 + amplitude * x.sin();
            let open = 100.0 + amplitude * (x - 0.1).sin();
            Bar {
                open,
                high: open.max(close) + 0.05,
                low: open.min(close) - 0.05,
                close,
                volume: 1.0,
            }
        })
        .collect()
}

pub fn module_config(module_id: &str, label: &str) -> ModuleConfig {
    ModuleConfig {
        module_id: module_id.to_string(),
        label: label.to_string(),
        values: Default::default(),
    }
}

pub fn strategy(symbol: &str, direction: Direction, modules: Vec<ModuleConfig>) -> StrategyConfig {
    StrategyConfig {
        symbol: symbol.to_string(),
        timeframe: Timeframe::M15,
        direction,
        period: Period::Month1,
        session: None,
        tp_r: 1.5,
        sl_r: 1.0,
        risk_pct: 1.0,
        modules,
    }
}

/// Writes an `entry` flag column that is true at the given rows.
pub struct SignalAt {
    pub rows: Vec<usize>,
    pub vectorized: bool,
}

impl SignalAt {
    pub fn new(rows: &[usize]) -> Self {
        Self {
            rows: rows.to_vec(),
            vectorized: false,
        }
    }

    pub fn vectorized(rows: &[usize]) -> Self {
        Self {
            rows: rows.to_vec(),
            vectorized: true,
        }
    }
}

impl StrategyModule for SignalAt {
    fn id(&self) -> &'static str {
        "signal_at"
    }
    fn name(&self) -> &'static str {
        "Signal At"
    }
    fn category(&self) -> &'static str {
        "test"
    }
    fn describe_config(&self) -> ConfigSchema {
        ConfigSchema::default()
    }
    fn calculate(&self, series: &Series, _config: &ModuleConfig) -> Result<Vec<(String, Column)>, ModuleError> {
        let flags = (0..series.len()).map(|i| self.rows.contains(&i)).collect();
        Ok(vec![("entry".to_string(), Column::Flag(flags))])
    }
    fn check_entry_condition(
        &self,
        view: &ModuleView<'_>,
        index: usize,
        _config: &ModuleConfig,
        _direction: Direction,
    ) -> Result<bool, ModuleError> {
        Ok(view.flag("entry")?.get(index).copied().unwrap_or(false))
    }
    fn signal_path(&self) -> SignalPath {
        if self.vectorized {
            SignalPath::Vectorized
        } else {
            SignalPath::RowWise
        }
    }
    fn entry_flags(
        &self,
        view: &ModuleView<'_>,
        _config: &ModuleConfig,
        _direction: Direction,
    ) -> Result<Vec<bool>, ModuleError> {
        Ok(view.flag("entry")?.to_vec())
    }
}

/// Fails with `Misaligned` for the first `failures` calls, then writes a
/// numeric `level` column (NaN for the first `warmup` rows).
pub struct Flaky {
    pub failures: usize,
    pub calls: Rc<Cell<usize>>,
    pub warmup: usize,
}

impl Flaky {
    pub fn new(failures: usize) -> Self {
        Self {
            failures,
            calls: Rc::new(Cell::new(0)),
            warmup: 0,
        }
    }
}

impl StrategyModule for Flaky {
    fn id(&self) -> &'static str {
        "flaky"
    }
    fn name(&self) -> &'static str {
        "Flaky"
    }
    fn category(&self) -> &'static str {
        "test"
    }
    fn describe_config(&self) -> ConfigSchema {
        ConfigSchema::default()
    }
    fn calculate(&self, series: &Series, _config: &ModuleConfig) -> Result<Vec<(String, Column)>, ModuleError> {
        let call = self.calls.get();
        self.calls.set(call + 1);
        if call < self.failures {
            return Err(ModuleError::Misaligned {
                reason: "cannot assemble rows".into(),
            });
        }
        let level = (0..series.len())
            .map(|i| if i < self.warmup { f64::NAN } else { 1.0 })
            .collect();
        Ok(vec![("level".to_string(), Column::Numeric(level))])
    }
    fn check_entry_condition(
        &self,
        view: &ModuleView<'_>,
        index: usize,
        _config: &ModuleConfig,
        _direction: Direction,
    ) -> Result<bool, ModuleError> {
        Ok(view.numeric("level")?[index] > 0.0)
    }
}

/// Returns a column one row short of the series on every call.
pub struct ShortColumn;

impl StrategyModule for ShortColumn {
    fn id(&self) -> &'static str {
        "short_column"
    }
    fn name(&self) -> &'static str {
        "Short Column"
    }
    fn category(&self) -> &'static str {
        "test"
    }
    fn describe_config(&self) -> ConfigSchema {
        ConfigSchema::default()
    }
    fn calculate(&self, series: &Series, _config: &ModuleConfig) -> Result<Vec<(String, Column)>, ModuleError> {
        Ok(vec![(
            "short".to_string(),
            Column::Numeric(vec![1.0; series.len().saturating_sub(1)]),
        )])
    }
    fn check_entry_condition(
        &self,
        _view: &ModuleView<'_>,
        _index: usize,
        _config: &ModuleConfig,
        _direction: Direction,
    ) -> Result<bool, ModuleError> {
        Ok(false)
    }
}
