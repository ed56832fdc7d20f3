//! Backtest pipeline: fetch, standardize, calculate modules, clean, combine
//! signals, simulate.
//!
//! A run either returns the full trade list or fails as a whole; nothing
//! partial escapes on error.

use chrono::{DateTime, Utc};

use crate::domain::combiner::{SignalReport, combine};
use crate::domain::config_validation::validate_strategy;
use crate::domain::error::{ModtraderError, ModuleError};
use crate::domain::event::Event;
use crate::domain::module::{ColumnNames, ConfiguredModule};
use crate::domain::series::{Column, Series};
use crate::domain::simulator::{SimulationParams, TieBreak, simulate};
use crate::domain::standardize::{standardize, standardize_with_report};
use crate::domain::strategy::StrategyConfig;
use crate::domain::trade::{Trade, validate_trades};
use crate::ports::data_port::DataPort;
use crate::ports::event_port::EventSink;

pub const DEFAULT_MIN_ROWS: usize = 30;
pub const DEFAULT_SLIPPAGE: f64 = 0.0001;

/// Engine-wide knobs that are not part of a strategy.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EngineSettings {
    /// Minimum usable rows after cleaning.
    pub min_rows: usize,
    /// Entry slippage as a fraction of the close.
    pub slippage: f64,
    pub tie_break: TieBreak,
}

impl Default for EngineSettings {
    fn default() -> Self {
        EngineSettings {
            min_rows: DEFAULT_MIN_ROWS,
            slippage: DEFAULT_SLIPPAGE,
            tie_break: TieBreak::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BacktestOutcome {
    /// Chronological by exit time.
    pub trades: Vec<Trade>,
    /// Usable rows the simulator ran over.
    pub rows: usize,
    pub signals: SignalReport,
}

pub struct Backtest<'a> {
    data: &'a dyn DataPort,
    events: &'a dyn EventSink,
    settings: EngineSettings,
}

impl<'a> Backtest<'a> {
    pub fn new(data: &'a dyn DataPort, events: &'a dyn EventSink, settings: EngineSettings) -> Self {
        Backtest {
            data,
            events,
            settings,
        }
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Run `request` with the lookback window ending at `end`. `modules` are
    /// the configured entries of `request.modules`, in order.
    pub fn run(
        &self,
        request: &StrategyConfig,
        modules: &[ConfiguredModule],
        end: DateTime<Utc>,
    ) -> Result<BacktestOutcome, ModtraderError> {
        validate_strategy(request, &self.settings)?;
        if modules.is_empty() {
            return Err(ModtraderError::config(
                "strategy.modules",
                "at least one module is required",
            ));
        }
        for configured in modules {
            configured.module.describe_config().validate(&configured.config)?;
        }

        let (start, end) = request.period.range_ending(end);
        let raw = self
            .data
            .fetch_ohlcv(&request.symbol, request.timeframe, start, end)?;
        self.events.emit(Event::Fetched {
            symbol: request.symbol.clone(),
            timeframe: request.timeframe.to_string(),
            start,
            end,
            rows: raw.len(),
        });
        if raw.is_empty() {
            return Err(ModtraderError::DataUnavailable {
                symbol: request.symbol.clone(),
                timeframe: request.timeframe.to_string(),
            });
        }

        let (mut series, report) = standardize_with_report(&raw);
        let synthetic = report.synthetic_index;
        self.events.emit(Event::Standardized(report));
        if synthetic {
            if request.session.is_some() {
                return Err(ModtraderError::StandardizationFailure {
                    reason: "no row key could be read as a timestamp; \
                             a session filter needs real candle hours"
                        .to_string(),
                });
            }
            if let Some(hourly) = modules.iter().find(|m| m.module.reads_candle_hours()) {
                return Err(ModtraderError::StandardizationFailure {
                    reason: format!(
                        "no row key could be read as a timestamp; \
                         module {} needs real candle hours",
                        hourly.label()
                    ),
                });
            }
        }

        let mut names = Vec::with_capacity(modules.len());
        let mut derived = Vec::new();
        for (position, configured) in modules.iter().enumerate() {
            let module_names = self.calculate_module(&mut series, position, configured)?;
            derived.extend(module_names.values().cloned());
            names.push(module_names);
        }

        for name in &derived {
            if let Some(column) = series.column_mut(name) {
                column.forward_fill();
            }
        }
        let series = self.clean(&series, &derived);
        if series.len() < self.settings.min_rows {
            return Err(ModtraderError::InsufficientData {
                rows: series.len(),
                minimum: self.settings.min_rows,
            });
        }

        let signals = combine(&series, modules, &names, request.direction, self.events);
        let params = SimulationParams {
            symbol: request.symbol.clone(),
            direction: request.direction,
            session: request.session,
            tp_r: request.tp_r,
            sl_r: request.sl_r,
            risk_pct: request.risk_pct,
            slippage: self.settings.slippage,
            tie_break: self.settings.tie_break,
        };
        let trades = simulate(&series, &signals.entries, &params, self.events)?;
        validate_trades(&trades)?;

        self.events.emit(Event::Completed {
            rows: series.len(),
            signals: signals.positives(),
            trades: trades.len(),
        });
        Ok(BacktestOutcome {
            trades,
            rows: series.len(),
            signals,
        })
    }

    /// Calculate one module and append its columns. A `Misaligned` failure
    /// re-standardizes the series and retries once.
    fn calculate_module(
        &self,
        series: &mut Series,
        position: usize,
        configured: &ConfiguredModule,
    ) -> Result<ColumnNames, ModtraderError> {
        let label = configured.label().to_string();
        let columns = match attempt(series, configured) {
            Ok(columns) => columns,
            Err(err) if err.requests_restandardize() => {
                self.events.emit(Event::ModuleRetry {
                    label: label.clone(),
                    reason: err.to_string(),
                });
                *series = standardize(series);
                attempt(series, configured).map_err(|err| ModtraderError::ModuleComputation {
                    module: label.clone(),
                    attempts: 2,
                    reason: err.to_string(),
                })?
            }
            Err(err) => {
                return Err(ModtraderError::ModuleComputation {
                    module: label,
                    attempts: 1,
                    reason: err.to_string(),
                });
            }
        };

        let names = append_columns(series, position, configured, columns, self.events).map_err(|err| {
            ModtraderError::ModuleComputation {
                module: label.clone(),
                attempts: 1,
                reason: err.to_string(),
            }
        })?;
        let mut columns: Vec<String> = names.values().cloned().collect();
        columns.sort();
        self.events.emit(Event::ModuleCalculated {
            label,
            module: configured.config.module_id.clone(),
            columns,
        });
        Ok(names)
    }

    /// Drop rows missing any OHLC price or with a non-positive close, then
    /// rows where every derived column is undefined.
    fn clean(&self, series: &Series, derived: &[String]) -> Series {
        let columns: Vec<&Column> = derived.iter().filter_map(|n| series.column(n)).collect();
        let mut missing_prices = 0;
        let mut undefined_columns = 0;
        let kept: Vec<usize> = (0..series.len())
            .filter(|&row| {
                if !series.bar(row).is_tradable() {
                    missing_prices += 1;
                    return false;
                }
                if !columns.is_empty() && columns.iter().all(|c| !c.is_defined_at(row)) {
                    undefined_columns += 1;
                    return false;
                }
                true
            })
            .collect();
        self.events.emit(Event::Cleaned {
            rows_before: series.len(),
            rows_after: kept.len(),
            missing_prices,
            undefined_columns,
        });
        series.select_rows(&kept)
    }
}

/// One `calculate` call whose output must line up with the series.
fn attempt(series: &Series, configured: &ConfiguredModule) -> Result<Vec<(String, Column)>, ModuleError> {
    let columns = configured.module.calculate(series, &configured.config)?;
    if let Some((name, column)) = columns.iter().find(|(_, c)| c.len() != series.len()) {
        return Err(ModuleError::Misaligned {
            reason: format!(
                "column {} has {} rows, series has {}",
                name,
                column.len(),
                series.len()
            ),
        });
    }
    Ok(columns)
}

/// Append a module's columns, renaming on collision: first `{name}_{position}`,
/// then `{name}_{position}_{module_id}`. Returns logical name -> stored name.
fn append_columns(
    series: &mut Series,
    position: usize,
    configured: &ConfiguredModule,
    columns: Vec<(String, Column)>,
    events: &dyn EventSink,
) -> Result<ColumnNames, ModuleError> {
    let module_id = &configured.config.module_id;
    let mut names = ColumnNames::with_capacity(columns.len());
    for (name, column) in columns {
        let stored = [
            name.clone(),
            format!("{}_{}", name, position),
            format!("{}_{}_{}", name, position, module_id),
        ]
        .into_iter()
        .find(|candidate| !series.has_column(candidate))
        .ok_or_else(|| ModuleError::Computation {
            reason: format!("column {} collides even after renaming", name),
        })?;
        if stored != name {
            events.emit(Event::ColumnRenamed {
                label: configured.label().to_string(),
                from: name.clone(),
                to: stored.clone(),
            });
        }
        series.push_column(stored.clone(), column)?;
        names.insert(name, stored);
    }
    Ok(names)
}
