//! Simple moving average module: price/SMA crosses, trend filters and
//! fast/slow SMA crosses.

use crate::domain::error::ModuleError;
use crate::domain::indicator_helpers::rolling_mean;
use crate::domain::module::{ConfigSchema, ModuleConfig, ModuleView, ParamSpec, StrategyModule};
use crate::domain::series::{Column, Series};
use crate::domain::strategy::Direction;

const SOURCES: &[&str] = &["close", "open", "high", "low", "hl2", "hlc3", "ohlc4"];

const CONDITIONS: &[&str] = &[
    "price_cross_above",
    "price_cross_below",
    "price_above",
    "price_below",
    "sma_cross_above",
    "sma_cross_below",
];

#[derive(Debug, Default, Clone, Copy)]
pub struct SmaModule;

pub fn sma_column(period: usize) -> String {
    format!("sma_{}", period)
}

fn price_at(
    view: &ModuleView<'_>,
    row: usize,
    source: &str,
) -> Result<f64, ModuleError> {
    let bar = view.bar(row).ok_or_else(|| ModuleError::Computation {
        reason: format!("row {} outside view", row),
    })?;
    Ok(match source {
        "close" => bar.close,
        "open" => bar.open,
        "high" => bar.high,
        "low" => bar.low,
        "hl2" => (bar.high + bar.low) / 2.0,
        "hlc3" => bar.typical_price(),
        "ohlc4" => (bar.open + bar.high + bar.low + bar.close) / 4.0,
        other => {
            return Err(ModuleError::Computation {
                reason: format!("unknown price source {}", other),
            });
        }
    })
}

fn source_prices(series: &Series, source: &str) -> Result<Vec<f64>, ModuleError> {
    let (o, h, l, c) = (series.open(), series.high(), series.low(), series.close());
    let prices = match source {
        "close" => c.to_vec(),
        "open" => o.to_vec(),
        "high" => h.to_vec(),
        "low" => l.to_vec(),
        "hl2" => (0..series.len()).map(|i| (h[i] + l[i]) / 2.0).collect(),
        "hlc3" => (0..series.len()).map(|i| (h[i] + l[i] + c[i]) / 3.0).collect(),
        "ohlc4" => (0..series.len())
            .map(|i| (o[i] + h[i] + l[i] + c[i]) / 4.0)
            .collect(),
        other => {
            return Err(ModuleError::Computation {
                reason: format!("unknown price source {}", other),
            });
        }
    };
    Ok(prices)
}

impl StrategyModule for SmaModule {
    fn id(&self) -> &'static str {
        "sma"
    }

    fn name(&self) -> &'static str {
        "Simple Moving Average"
    }

    fn category(&self) -> &'static str {
        "indicator"
    }

    fn describe_config(&self) -> ConfigSchema {
        ConfigSchema::new(vec![
            ParamSpec::int("period", 50, 1, 500, "Number of periods (20=short, 50=medium, 200=long)"),
            ParamSpec::choice("source", "close", SOURCES, "Which price to use for calculation"),
            ParamSpec::choice("condition_type", "price_cross_above", CONDITIONS, "What triggers entry signal"),
            ParamSpec::int("cross_sma_period", 200, 1, 500, "Slow SMA period for crossover conditions"),
        ])
    }

    fn warmup(&self, config: &ModuleConfig) -> usize {
        let period = config.get_usize("period").unwrap_or(1);
        let crosses_sma = config
            .get_choice("condition_type")
            .is_ok_and(|c| c.starts_with("sma_cross"));
        if crosses_sma {
            period.max(config.get_usize("cross_sma_period").unwrap_or(1))
        } else {
            period
        }
    }

    fn calculate(
        &self,
        series: &Series,
        config: &ModuleConfig,
    ) -> Result<Vec<(String, Column)>, ModuleError> {
        let period = config.get_usize("period")?;
        let prices = source_prices(series, config.get_choice("source")?)?;

        let mut columns = vec![(sma_column(period), Column::Numeric(rolling_mean(&prices, period)))];
        if config.get_choice("condition_type")?.starts_with("sma_cross") {
            let slow = config.get_usize("cross_sma_period")?;
            if slow != period {
                columns.push((sma_column(slow), Column::Numeric(rolling_mean(&prices, slow))));
            }
        }
        Ok(columns)
    }

    /// The configured condition is evaluated as written; `direction` does not
    /// flip it.
    fn check_entry_condition(
        &self,
        view: &ModuleView<'_>,
        index: usize,
        config: &ModuleConfig,
        _direction: Direction,
    ) -> Result<bool, ModuleError> {
        if index < 1 || index >= view.len() {
            return Ok(false);
        }
        let period = config.get_usize("period")?;
        let source = config.get_choice("source")?;
        let condition = config.get_choice("condition_type")?;

        let sma = view.numeric(&sma_column(period))?;
        let (prev_sma, cur_sma) = (sma[index - 1], sma[index]);
        if prev_sma.is_nan() || cur_sma.is_nan() {
            return Ok(false);
        }
        let prev_price = price_at(view, index - 1, source)?;
        let cur_price = price_at(view, index, source)?;

        let hit = match condition {
            "price_cross_above" => prev_price <= prev_sma && cur_price > cur_sma,
            "price_cross_below" => prev_price >= prev_sma && cur_price < cur_sma,
            "price_above" => cur_price > cur_sma,
            "price_below" => cur_price < cur_sma,
            "sma_cross_above" | "sma_cross_below" => {
                let slow = view.numeric(&sma_column(config.get_usize("cross_sma_period")?))?;
                let (prev_slow, cur_slow) = (slow[index - 1], slow[index]);
                if prev_slow.is_nan() || cur_slow.is_nan() {
                    return Ok(false);
                }
                if condition == "sma_cross_above" {
                    prev_sma <= prev_slow && cur_sma > cur_slow
                } else {
                    prev_sma >= prev_slow && cur_sma < cur_slow
                }
            }
            other => {
                return Err(ModuleError::Computation {
                    reason: format!("unknown condition_type {}", other),
                });
            }
        };
        Ok(hit)
    }
}
