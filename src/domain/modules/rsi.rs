//! RSI mean-reversion module.
//!
//! LONG fires when RSI crosses back above the oversold level, SHORT when it
//! crosses back below the overbought level.

use crate::domain::error::ModuleError;
use crate::domain::indicator_helpers::wilder_rsi;
use crate::domain::module::{ConfigSchema, ModuleConfig, ModuleView, ParamSpec, StrategyModule};
use crate::domain::series::{Column, Series};
use crate::domain::strategy::Direction;

pub const RSI: &str = "rsi";
pub const RSI_OVERBOUGHT: &str = "rsi_overbought";
pub const RSI_OVERSOLD: &str = "rsi_oversold";

#[derive(Debug, Default, Clone, Copy)]
pub struct RsiModule;

impl StrategyModule for RsiModule {
    fn id(&self) -> &'static str {
        "rsi"
    }

    fn name(&self) -> &'static str {
        "RSI"
    }

    fn category(&self) -> &'static str {
        "indicator"
    }

    fn describe_config(&self) -> ConfigSchema {
        ConfigSchema::new(vec![
            ParamSpec::int("period", 14, 2, 200, "Number of periods for RSI calculation"),
            ParamSpec::float("overbought", 70.0, 50.0, 90.0, "RSI above this is overbought (SHORT signal)"),
            ParamSpec::float("oversold", 30.0, 10.0, 50.0, "RSI below this is oversold (LONG signal)"),
        ])
    }

    /// One row for the first change, `period` changes for the seed, one more
    /// for the previous value the cross needs.
    fn warmup(&self, config: &ModuleConfig) -> usize {
        config.get_usize("period").map_or(1, |p| p + 1)
    }

    fn calculate(
        &self,
        series: &Series,
        config: &ModuleConfig,
    ) -> Result<Vec<(String, Column)>, ModuleError> {
        let period = config.get_usize("period")?;
        let overbought = config.get_float("overbought")?;
        let oversold = config.get_float("oversold")?;

        let rsi = wilder_rsi(series.close(), period);
        let overbought_flags = rsi.iter().map(|&v| v > overbought).collect();
        let oversold_flags = rsi.iter().map(|&v| v < oversold).collect();

        Ok(vec![
            (RSI.to_string(), Column::Numeric(rsi)),
            (RSI_OVERBOUGHT.to_string(), Column::Flag(overbought_flags)),
            (RSI_OVERSOLD.to_string(), Column::Flag(oversold_flags)),
        ])
    }

    fn check_entry_condition(
        &self,
        view: &ModuleView<'_>,
        index: usize,
        config: &ModuleConfig,
        direction: Direction,
    ) -> Result<bool, ModuleError> {
        if index < 1 || index >= view.len() {
            return Ok(false);
        }
        let rsi = view.numeric(RSI)?;
        let (prev, current) = (rsi[index - 1], rsi[index]);
        if prev.is_nan() || current.is_nan() {
            return Ok(false);
        }

        Ok(match direction {
            Direction::Long => {
                let oversold = config.get_float("oversold")?;
                prev < oversold && current > oversold
            }
            Direction::Short => {
                let overbought = config.get_float("overbought")?;
                prev > overbought && current < overbought
            }
        })
    }
}
