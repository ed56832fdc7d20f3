//! Fair value gaps: three-candle price imbalances that tend to get revisited.
//!
//! A bullish gap exists at candle `i` when `low[i] > high[i-2]`, a bearish one
//! when `high[i] < low[i-2]`. The gap is recorded on candle `i`, the first
//! candle at which it is knowable. Gaps stay active for `validity_candles`
//! or until price fills `fill_threshold` of them.

use crate::domain::error::ModuleError;
use crate::domain::module::{
    ConfigSchema, ModuleConfig, ModuleView, ParamSpec, SignalPath, StrategyModule,
};
use crate::domain::series::{Column, Series};
use crate::domain::strategy::Direction;

pub const BULLISH_FVG: &str = "bullish_fvg";
pub const BEARISH_FVG: &str = "bearish_fvg";
pub const IN_BULLISH_FVG: &str = "in_bullish_fvg";
pub const IN_BEARISH_FVG: &str = "in_bearish_fvg";
pub const FVG_LOW: &str = "fvg_low";
pub const FVG_HIGH: &str = "fvg_high";
pub const FVG_FILLED: &str = "fvg_filled";

#[derive(Debug, Default, Clone, Copy)]
pub struct FairValueGapsModule;

#[derive(Debug, Clone, Copy)]
struct Gap {
    /// Middle candle of the three-candle pattern.
    origin: usize,
    low: f64,
    high: f64,
    closed: bool,
}

fn in_zone_column(direction: Direction) -> &'static str {
    match direction {
        Direction::Long => IN_BULLISH_FVG,
        Direction::Short => IN_BEARISH_FVG,
    }
}

impl StrategyModule for FairValueGapsModule {
    fn id(&self) -> &'static str {
        "fair_value_gaps"
    }

    fn name(&self) -> &'static str {
        "Fair Value Gaps (FVG)"
    }

    fn category(&self) -> &'static str {
        "ict"
    }

    fn describe_config(&self) -> ConfigSchema {
        ConfigSchema::new(vec![
            ParamSpec::float("min_gap_pct", 0.5, 0.1, 2.0, "Minimum gap size to qualify as FVG (%)"),
            ParamSpec::int("validity_candles", 50, 10, 100, "How many candles a gap remains valid"),
            ParamSpec::float("fill_threshold", 0.5, 0.25, 1.0, "Fraction of the gap that must fill"),
        ])
    }

    fn warmup(&self, _config: &ModuleConfig) -> usize {
        2
    }

    fn calculate(
        &self,
        series: &Series,
        config: &ModuleConfig,
    ) -> Result<Vec<(String, Column)>, ModuleError> {
        let min_gap = config.get_float("min_gap_pct")? / 100.0;
        let validity = config.get_usize("validity_candles")?;
        let fill_threshold = config.get_float("fill_threshold")?;

        let (high, low, close) = (series.high(), series.low(), series.close());
        let n = series.len();

        let mut bullish = vec![false; n];
        let mut bearish = vec![false; n];
        let mut in_bullish = vec![false; n];
        let mut in_bearish = vec![false; n];
        let mut zone_low = vec![f64::NAN; n];
        let mut zone_high = vec![f64::NAN; n];
        let mut filled = vec![false; n];

        let mut active_bull: Vec<Gap> = Vec::new();
        let mut active_bear: Vec<Gap> = Vec::new();

        for i in 2..n {
            if low[i] > high[i - 2] && (low[i] - high[i - 2]) / high[i - 2] >= min_gap {
                bullish[i] = true;
                zone_low[i] = high[i - 2];
                zone_high[i] = low[i];
                active_bull.push(Gap {
                    origin: i - 1,
                    low: high[i - 2],
                    high: low[i],
                    closed: false,
                });
            }
            if high[i] < low[i - 2] && (low[i - 2] - high[i]) / low[i - 2] >= min_gap {
                bearish[i] = true;
                zone_low[i] = high[i];
                zone_high[i] = low[i - 2];
                active_bear.push(Gap {
                    origin: i - 1,
                    low: high[i],
                    high: low[i - 2],
                    closed: false,
                });
            }

            let price = close[i];
            for gap in active_bull.iter_mut().filter(|g| !g.closed) {
                if i - gap.origin > validity {
                    gap.closed = true;
                    continue;
                }
                if gap.low <= price && price <= gap.high {
                    in_bullish[i] = true;
                    zone_low[i] = gap.low;
                    zone_high[i] = gap.high;
                }
                if price <= gap.low + (gap.high - gap.low) * fill_threshold {
                    gap.closed = true;
                    filled[i] = true;
                }
            }
            for gap in active_bear.iter_mut().filter(|g| !g.closed) {
                if i - gap.origin > validity {
                    gap.closed = true;
                    continue;
                }
                if gap.low <= price && price <= gap.high {
                    in_bearish[i] = true;
                    zone_low[i] = gap.low;
                    zone_high[i] = gap.high;
                }
                if price >= gap.high - (gap.high - gap.low) * fill_threshold {
                    gap.closed = true;
                    filled[i] = true;
                }
            }
            active_bull.retain(|g| !g.closed);
            active_bear.retain(|g| !g.closed);
        }

        Ok(vec![
            (BULLISH_FVG.to_string(), Column::Flag(bullish)),
            (BEARISH_FVG.to_string(), Column::Flag(bearish)),
            (FVG_HIGH.to_string(), Column::Numeric(zone_high)),
            (FVG_LOW.to_string(), Column::Numeric(zone_low)),
            (IN_BULLISH_FVG.to_string(), Column::Flag(in_bullish)),
            (IN_BEARISH_FVG.to_string(), Column::Flag(in_bearish)),
            (FVG_FILLED.to_string(), Column::Flag(filled)),
        ])
    }

    fn check_entry_condition(
        &self,
        view: &ModuleView<'_>,
        index: usize,
        _config: &ModuleConfig,
        direction: Direction,
    ) -> Result<bool, ModuleError> {
        Ok(view
            .flag(in_zone_column(direction))?
            .get(index)
            .copied()
            .unwrap_or(false))
    }

    fn signal_path(&self) -> SignalPath {
        SignalPath::Vectorized
    }

    fn entry_flags(
        &self,
        view: &ModuleView<'_>,
        _config: &ModuleConfig,
        direction: Direction,
    ) -> Result<Vec<bool>, ModuleError> {
        Ok(view.flag(in_zone_column(direction))?.to_vec())
    }
}
