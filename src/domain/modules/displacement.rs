//! Displacement: a run of strong-bodied candles in one direction that moves
//! price at least `min_move_pct`. The signal stays active for
//! `validity_candles` candles starting at the candle that completes the run.

use crate::domain::error::ModuleError;
use crate::domain::module::{
    ConfigSchema, ModuleConfig, ModuleView, ParamSpec, SignalPath, StrategyModule,
};
use crate::domain::series::{Column, Series};
use crate::domain::strategy::Direction;

pub const CANDLE_BODY_PCT: &str = "candle_body_pct";
pub const BULLISH_DISPLACEMENT: &str = "bullish_displacement";
pub const BEARISH_DISPLACEMENT: &str = "bearish_displacement";
pub const DISPLACEMENT_ACTIVE: &str = "displacement_active";
pub const DISPLACEMENT_TYPE: &str = "displacement_type";
pub const DISPLACEMENT_MOVE_PCT: &str = "displacement_move_pct";

const BULLISH: &str = "BULLISH";
const BEARISH: &str = "BEARISH";

#[derive(Debug, Default, Clone, Copy)]
pub struct DisplacementModule;

fn wanted_type(direction: Direction) -> &'static str {
    match direction {
        Direction::Long => BULLISH,
        Direction::Short => BEARISH,
    }
}

impl StrategyModule for DisplacementModule {
    fn id(&self) -> &'static str {
        "displacement"
    }

    fn name(&self) -> &'static str {
        "Displacement"
    }

    fn category(&self) -> &'static str {
        "ict"
    }

    fn describe_config(&self) -> ConfigSchema {
        ConfigSchema::new(vec![
            ParamSpec::float("min_body_pct", 70.0, 50.0, 90.0, "Minimum body as % of candle range"),
            ParamSpec::int("min_candles", 3, 2, 10, "Consecutive strong candles required"),
            ParamSpec::float("min_move_pct", 1.5, 0.5, 5.0, "Minimum total move of the run (%)"),
            ParamSpec::int("validity_candles", 10, 5, 30, "Candles the signal stays active"),
        ])
    }

    fn warmup(&self, config: &ModuleConfig) -> usize {
        config.get_usize("min_candles").map_or(0, |n| n.saturating_sub(1))
    }

    fn calculate(
        &self,
        series: &Series,
        config: &ModuleConfig,
    ) -> Result<Vec<(String, Column)>, ModuleError> {
        let min_body = config.get_float("min_body_pct")? / 100.0;
        let min_candles = config.get_usize("min_candles")?.max(1);
        let min_move = config.get_float("min_move_pct")? / 100.0;
        let validity = config.get_usize("validity_candles")?;
        let n = series.len();

        let mut body_pct = vec![0.0; n];
        let mut strong_bull = vec![false; n];
        let mut strong_bear = vec![false; n];
        for row in 0..n {
            let bar = series.bar(row);
            let range = bar.range();
            if range > 0.0 {
                body_pct[row] = bar.body() / range;
                strong_bull[row] = bar.close > bar.open && body_pct[row] >= min_body;
                strong_bear[row] = bar.close < bar.open && body_pct[row] >= min_body;
            }
        }

        let mut bullish = vec![false; n];
        let mut bearish = vec![false; n];
        let mut move_pct = vec![f64::NAN; n];
        for i in (min_candles - 1)..n {
            let run = (i + 1 - min_candles)..=i;
            let start = series.bar(*run.start()).open;
            let end = series.bar(i).close;
            if strong_bull[run.clone()].iter().all(|s| *s) && (end - start) / start >= min_move {
                bullish[i] = true;
                move_pct[i] = (end - start) / start * 100.0;
            }
            if strong_bear[run].iter().all(|s| *s) && (start - end) / start >= min_move {
                bearish[i] = true;
                move_pct[i] = (start - end) / start * 100.0;
            }
        }

        let mut active = vec![false; n];
        let mut kind: Vec<Option<String>> = vec![None; n];
        let mut current: Option<(&str, usize)> = None;
        for row in 0..n {
            if bullish[row] {
                current = Some((BULLISH, row));
            } else if bearish[row] {
                current = Some((BEARISH, row));
            }
            if let Some((label, since)) = current {
                if row - since < validity {
                    active[row] = true;
                    kind[row] = Some(label.to_string());
                } else {
                    current = None;
                }
            }
        }

        Ok(vec![
            (CANDLE_BODY_PCT.to_string(), Column::Numeric(body_pct)),
            (BULLISH_DISPLACEMENT.to_string(), Column::Flag(bullish)),
            (BEARISH_DISPLACEMENT.to_string(), Column::Flag(bearish)),
            (DISPLACEMENT_MOVE_PCT.to_string(), Column::Numeric(move_pct)),
            (DISPLACEMENT_ACTIVE.to_string(), Column::Flag(active)),
            (DISPLACEMENT_TYPE.to_string(), Column::Label(kind)),
        ])
    }

    fn check_entry_condition(
        &self,
        view: &ModuleView<'_>,
        index: usize,
        _config: &ModuleConfig,
        direction: Direction,
    ) -> Result<bool, ModuleError> {
        let active = view.flag(DISPLACEMENT_ACTIVE)?;
        let kind = view.label(DISPLACEMENT_TYPE)?;
        Ok(active.get(index).copied().unwrap_or(false)
            && kind
                .get(index)
                .and_then(|k| k.as_deref())
                .is_some_and(|k| k == wanted_type(direction)))
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
        let active = view.flag(DISPLACEMENT_ACTIVE)?;
        let kind = view.label(DISPLACEMENT_TYPE)?;
        let wanted = wanted_type(direction);
        Ok(active
            .iter()
            .zip(kind)
            .map(|(a, k)| *a && k.as_deref() == Some(wanted))
            .collect())
    }
}
