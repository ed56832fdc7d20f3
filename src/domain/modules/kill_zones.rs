//! Kill zones: UTC hour windows of elevated activity.
//!
//! A time filter, not a directional signal: both directions enter whenever
//! the candle is inside an enabled zone.

use chrono::Timelike;

use crate::domain::error::ModuleError;
use crate::domain::module::{
    ConfigSchema, ModuleConfig, ModuleView, ParamSpec, SignalPath, StrategyModule,
};
use crate::domain::series::{Column, Series};
use crate::domain::strategy::Direction;

pub const IN_KILL_ZONE: &str = "in_kill_zone";
pub const KILL_ZONE: &str = "kill_zone";

const ZONES: &[&str] = &["london", "newyork", "asian"];

#[derive(Debug, Default, Clone, Copy)]
pub struct KillZonesModule;

struct Zone {
    key: &'static str,
    label: &'static str,
    flag_column: &'static str,
    start: u32,
    end: u32,
}

impl Zone {
    /// `[start, end)`, wrapping past midnight when `start > end`.
    fn contains(&self, hour: u32) -> bool {
        if self.start <= self.end {
            (self.start..self.end).contains(&hour)
        } else {
            hour >= self.start || hour < self.end
        }
    }
}

fn hour_param(config: &ModuleConfig, name: &str) -> Result<u32, ModuleError> {
    let hour = config.get_usize(name)?;
    u32::try_from(hour).map_err(|_| ModuleError::Computation {
        reason: format!("{} out of range", name),
    })
}

/// Zones in label priority order: New York over London over Asian.
fn zones(config: &ModuleConfig) -> Result<Vec<Zone>, ModuleError> {
    Ok(vec![
        Zone {
            key: "newyork",
            label: "NEW_YORK",
            flag_column: "in_newyork_kz",
            start: hour_param(config, "ny_start")?,
            end: hour_param(config, "ny_end")?,
        },
        Zone {
            key: "london",
            label: "LONDON",
            flag_column: "in_london_kz",
            start: hour_param(config, "london_start")?,
            end: hour_param(config, "london_end")?,
        },
        Zone {
            key: "asian",
            label: "ASIAN",
            flag_column: "in_asian_kz",
            start: hour_param(config, "asian_start")?,
            end: hour_param(config, "asian_end")?,
        },
    ])
}

impl StrategyModule for KillZonesModule {
    fn id(&self) -> &'static str {
        "kill_zones"
    }

    fn name(&self) -> &'static str {
        "Kill Zones"
    }

    fn category(&self) -> &'static str {
        "ict"
    }

    fn describe_config(&self) -> ConfigSchema {
        ConfigSchema::new(vec![
            ParamSpec::multi("enabled_zones", &["london", "newyork"], ZONES, "Kill zones to trade"),
            ParamSpec::int("london_start", 7, 0, 23, "London kill zone start hour (UTC)"),
            ParamSpec::int("london_end", 10, 0, 23, "London kill zone end hour (UTC)"),
            ParamSpec::int("ny_start", 12, 0, 23, "New York kill zone start hour (UTC)"),
            ParamSpec::int("ny_end", 15, 0, 23, "New York kill zone end hour (UTC)"),
            ParamSpec::int("asian_start", 0, 0, 23, "Asian kill zone start hour (UTC)"),
            ParamSpec::int("asian_end", 3, 0, 23, "Asian kill zone end hour (UTC)"),
        ])
    }

    fn calculate(
        &self,
        series: &Series,
        config: &ModuleConfig,
    ) -> Result<Vec<(String, Column)>, ModuleError> {
        let enabled = config.get_list("enabled_zones")?;
        let zones = zones(config)?;
        let n = series.len();

        let mut in_zone = vec![false; n];
        let mut label: Vec<Option<String>> = vec![None; n];
        let mut per_zone: Vec<Vec<bool>> = vec![vec![false; n]; zones.len()];

        for row in 0..n {
            let ts = series.time_at(row).ok_or_else(|| ModuleError::Misaligned {
                reason: format!("row {} has no timestamp", row),
            })?;
            let hour = ts.hour();
            for (z, zone) in zones.iter().enumerate() {
                if !enabled.iter().any(|e| e == zone.key) || !zone.contains(hour) {
                    continue;
                }
                per_zone[z][row] = true;
                in_zone[row] = true;
                if label[row].is_none() {
                    label[row] = Some(zone.label.to_string());
                }
            }
        }

        let mut columns = vec![
            (IN_KILL_ZONE.to_string(), Column::Flag(in_zone)),
            (KILL_ZONE.to_string(), Column::Label(label)),
        ];
        for (zone, flags) in zones.iter().zip(per_zone) {
            columns.push((zone.flag_column.to_string(), Column::Flag(flags)));
        }
        Ok(columns)
    }

    fn check_entry_condition(
        &self,
        view: &ModuleView<'_>,
        index: usize,
        _config: &ModuleConfig,
        _direction: Direction,
    ) -> Result<bool, ModuleError> {
        Ok(view.flag(IN_KILL_ZONE)?.get(index).copied().unwrap_or(false))
    }

    fn reads_candle_hours(&self) -> bool {
        true
    }

    fn signal_path(&self) -> SignalPath {
        SignalPath::Vectorized
    }

    fn entry_flags(
        &self,
        view: &ModuleView<'_>,
        _config: &ModuleConfig,
        _direction: Direction,
    ) -> Result<Vec<bool>, ModuleError> {
        Ok(view.flag(IN_KILL_ZONE)?.to_vec())
    }
}
