//! Strategy request: what to trade, how to manage the position, which
//! modules gate entries.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

use crate::domain::module::ModuleConfig;
use crate::domain::session::Session;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    Long,
    Short,
}

impl Direction {
    /// +1 for long, -1 for short.
    pub fn sign(&self) -> f64 {
        match self {
            Direction::Long => 1.0,
            Direction::Short => -1.0,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Long => "LONG",
            Direction::Short => "SHORT",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "LONG" => Ok(Direction::Long),
            "SHORT" => Ok(Direction::Short),
            other => Err(format!("unknown direction {:?}, expected LONG or SHORT", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Timeframe {
    M1,
    M5,
    M15,
    M30,
    H1,
    H4,
    D1,
}

impl Timeframe {
    pub fn minutes(&self) -> i64 {
        match self {
            Timeframe::M1 => 1,
            Timeframe::M5 => 5,
            Timeframe::M15 => 15,
            Timeframe::M30 => 30,
            Timeframe::H1 => 60,
            Timeframe::H4 => 240,
            Timeframe::D1 => 1440,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Timeframe::M1 => "1m",
            Timeframe::M5 => "5m",
            Timeframe::M15 => "15m",
            Timeframe::M30 => "30m",
            Timeframe::H1 => "1h",
            Timeframe::H4 => "4h",
            Timeframe::D1 => "1d",
        }
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Timeframe {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "1m" => Ok(Timeframe::M1),
            "5m" => Ok(Timeframe::M5),
            "15m" => Ok(Timeframe::M15),
            "30m" => Ok(Timeframe::M30),
            "1h" | "60m" => Ok(Timeframe::H1),
            "4h" => Ok(Timeframe::H4),
            "1d" | "d1" => Ok(Timeframe::D1),
            other => Err(format!("unknown timeframe {:?}", other)),
        }
    }
}

/// Lookback period of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Period {
    Days5,
    Days7,
    Month1,
    Month2,
    Month3,
    Month6,
    Year1,
    Year2,
}

impl Period {
    pub fn days(&self) -> i64 {
        match self {
            Period::Days5 => 5,
            Period::Days7 => 7,
            Period::Month1 => 30,
            Period::Month2 => 60,
            Period::Month3 => 90,
            Period::Month6 => 180,
            Period::Year1 => 365,
            Period::Year2 => 730,
        }
    }

    /// `(start, end)` of the lookback window ending at `end`.
    pub fn range_ending(&self, end: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
        (end - Duration::days(self.days()), end)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Period::Days5 => "5d",
            Period::Days7 => "7d",
            Period::Month1 => "1mo",
            Period::Month2 => "2mo",
            Period::Month3 => "3mo",
            Period::Month6 => "6mo",
            Period::Year1 => "1y",
            Period::Year2 => "2y",
        }
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Period {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "5d" => Ok(Period::Days5),
            "7d" => Ok(Period::Days7),
            "1mo" => Ok(Period::Month1),
            "2mo" => Ok(Period::Month2),
            "3mo" => Ok(Period::Month3),
            "6mo" => Ok(Period::Month6),
            "1y" => Ok(Period::Year1),
            "2y" => Ok(Period::Year2),
            other => Err(format!("unknown period {:?}", other)),
        }
    }
}

pub const DEFAULT_RISK_PCT: f64 = 1.0;

#[derive(Debug, Clone, PartialEq)]
pub struct StrategyConfig {
    pub symbol: String,
    pub timeframe: Timeframe,
    pub direction: Direction,
    pub period: Period,
    pub session: Option<Session>,
    pub tp_r: f64,
    pub sl_r: f64,
    /// Percentage of the entry close that makes one risk unit.
    pub risk_pct: f64,
    /// Ordered module entries; every entry must agree for an entry signal.
    pub modules: Vec<ModuleConfig>,
}
