//! Series standardization.
//!
//! Steps, in order:
//! 1. drop exact duplicate rows (first occurrence kept)
//! 2. coerce row keys to UTC timestamps, dropping rows that fail; if every
//!    key fails, assign a synthetic one-minute grid starting at the epoch
//! 3. drop duplicate timestamps, keeping the last occurrence
//! 4. sort ascending by timestamp
//! 5. rewrite a producer-carried `timestamp` column to mirror the key
//!
//! `standardize` is total and idempotent.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use std::collections::{HashMap, HashSet};

use crate::domain::series::{Column, RowKey, Series, TIMESTAMP_COLUMN};

/// Step between synthetic index points, in seconds.
pub const SYNTHETIC_STEP_SECS: i64 = 60;

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
    "%Y.%m.%d %H:%M:%S",
    "%Y.%m.%d %H:%M",
];

/// Epoch values at or above this magnitude are read as milliseconds.
const EPOCH_MILLIS_THRESHOLD: i64 = 100_000_000_000;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StandardizeReport {
    pub input_rows: usize,
    pub exact_duplicates: usize,
    pub uncoercible_keys: usize,
    pub synthetic_index: bool,
    pub duplicate_timestamps: usize,
    pub output_rows: usize,
}

impl StandardizeReport {
    pub fn changed(&self) -> bool {
        self.exact_duplicates > 0
            || self.uncoercible_keys > 0
            || self.synthetic_index
            || self.duplicate_timestamps > 0
    }
}

pub fn standardize(series: &Series) -> Series {
    standardize_with_report(series).0
}

pub fn standardize_with_report(series: &Series) -> (Series, StandardizeReport) {
    let mut report = StandardizeReport {
        input_rows: series.len(),
        ..Default::default()
    };

    // 1. exact duplicates
    let mut seen = HashSet::new();
    let unique: Vec<usize> = (0..series.len())
        .filter(|&row| seen.insert(fingerprint(series, row)))
        .collect();
    report.exact_duplicates = series.len() - unique.len();
    let series = series.select_rows(&unique);

    // 2. coerce keys
    let coerced: Vec<Option<DateTime<Utc>>> = series.keys().iter().map(coerce_key).collect();
    let (mut series, times) = if !coerced.is_empty() && coerced.iter().all(Option::is_none) {
        report.uncoercible_keys = coerced.len();
        report.synthetic_index = true;
        let grid: Vec<DateTime<Utc>> = (0..coerced.len() as i64)
            .map(|i| DateTime::from_timestamp(i * SYNTHETIC_STEP_SECS, 0).unwrap_or_default())
            .collect();
        (series, grid)
    } else {
        let kept: Vec<usize> = coerced
            .iter()
            .enumerate()
            .filter_map(|(row, ts)| ts.map(|_| row))
            .collect();
        report.uncoercible_keys = coerced.len() - kept.len();
        let times: Vec<DateTime<Utc>> = kept.iter().filter_map(|&row| coerced[row]).collect();
        (series.select_rows(&kept), times)
    };

    // 3. duplicate timestamps, latest write wins
    let mut last_row: HashMap<DateTime<Utc>, usize> = HashMap::with_capacity(times.len());
    for (row, ts) in times.iter().enumerate() {
        last_row.insert(*ts, row);
    }
    let mut kept: Vec<usize> = (0..times.len())
        .filter(|row| last_row.get(&times[*row]) == Some(row))
        .collect();
    report.duplicate_timestamps = times.len() - kept.len();

    // 4. sort
    kept.sort_by_key(|&row| times[row]);

    series.replace_index(times.iter().map(|ts| RowKey::Time(*ts)).collect());
    let mut series = series.select_rows(&kept);

    // 5. mirror column
    if series.has_column(TIMESTAMP_COLUMN) {
        let mirror = (0..series.len())
            .map(|row| {
                series
                    .time_at(row)
                    .map_or(f64::NAN, |ts| ts.timestamp() as f64)
            })
            .collect();
        series.set_column(TIMESTAMP_COLUMN, Column::Numeric(mirror));
    }

    report.output_rows = series.len();
    (series, report)
}

/// Coerce a row key into a UTC timestamp.
///
/// Accepts RFC 3339, common `Y-m-d H:M[:S]` layouts (read as UTC), bare
/// dates (midnight UTC), and integer epoch seconds or milliseconds.
pub fn coerce_key(key: &RowKey) -> Option<DateTime<Utc>> {
    let raw = match key {
        RowKey::Time(ts) => return Some(*ts),
        RowKey::Raw(raw) => raw.trim(),
    };
    if raw.is_empty() {
        return None;
    }
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    for fmt in DATETIME_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(naive.and_utc());
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0).map(|naive| naive.and_utc());
    }
    if let Ok(epoch) = raw.parse::<i64>() {
        return if epoch.abs() >= EPOCH_MILLIS_THRESHOLD {
            DateTime::from_timestamp_millis(epoch)
        } else {
            DateTime::from_timestamp(epoch, 0)
        };
    }
    None
}

#[derive(Debug, PartialEq, Eq, Hash)]
enum Cell {
    Time(i64, u32),
    Raw(String),
    Bits(u64),
    Flag(bool),
    Text(Option<String>),
}

fn fingerprint(series: &Series, row: usize) -> Vec<Cell> {
    let mut cells = Vec::with_capacity(6 + series.columns().len());
    cells.push(match &series.keys()[row] {
        RowKey::Time(ts) => Cell::Time(ts.timestamp(), ts.timestamp_subsec_nanos()),
        RowKey::Raw(raw) => Cell::Raw(raw.clone()),
    });
    let bar = series.bar(row);
    for value in [bar.open, bar.high, bar.low, bar.close, bar.volume] {
        cells.push(Cell::Bits(value.to_bits()));
    }
    for (_, column) in series.columns() {
        cells.push(match column {
            Column::Numeric(v) => Cell::Bits(v[row].to_bits()),
            Column::Flag(v) => Cell::Flag(v[row]),
            Column::Label(v) => Cell::Text(v[row].clone()),
        });
    }
    cells
}
