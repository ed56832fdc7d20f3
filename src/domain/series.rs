//! Candle series: OHLCV rows keyed by timestamp, plus module-derived columns.

use chrono::{DateTime, Utc};

use crate::domain::error::{ModtraderError, ModuleError};

/// Reserved column name that mirrors the row key as epoch seconds.
pub const TIMESTAMP_COLUMN: &str = "timestamp";

/// Row key as delivered by a producer. After standardization every key is
/// `Time`.
#[derive(Debug, Clone, PartialEq)]
pub enum RowKey {
    Time(DateTime<Utc>),
    Raw(String),
}

impl From<DateTime<Utc>> for RowKey {
    fn from(ts: DateTime<Utc>) -> Self {
        RowKey::Time(ts)
    }
}

impl From<&str> for RowKey {
    fn from(raw: &str) -> Self {
        RowKey::Raw(raw.to_string())
    }
}

/// One OHLCV row. Missing prices are NaN.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bar {
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Bar {
    pub fn flat(price: f64) -> Self {
        Bar {
            open: price,
            high: price,
            low: price,
            close: price,
            volume: 0.0,
        }
    }

    /// high - low
    pub fn range(&self) -> f64 {
        self.high - self.low
    }

    /// |close - open|
    pub fn body(&self) -> f64 {
        (self.close - self.open).abs()
    }

    /// (high + low + close) / 3
    pub fn typical_price(&self) -> f64 {
        (self.high + self.low + self.close) / 3.0
    }

    pub fn has_prices(&self) -> bool {
        !(self.open.is_nan() || self.high.is_nan() || self.low.is_nan() || self.close.is_nan())
    }

    /// All prices present and a positive close, so a risk unit can be
    /// derived from it.
    pub fn is_tradable(&self) -> bool {
        self.has_prices() && self.close > 0.0
    }
}

/// A derived column appended by a strategy module.
#[derive(Debug, Clone, PartialEq)]
pub enum Column {
    /// NaN marks an undefined value (e.g. warm-up).
    Numeric(Vec<f64>),
    Flag(Vec<bool>),
    /// Categorical value; `None` is undefined.
    Label(Vec<Option<String>>),
}

impl Column {
    pub fn len(&self) -> usize {
        match self {
            Column::Numeric(v) => v.len(),
            Column::Flag(v) => v.len(),
            Column::Label(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Column::Numeric(_) => "numeric",
            Column::Flag(_) => "flag",
            Column::Label(_) => "label",
        }
    }

    pub fn is_defined_at(&self, row: usize) -> bool {
        match self {
            Column::Numeric(v) => v.get(row).is_some_and(|x| !x.is_nan()),
            Column::Flag(v) => row < v.len(),
            Column::Label(v) => v.get(row).is_some_and(|x| x.is_some()),
        }
    }

    /// Carry the last defined value forward across undefined gaps.
    pub fn forward_fill(&mut self) {
        match self {
            Column::Numeric(v) => {
                let mut last = f64::NAN;
                for x in v.iter_mut() {
                    if x.is_nan() {
                        *x = last;
                    } else {
                        last = *x;
                    }
                }
            }
            Column::Flag(_) => {}
            Column::Label(v) => {
                let mut last: Option<String> = None;
                for x in v.iter_mut() {
                    if x.is_none() {
                        x.clone_from(&last);
                    } else {
                        last.clone_from(x);
                    }
                }
            }
        }
    }

    fn select(&self, rows: &[usize]) -> Column {
        match self {
            Column::Numeric(v) => Column::Numeric(rows.iter().map(|&i| v[i]).collect()),
            Column::Flag(v) => Column::Flag(rows.iter().map(|&i| v[i]).collect()),
            Column::Label(v) => Column::Label(rows.iter().map(|&i| v[i].clone()).collect()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Series {
    index: Vec<RowKey>,
    open: Vec<f64>,
    high: Vec<f64>,
    low: Vec<f64>,
    close: Vec<f64>,
    volume: Vec<f64>,
    columns: Vec<(String, Column)>,
}

impl Series {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_bars<K, I>(rows: I) -> Self
    where
        K: Into<RowKey>,
        I: IntoIterator<Item = (K, Bar)>,
    {
        let mut series = Series::new();
        for (key, bar) in rows {
            series.push(key, bar);
        }
        series
    }

    /// Append a row. Only valid before any derived column exists.
    pub fn push(&mut self, key: impl Into<RowKey>, bar: Bar) {
        debug_assert!(self.columns.is_empty(), "push after derived columns");
        self.index.push(key.into());
        self.open.push(bar.open);
        self.high.push(bar.high);
        self.low.push(bar.low);
        self.close.push(bar.close);
        self.volume.push(bar.volume);
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn keys(&self) -> &[RowKey] {
        &self.index
    }

    pub fn time_at(&self, row: usize) -> Option<DateTime<Utc>> {
        match self.index.get(row) {
            Some(RowKey::Time(ts)) => Some(*ts),
            _ => None,
        }
    }

    pub fn bar(&self, row: usize) -> Bar {
        Bar {
            open: self.open[row],
            high: self.high[row],
            low: self.low[row],
            close: self.close[row],
            volume: self.volume[row],
        }
    }

    pub fn open(&self) -> &[f64] {
        &self.open
    }

    pub fn high(&self) -> &[f64] {
        &self.high
    }

    pub fn low(&self) -> &[f64] {
        &self.low
    }

    pub fn close(&self) -> &[f64] {
        &self.close
    }

    pub fn volume(&self) -> &[f64] {
        &self.volume
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|(n, _)| n == name)
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|(n, _)| n == name).map(|(_, c)| c)
    }

    pub fn numeric(&self, name: &str) -> Option<&[f64]> {
        match self.column(name) {
            Some(Column::Numeric(v)) => Some(v),
            _ => None,
        }
    }

    pub fn flag(&self, name: &str) -> Option<&[bool]> {
        match self.column(name) {
            Some(Column::Flag(v)) => Some(v),
            _ => None,
        }
    }

    pub fn label(&self, name: &str) -> Option<&[Option<String>]> {
        match self.column(name) {
            Some(Column::Label(v)) => Some(v),
            _ => None,
        }
    }

    /// Derived columns in the order they were appended.
    pub fn columns(&self) -> &[(String, Column)] {
        &self.columns
    }

    /// Append a derived column. The name must be free and the length must
    /// match the row count.
    pub fn push_column(&mut self, name: impl Into<String>, column: Column) -> Result<(), ModuleError> {
        let name = name.into();
        if column.len() != self.len() {
            return Err(ModuleError::Misaligned {
                reason: format!(
                    "column {} has {} rows, series has {}",
                    name,
                    column.len(),
                    self.len()
                ),
            });
        }
        if self.has_column(&name) {
            return Err(ModuleError::Computation {
                reason: format!("column {} already exists", name),
            });
        }
        self.columns.push((name, column));
        Ok(())
    }

    pub(crate) fn column_mut(&mut self, name: &str) -> Option<&mut Column> {
        self.columns.iter_mut().find(|(n, _)| n == name).map(|(_, c)| c)
    }

    pub(crate) fn set_column(&mut self, name: &str, column: Column) {
        match self.column_mut(name) {
            Some(existing) => *existing = column,
            None => self.columns.push((name.to_string(), column)),
        }
    }

    /// Keep only the given rows, in the given order.
    pub fn select_rows(&self, rows: &[usize]) -> Series {
        Series {
            index: rows.iter().map(|&i| self.index[i].clone()).collect(),
            open: rows.iter().map(|&i| self.open[i]).collect(),
            high: rows.iter().map(|&i| self.high[i]).collect(),
            low: rows.iter().map(|&i| self.low[i]).collect(),
            close: rows.iter().map(|&i| self.close[i]).collect(),
            volume: rows.iter().map(|&i| self.volume[i]).collect(),
            columns: self
                .columns
                .iter()
                .map(|(n, c)| (n.clone(), c.select(rows)))
                .collect(),
        }
    }

    pub(crate) fn replace_index(&mut self, index: Vec<RowKey>) {
        debug_assert_eq!(index.len(), self.index.len());
        self.index = index;
    }

    /// Timestamps of a standardized series. Fails if any key is not a
    /// timestamp or the keys are not strictly increasing.
    pub fn timestamps(&self) -> Result<Vec<DateTime<Utc>>, ModtraderError> {
        let mut out = Vec::with_capacity(self.len());
        for (row, key) in self.index.iter().enumerate() {
            let ts = match key {
                RowKey::Time(ts) => *ts,
                RowKey::Raw(raw) => {
                    return Err(ModtraderError::StandardizationFailure {
                        reason: format!("row {} has unparsed key {:?}", row, raw),
                    });
                }
            };
            if let Some(prev) = out.last() {
                if ts <= *prev {
                    return Err(ModtraderError::StandardizationFailure {
                        reason: format!("timestamps not strictly increasing at row {}", row),
                    });
                }
            }
            out.push(ts);
        }
        Ok(out)
    }
}
