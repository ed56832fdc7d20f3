//! CSV file data adapter.
//!
//! One file per symbol and timeframe, `{SYMBOL}_{timeframe}.csv`, with a
//! header row. The row key is the `timestamp`/`time`/`datetime`/`date` column
//! (or the first column if none of those exist); `open`, `high`, `low`,
//! `close` are required, `volume` is optional. Keys are passed through raw
//! for the standardizer to coerce; unreadable prices become NaN.

use crate::domain::error::ModtraderError;
use crate::domain::series::{Bar, RowKey, Series};
use crate::domain::standardize::coerce_key;
use crate::domain::strategy::Timeframe;
use crate::ports::data_port::DataPort;
use chrono::{DateTime, Utc};
use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;

const KEY_HEADERS: &[&str] = &["timestamp", "time", "datetime", "date"];

pub struct CsvAdapter {
    base_path: PathBuf,
}

struct Layout {
    key: usize,
    open: usize,
    high: usize,
    low: usize,
    close: usize,
    volume: Option<usize>,
}

impl Layout {
    fn from_headers(headers: &csv::StringRecord, path: &str) -> Result<Self, ModtraderError> {
        let names: Vec<String> = headers.iter().map(|h| h.trim().to_lowercase()).collect();
        let find = |name: &str| names.iter().position(|h| h == name);
        let need = |name: &str| {
            find(name).ok_or_else(|| ModtraderError::DataSource {
                reason: format!("{} has no {} column", path, name),
            })
        };
        Ok(Layout {
            key: KEY_HEADERS.iter().find_map(|&h| find(h)).unwrap_or(0),
            open: need("open")?,
            high: need("high")?,
            low: need("low")?,
            close: need("close")?,
            volume: find("volume"),
        })
    }
}

fn number(record: &csv::StringRecord, column: usize) -> f64 {
    record
        .get(column)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(f64::NAN)
}

impl CsvAdapter {
    pub fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    fn csv_path(&self, symbol: &str, timeframe: Timeframe) -> PathBuf {
        self.base_path
            .join(format!("{}_{}.csv", symbol.to_uppercase(), timeframe))
    }
}

impl DataPort for CsvAdapter {
    fn fetch_ohlcv(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Series, ModtraderError> {
        let path = self.csv_path(symbol, timeframe);
        let display = path.display().to_string();
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Series::new()),
            Err(e) => {
                return Err(ModtraderError::DataSource {
                    reason: format!("failed to read {}: {}", display, e),
                });
            }
        };

        let mut rdr = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(content.as_bytes());
        let headers = rdr
            .headers()
            .map_err(|e| ModtraderError::DataSource {
                reason: format!("CSV header error in {}: {}", display, e),
            })?
            .clone();
        let layout = Layout::from_headers(&headers, &display)?;

        let mut series = Series::new();
        for result in rdr.records() {
            let record = result.map_err(|e| ModtraderError::DataSource {
                reason: format!("CSV parse error in {}: {}", display, e),
            })?;
            let key = RowKey::Raw(record.get(layout.key).unwrap_or_default().to_string());
            if let Some(ts) = coerce_key(&key) {
                if ts < start || ts > end {
                    continue;
                }
            }
            series.push(
                key,
                Bar {
                    open: number(&record, layout.open),
                    high: number(&record, layout.high),
                    low: number(&record, layout.low),
                    close: number(&record, layout.close),
                    volume: layout.volume.map_or(0.0, |c| number(&record, c)),
                },
            );
        }
        Ok(series)
    }

    fn list_symbols(&self) -> Result<Vec<String>, ModtraderError> {
        let entries = fs::read_dir(&self.base_path).map_err(|e| ModtraderError::DataSource {
            reason: format!(
                "failed to read directory {}: {}",
                self.base_path.display(),
                e
            ),
        })?;

        let mut symbols = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| ModtraderError::DataSource {
                reason: format!("directory entry error: {}", e),
            })?;
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if let Some(stem) = name.strip_suffix(".csv") {
                if let Some((symbol, timeframe)) = stem.rsplit_once('_') {
                    if timeframe.parse::<Timeframe>().is_ok() {
                        symbols.push(symbol.to_string());
                    }
                }
            }
        }

        symbols.sort();
        symbols.dedup();
        Ok(symbols)
    }
}
