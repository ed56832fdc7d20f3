//! Market data port.

use chrono::{DateTime, Utc};

use crate::domain::error::ModtraderError;
use crate::domain::series::Series;
use crate::domain::strategy::Timeframe;

pub trait DataPort {
    /// Raw OHLCV rows for `symbol` in `[start, end]`. An empty series means
    /// "no data"; the pipeline turns it into `DataUnavailable`. Rows need not
    /// be sorted, unique or even carry parseable keys.
    fn fetch_ohlcv(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Series, ModtraderError>;

    fn list_symbols(&self) -> Result<Vec<String>, ModtraderError>;
}
