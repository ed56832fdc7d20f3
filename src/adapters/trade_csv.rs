//! Trade list export as CSV.

use std::fs::File;
use std::io::Write;
use std::path::Path;

use crate::domain::error::ModtraderError;
use crate::domain::trade::Trade;

/// Column order matches the field order of `Trade`.
const HEADERS: &[&str] = &[
    "symbol",
    "direction",
    "entry_time",
    "exit_time",
    "entry_price",
    "exit_price",
    "stop_loss",
    "take_profit",
    "pnl",
    "pnl_pct",
    "r_multiple",
    "result",
    "candles_held",
];

pub fn write_trades<W: Write>(writer: W, trades: &[Trade]) -> Result<(), ModtraderError> {
    let mut wtr = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(writer);
    wtr.write_record(HEADERS).map_err(std::io::Error::from)?;
    for trade in trades {
        wtr.serialize(trade).map_err(std::io::Error::from)?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn write_trades_file(path: &Path, trades: &[Trade]) -> Result<(), ModtraderError> {
    write_trades(File::create(path)?, trades)
}
