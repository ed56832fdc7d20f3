//! `EventSink` over the `log` facade.

use log::{debug, info, warn};

use crate::domain::event::Event;
use crate::ports::event_port::EventSink;

const TARGET: &str = "modtrader";

#[derive(Debug, Default, Clone, Copy)]
pub struct LogEventSink;

impl EventSink for LogEventSink {
    fn emit(&self, event: Event) {
        match event {
            Event::Fetched {
                symbol,
                timeframe,
                start,
                end,
                rows,
            } => info!(
                target: TARGET,
                "fetched {} rows of {} {} ({} .. {})",
                rows,
                symbol,
                timeframe,
                start.format("%Y-%m-%d %H:%M"),
                end.format("%Y-%m-%d %H:%M")
            ),
            Event::Standardized(report) => {
                if report.synthetic_index {
                    warn!(
                        target: TARGET,
                        "no row key parsed as a timestamp; using a synthetic index for {} rows",
                        report.output_rows
                    );
                } else if report.changed() {
                    info!(
                        target: TARGET,
                        "standardized {} -> {} rows ({} exact duplicates, {} unparsed keys, {} duplicate timestamps)",
                        report.input_rows,
                        report.output_rows,
                        report.exact_duplicates,
                        report.uncoercible_keys,
                        report.duplicate_timestamps
                    );
                } else {
                    debug!(target: TARGET, "series already standard ({} rows)", report.output_rows);
                }
            }
            Event::ModuleCalculated {
                label,
                module,
                columns,
            } => debug!(
                target: TARGET,
                "module {} ({}) added columns: {}",
                label,
                module,
                columns.join(", ")
            ),
            Event::ColumnRenamed { label, from, to } => {
                info!(target: TARGET, "module {}: column {} stored as {}", label, from, to)
            }
            Event::ModuleRetry { label, reason } => warn!(
                target: TARGET,
                "module {} failed ({}); re-standardizing and retrying once",
                label,
                reason
            ),
            Event::Cleaned {
                rows_before,
                rows_after,
                missing_prices,
                undefined_columns,
            } => info!(
                target: TARGET,
                "cleaned {} -> {} rows ({} without usable prices, {} without indicator values)",
                rows_before,
                rows_after,
                missing_prices,
                undefined_columns
            ),
            Event::ModuleSignals {
                label,
                path,
                fell_back,
                positives,
                row_errors,
            } => {
                if fell_back {
                    warn!(
                        target: TARGET,
                        "module {}: vectorized signal unavailable, evaluated row by row",
                        label
                    );
                }
                if row_errors > 0 {
                    warn!(target: TARGET, "module {}: {} rows failed and count as no signal", label, row_errors);
                }
                info!(target: TARGET, "module {} ({}): {} entry signals", label, path, positives);
            }
            Event::PositionOpened {
                index,
                time,
                direction,
                entry_price,
                stop_loss,
                take_profit,
            } => debug!(
                target: TARGET,
                "#{} {} open {} @ {:.5} sl {:.5} tp {:.5}",
                index,
                time.format("%Y-%m-%d %H:%M"),
                direction,
                entry_price,
                stop_loss,
                take_profit
            ),
            Event::PositionClosed {
                index,
                time,
                result,
                exit_price,
                r_multiple,
            } => debug!(
                target: TARGET,
                "#{} {} close {} @ {:.5} ({:+.2}R)",
                index,
                time.format("%Y-%m-%d %H:%M"),
                result,
                exit_price,
                r_multiple
            ),
            Event::Completed {
                rows,
                signals,
                trades,
            } => info!(
                target: TARGET,
                "backtest complete: {} rows, {} entry signals, {} trades",
                rows,
                signals,
                trades
            ),
        }
    }
}
