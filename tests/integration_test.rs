//! Engine integration tests: full runs through `Backtest` with a mock data
//! provider and scripted modules.

mod common;

use approx::assert_relative_eq;
use chrono::{DateTime, Duration, Utc};
use common::*;
use modtrader::domain::backtest::{Backtest, BacktestOutcome, EngineSettings};
use modtrader::domain::error::ModtraderError;
use modtrader::domain::event::Event;
use modtrader::domain::module::{ConfiguredModule, StrategyModule};
use modtrader::domain::modules::{Catalog, ModuleRegistry};
use modtrader::domain::session::Session;
use modtrader::domain::strategy::{Direction, StrategyConfig};
use modtrader::domain::trade::{TradeResult, validate_trades};

const SYMBOL: &str = "XAUUSD";

fn end() -> DateTime<Utc> {
    start_time() + Duration::days(3)
}

fn configure(modules: Vec<(Box<dyn StrategyModule>, &str)>) -> Vec<ConfiguredModule> {
    modules
        .into_iter()
        .map(|(module, label)| {
            let id = module.id();
            ConfiguredModule::new(module, module_config(id, label))
        })
        .collect()
}

fn request_for(direction: Direction, modules: &[ConfiguredModule]) -> StrategyConfig {
    strategy(
        SYMBOL,
        direction,
        modules.iter().map(|m| m.config.clone()).collect(),
    )
}

fn run_with(
    series: Series,
    direction: Direction,
    modules: Vec<(Box<dyn StrategyModule>, &str)>,
    sink: &RecordingSink,
) -> Result<BacktestOutcome, ModtraderError> {
    let data = MockDataPort::new().with_series(SYMBOL, series);
    let modules = configure(modules);
    let request = request_for(direction, &modules);
    Backtest::new(&data, sink, EngineSettings::default()).run(&request, &modules, end())
}

/// 100 flat candles at 100 with a spike to 103 at row 50 and a dip to 97 at
/// `dip`.
fn spike_and_dip(dip: usize) -> Series {
    let mut bars = flat_bars(100, 100.0);
    bars[50].high = 103.0;
    bars[dip].low = 97.0;
    quarter_hours(bars)
}

fn at(row: usize) -> DateTime<Utc> {
    start_time() + Duration::minutes(15 * row as i64)
}

#[test]
fn dip_after_entry_stops_out_before_spike() {
    let sink = RecordingSink::new();
    let outcome = run_with(
        spike_and_dip(30),
        Direction::Long,
        vec![(Box::new(SignalAt::new(&[10])), "entry")],
        &sink,
    )
    .unwrap();

    assert_eq!(outcome.trades.len(), 1);
    let t = &outcome.trades[0];
    assert_eq!(t.entry_time, at(10));
    assert_eq!(t.exit_time, at(30));
    assert_eq!(t.result, TradeResult::Loss);
    assert_relative_eq!(t.entry_price, 100.01, epsilon = 1e-9);
    assert_relative_eq!(t.stop_loss, 99.0);
    assert_relative_eq!(t.take_profit, 101.5);
    assert_relative_eq!(t.exit_price, 99.0);
    assert_relative_eq!(t.r_multiple, -1.01, epsilon = 1e-9);
}

#[test]
fn spike_takes_profit_when_the_dip_precedes_entry() {
    for module in [SignalAt::new(&[10]), SignalAt::vectorized(&[10])] {
        let sink = RecordingSink::new();
        let outcome = run_with(
            spike_and_dip(5),
            Direction::Long,
            vec![(Box::new(module), "entry")],
            &sink,
        )
        .unwrap();

        assert_eq!(outcome.rows, 100);
        assert_eq!(outcome.trades.len(), 1);
        let t = &outcome.trades[0];
        assert_eq!(t.symbol, SYMBOL);
        assert_eq!(t.direction, Direction::Long);
        assert_eq!(t.entry_time, at(10));
        assert_eq!(t.exit_time, at(50));
        assert_eq!(t.result, TradeResult::Win);
        assert_relative_eq!(t.entry_price, 100.01, epsilon = 1e-9);
        assert_relative_eq!(t.exit_price, 101.5);
        assert_relative_eq!(t.pnl, 1.49, epsilon = 1e-9);
        assert_relative_eq!(t.r_multiple, 1.49, epsilon = 1e-9);
        assert_eq!(t.candles_held, 40);

        assert_eq!(sink.count(|e| matches!(e, Event::PositionOpened { .. })), 1);
        assert_eq!(sink.count(|e| matches!(e, Event::PositionClosed { .. })), 1);
        assert_eq!(
            sink.count(|e| matches!(e, Event::Completed { trades: 1, signals: 1, rows: 100 })),
            1
        );
    }
}

#[test]
fn short_entry_takes_profit_on_a_drop() {
    let mut bars = flat_bars(60, 200.0);
    bars[20].low = 196.0;
    let sink = RecordingSink::new();
    let outcome = run_with(
        quarter_hours(bars),
        Direction::Short,
        vec![(Box::new(SignalAt::new(&[4])), "entry")],
        &sink,
    )
    .unwrap();

    let t = &outcome.trades[0];
    assert_eq!(t.result, TradeResult::Win);
    assert_relative_eq!(t.entry_price, 199.98, epsilon = 1e-9);
    assert_relative_eq!(t.take_profit, 197.0);
    assert_relative_eq!(t.stop_loss, 202.0);
    assert!(t.r_multiple > 0.0);
}

#[test]
fn empty_provider_is_data_unavailable() {
    let sink = RecordingSink::new();
    let err = run_with(
        Series::new(),
        Direction::Long,
        vec![(Box::new(SignalAt::new(&[1])), "entry")],
        &sink,
    )
    .unwrap_err();

    match err {
        ModtraderError::DataUnavailable { symbol, timeframe } => {
            assert_eq!(symbol, SYMBOL);
            assert_eq!(timeframe, "15m");
        }
        other => panic!("expected DataUnavailable, got {other:?}"),
    }
    assert_eq!(sink.count(|e| matches!(e, Event::Completed { .. })), 0);
    assert_eq!(sink.count(|e| matches!(e, Event::PositionOpened { .. })), 0);
}

#[test]
fn provider_errors_propagate() {
    let data = MockDataPort::new().with_error(SYMBOL, "connection refused");
    let modules = configure(vec![(Box::new(SignalAt::new(&[1])), "entry")]);
    let request = request_for(Direction::Long, &modules);
    let sink = RecordingSink::new();
    let err = Backtest::new(&data, &sink, EngineSettings::default())
        .run(&request, &modules, end())
        .unwrap_err();
    assert!(matches!(err, ModtraderError::DataSource { .. }));
}

#[test]
fn twelve_usable_rows_is_insufficient_data() {
    let mut bars = flat_bars(40, 100.0);
    for bar in bars.iter_mut().take(28) {
        bar.close = f64::NAN;
    }
    let sink = RecordingSink::new();
    let err = run_with(
        quarter_hours(bars),
        Direction::Long,
        vec![(Box::new(SignalAt::new(&[35])), "entry")],
        &sink,
    )
    .unwrap_err();

    assert!(matches!(
        err,
        ModtraderError::InsufficientData {
            rows: 12,
            minimum: 30
        }
    ));
    let msg = err.to_string();
    assert!(msg.contains("12"));
    assert!(msg.contains("30"));
    assert!(msg.contains("longer backtest period"));
    assert_eq!(
        sink.count(|e| matches!(
            e,
            Event::Cleaned {
                rows_before: 40,
                rows_after: 12,
                missing_prices: 28,
                ..
            }
        )),
        1
    );
}

#[test]
fn min_rows_is_configurable() {
    let data = MockDataPort::new().with_series(SYMBOL, quarter_hours(flat_bars(12, 100.0)));
    let modules = configure(vec![(Box::new(SignalAt::new(&[2])), "entry")]);
    let request = request_for(Direction::Long, &modules);
    let sink = RecordingSink::new();
    let settings = EngineSettings {
        min_rows: 10,
        ..EngineSettings::default()
    };
    let outcome = Backtest::new(&data, &sink, settings)
        .run(&request, &modules, end())
        .unwrap();
    assert_eq!(outcome.trades[0].result, TradeResult::Timeout);
}

#[test]
fn raw_rows_are_standardized_before_modules_run() {
    let mut rows: Vec<(RowKey, Bar)> = (0..60)
        .rev()
        .map(|i| {
            let key = at(i).format("%Y-%m-%d %H:%M:%S").to_string();
            (RowKey::Raw(key), Bar::flat(100.0))
        })
        .collect();
    // exact duplicate, an unreadable key, and a later rewrite of row 40
    rows.push(rows[7].clone());
    rows.push((RowKey::Raw("garbage".into()), Bar::flat(500.0)));
    let rewrite = Bar {
        high: 103.0,
        ..Bar::flat(100.0)
    };
    rows.push((RowKey::Raw(at(40).to_rfc3339()), rewrite));

    let sink = RecordingSink::new();
    let outcome = run_with(
        Series::from_bars(rows),
        Direction::Long,
        vec![(Box::new(SignalAt::new(&[10])), "entry")],
        &sink,
    )
    .unwrap();

    assert_eq!(outcome.rows, 60);
    let t = &outcome.trades[0];
    assert_eq!(t.entry_time, at(10));
    assert_eq!(t.exit_time, at(40));
    assert_eq!(t.result, TradeResult::Win);

    let report = sink
        .events
        .borrow()
        .iter()
        .find_map(|e| match e {
            Event::Standardized(r) => Some(r.clone()),
            _ => None,
        })
        .unwrap();
    assert_eq!(report.input_rows, 63);
    assert_eq!(report.exact_duplicates, 1);
    assert_eq!(report.uncoercible_keys, 1);
    assert_eq!(report.duplicate_timestamps, 1);
    assert_eq!(report.output_rows, 60);
}

#[test]
fn misaligned_module_is_retried_once() {
    let flaky = Flaky::new(1);
    let calls = flaky.calls.clone();
    let sink = RecordingSink::new();
    let outcome = run_with(
        quarter_hours(flat_bars(40, 100.0)),
        Direction::Long,
        vec![(Box::new(flaky), "flaky")],
        &sink,
    )
    .unwrap();

    assert_eq!(calls.get(), 2);
    assert_eq!(sink.count(|e| matches!(e, Event::ModuleRetry { .. })), 1);
    assert_eq!(outcome.trades.len(), 1);
}

#[test]
fn second_misalignment_is_fatal() {
    let flaky = Flaky::new(5);
    let calls = flaky.calls.clone();
    let sink = RecordingSink::new();
    let err = run_with(
        quarter_hours(flat_bars(40, 100.0)),
        Direction::Long,
        vec![(Box::new(flaky), "flaky")],
        &sink,
    )
    .unwrap_err();

    assert_eq!(calls.get(), 2);
    match err {
        ModtraderError::ModuleComputation {
            module, attempts, ..
        } => {
            assert_eq!(module, "flaky");
            assert_eq!(attempts, 2);
        }
        other => panic!("expected ModuleComputation, got {other:?}"),
    }
}

#[test]
fn wrong_length_output_counts_as_misaligned() {
    let sink = RecordingSink::new();
    let err = run_with(
        quarter_hours(flat_bars(40, 100.0)),
        Direction::Long,
        vec![(Box::new(ShortColumn), "short")],
        &sink,
    )
    .unwrap_err();
    assert!(matches!(
        err,
        ModtraderError::ModuleComputation { attempts: 2, .. }
    ));
    assert_eq!(sink.count(|e| matches!(e, Event::ModuleRetry { .. })), 1);
}

#[test]
fn colliding_columns_are_renamed_and_both_modules_gate_entries() {
    let sink = RecordingSink::new();
    let outcome = run_with(
        quarter_hours(flat_bars(50, 100.0)),
        Direction::Long,
        vec![
            (Box::new(SignalAt::new(&[10, 20])), "first"),
            (Box::new(SignalAt::vectorized(&[20, 30])), "second"),
        ],
        &sink,
    )
    .unwrap();

    assert_eq!(
        sink.count(|e| matches!(
            e,
            Event::ColumnRenamed { label, from, to }
                if label == "second" && from == "entry" && to == "entry_1"
        )),
        1
    );
    assert_eq!(outcome.signals.modules[0].positives, 2);
    assert_eq!(outcome.signals.modules[1].positives, 2);
    assert_eq!(outcome.signals.positives(), 1);
    assert_eq!(outcome.trades.len(), 1);
    assert_eq!(outcome.trades[0].entry_time, at(20));
    assert_eq!(outcome.trades[0].result, TradeResult::Timeout);
    assert_eq!(outcome.trades[0].exit_time, at(49));
}

#[test]
fn rows_without_any_module_value_are_dropped() {
    let mut flaky = Flaky::new(0);
    flaky.warmup = 5;
    let sink = RecordingSink::new();
    let outcome = run_with(
        quarter_hours(flat_bars(60, 100.0)),
        Direction::Long,
        vec![(Box::new(flaky), "flaky")],
        &sink,
    )
    .unwrap();

    assert_eq!(outcome.rows, 55);
    assert_eq!(outcome.trades[0].entry_time, at(5));
    assert_eq!(
        sink.count(|e| matches!(e, Event::Cleaned { undefined_columns: 5, .. })),
        1
    );
}

#[test]
fn session_filter_delays_entry_until_the_session_opens() {
    // 07:00 start: rows 0-3 are Tokyo, London opens at row 4
    let start = start_time() + Duration::hours(7);
    let data = MockDataPort::new().with_series(SYMBOL, quarter_hours_from(start, flat_bars(40, 100.0)));
    let modules = configure(vec![(Box::new(SignalAt::new(&[1, 2, 6])), "entry")]);
    let mut request = request_for(Direction::Long, &modules);
    request.session = Some(Session::London);

    let sink = RecordingSink::new();
    let outcome = Backtest::new(&data, &sink, EngineSettings::default())
        .run(&request, &modules, end())
        .unwrap();
    assert_eq!(outcome.trades.len(), 1);
    assert_eq!(outcome.trades[0].entry_time, start + Duration::minutes(90));
}

#[test]
fn session_filter_needs_real_timestamps() {
    let junk: Vec<(RowKey, Bar)> = (0..40)
        .map(|i| (RowKey::Raw(format!("row-{i}")), Bar::flat(100.0)))
        .collect();
    let modules = configure(vec![(Box::new(SignalAt::new(&[3])), "entry")]);
    let sink = RecordingSink::new();

    let data = MockDataPort::new().with_series(SYMBOL, Series::from_bars(junk.clone()));
    let mut request = request_for(Direction::Long, &modules);
    request.session = Some(Session::Tokyo);
    let err = Backtest::new(&data, &sink, EngineSettings::default())
        .run(&request, &modules, end())
        .unwrap_err();
    assert!(matches!(err, ModtraderError::StandardizationFailure { .. }));

    // without a session the synthetic grid keeps the run alive
    request.session = None;
    let outcome = Backtest::new(&data, &sink, EngineSettings::default())
        .run(&request, &modules, end())
        .unwrap();
    assert_eq!(outcome.rows, 40);
    assert_eq!(outcome.trades.len(), 1);
}

#[test]
fn hour_based_module_needs_real_timestamps() {
    let kill_zones = || {
        let module = Catalog.create("kill_zones").unwrap();
        let config = module.describe_config().defaults("kill_zones");
        vec![ConfiguredModule::new(module, config)]
    };
    let junk: Vec<(RowKey, Bar)> = (0..40)
        .map(|i| (RowKey::Raw(format!("row-{i}")), Bar::flat(100.0)))
        .collect();
    let sink = RecordingSink::new();

    let modules = kill_zones();
    let request = request_for(Direction::Long, &modules);
    let data = MockDataPort::new().with_series(SYMBOL, Series::from_bars(junk));
    let err = Backtest::new(&data, &sink, EngineSettings::default())
        .run(&request, &modules, end())
        .unwrap_err();
    match err {
        ModtraderError::StandardizationFailure { reason } => assert!(reason.contains("kill_zones")),
        other => panic!("expected StandardizationFailure, got {other:?}"),
    }

    let data = MockDataPort::new().with_series(SYMBOL, quarter_hours(flat_bars(40, 100.0)));
    assert!(
        Backtest::new(&data, &sink, EngineSettings::default())
            .run(&request, &modules, end())
            .is_ok()
    );
}

#[test]
fn zero_close_row_is_dropped_instead_of_traded() {
    let mut bars = flat_bars(60, 100.0);
    bars[10] = Bar::flat(0.0);
    let sink = RecordingSink::new();
    let outcome = run_with(
        quarter_hours(bars),
        Direction::Long,
        vec![(Box::new(SignalAt::new(&[10, 20])), "entry")],
        &sink,
    )
    .unwrap();

    assert_eq!(outcome.rows, 59);
    assert_eq!(outcome.trades.len(), 1);
    assert_eq!(outcome.trades[0].entry_time, at(20));
    assert_eq!(outcome.trades[0].result, TradeResult::Timeout);
    assert_eq!(
        sink.count(|e| matches!(e, Event::Cleaned { missing_prices: 1, .. })),
        1
    );
}

#[test]
fn negative_prices_leave_no_usable_rows() {
    let sink = RecordingSink::new();
    let err = run_with(
        quarter_hours(flat_bars(60, -10.0)),
        Direction::Long,
        vec![(Box::new(SignalAt::new(&[10])), "entry")],
        &sink,
    )
    .unwrap_err();
    assert!(matches!(
        err,
        ModtraderError::InsufficientData {
            rows: 0,
            minimum: 30
        }
    ));
    assert_eq!(sink.count(|e| matches!(e, Event::PositionOpened { .. })), 0);
}

#[test]
fn invalid_request_is_rejected_before_fetching() {
    let data = MockDataPort::new().with_series(SYMBOL, quarter_hours(flat_bars(40, 100.0)));
    let modules = configure(vec![(Box::new(SignalAt::new(&[3])), "entry")]);
    let sink = RecordingSink::new();
    let backtest = Backtest::new(&data, &sink, EngineSettings::default());

    let mut request = request_for(Direction::Long, &modules);
    request.sl_r = 0.0;
    assert!(matches!(
        backtest.run(&request, &modules, end()),
        Err(ModtraderError::ConfigValidation { .. })
    ));

    let request = request_for(Direction::Long, &modules);
    assert!(matches!(
        backtest.run(&request, &[], end()),
        Err(ModtraderError::ConfigValidation { .. })
    ));
    assert_eq!(data.fetches.get(), 0);
}

#[test]
fn repeated_signals_produce_non_overlapping_trades() {
    let mut bars = flat_bars(80, 100.0);
    for row in [15, 35, 55] {
        bars[row].high = 102.0;
    }
    let sink = RecordingSink::new();
    let every_row: Vec<usize> = (0..80).collect();
    let outcome = run_with(
        quarter_hours(bars),
        Direction::Long,
        vec![(Box::new(SignalAt::vectorized(&every_row)), "entry")],
        &sink,
    )
    .unwrap();

    assert_eq!(validate_trades(&outcome.trades), Ok(()));
    let results: Vec<TradeResult> = outcome.trades.iter().map(|t| t.result).collect();
    assert_eq!(
        results,
        vec![
            TradeResult::Win,
            TradeResult::Win,
            TradeResult::Win,
            TradeResult::Timeout
        ]
    );
    assert_eq!(outcome.trades[1].entry_time, at(16));
}
