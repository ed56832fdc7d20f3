//! CLI definition and dispatch.

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use crate::adapters::csv_adapter::CsvAdapter;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::adapters::log_event_adapter::LogEventSink;
use crate::adapters::trade_csv::{write_trades, write_trades_file};
use crate::domain::backtest::Backtest;
use crate::domain::config_validation::{load_engine_settings, load_strategy, validate_strategy};
use crate::domain::error::ModtraderError;
use crate::domain::modules::{Catalog, ModuleRegistry};
use crate::domain::series::RowKey;
use crate::domain::standardize::coerce_key;
use crate::domain::strategy::StrategyConfig;
use crate::domain::summary::TradeSummary;
use crate::ports::config_port::ConfigPort;
use crate::ports::data_port::DataPort;

const DEFAULT_DATA_DIR: &str = "data";

#[derive(Parser, Debug)]
#[command(name = "modtrader", about = "Modular strategy backtester")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a backtest
    Backtest {
        #[arg(short, long)]
        config: PathBuf,
        /// Write the trade list here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// End of the lookback window (RFC 3339 or YYYY-MM-DD); default now
        #[arg(long)]
        end: Option<String>,
        /// Directory holding {SYMBOL}_{timeframe}.csv files
        #[arg(long)]
        data_dir: Option<PathBuf>,
    },
    /// Validate a run configuration without touching data
    Validate {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// List the available strategy modules and their parameters
    Modules,
    /// List symbols with data files
    ListSymbols {
        #[arg(short, long)]
        config: Option<PathBuf>,
        #[arg(long)]
        data_dir: Option<PathBuf>,
    },
}

pub fn run(cli: Cli) -> ExitCode {
    let result = match cli.command {
        Command::Backtest {
            config,
            output,
            end,
            data_dir,
        } => run_backtest(&config, output.as_deref(), end.as_deref(), data_dir),
        Command::Validate { config } => run_validate(&config),
        Command::Modules => {
            print_modules(&Catalog);
            Ok(())
        }
        Command::ListSymbols { config, data_dir } => run_list_symbols(config.as_deref(), data_dir),
    };
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            (&e).into()
        }
    }
}

pub fn load_config(path: &Path) -> Result<FileConfigAdapter, ModtraderError> {
    eprintln!("Loading config from {}", path.display());
    FileConfigAdapter::from_file(path)
}

/// `--data-dir`, then `[engine] data_dir`, then `./data`.
pub fn resolve_data_dir(flag: Option<PathBuf>, config: Option<&dyn ConfigPort>) -> PathBuf {
    flag.or_else(|| {
        config
            .and_then(|c| c.get_string("engine", "data_dir"))
            .filter(|s| !s.trim().is_empty())
            .map(PathBuf::from)
    })
    .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR))
}

pub fn parse_end(raw: Option<&str>) -> Result<DateTime<Utc>, ModtraderError> {
    match raw {
        None => Ok(Utc::now()),
        Some(s) => coerce_key(&RowKey::Raw(s.to_string())).ok_or_else(|| {
            ModtraderError::config("--end", format!("cannot read {:?} as a timestamp", s))
        }),
    }
}

fn run_backtest(
    config_path: &Path,
    output: Option<&Path>,
    end: Option<&str>,
    data_dir: Option<PathBuf>,
) -> Result<(), ModtraderError> {
    let adapter = load_config(config_path)?;
    let strategy = load_strategy(&adapter, &Catalog)?;
    let settings = load_engine_settings(&adapter)?;
    let modules = Catalog.configure(&strategy.modules)?;
    let end = parse_end(end)?;
    let data = CsvAdapter::new(resolve_data_dir(data_dir, Some(&adapter)));

    describe_strategy(&strategy);
    let events = LogEventSink;
    let outcome = Backtest::new(&data, &events, settings).run(&strategy, &modules, end)?;

    print_summary(&TradeSummary::compute(&outcome.trades));
    match output {
        Some(path) => {
            write_trades_file(path, &outcome.trades)?;
            eprintln!("\nTrades written to: {}", path.display());
        }
        None => write_trades(io::stdout().lock(), &outcome.trades)?,
    }
    Ok(())
}

fn run_validate(config_path: &Path) -> Result<(), ModtraderError> {
    let adapter = load_config(config_path)?;
    let strategy = load_strategy(&adapter, &Catalog)?;
    let settings = load_engine_settings(&adapter)?;
    validate_strategy(&strategy, &settings)?;
    Catalog.configure(&strategy.modules)?;

    describe_strategy(&strategy);
    eprintln!(
        "\nEngine: min_rows {}, slippage {}, tie-break {:?}",
        settings.min_rows, settings.slippage, settings.tie_break
    );
    eprintln!("\nConfiguration is valid");
    Ok(())
}

fn run_list_symbols(config_path: Option<&Path>, data_dir: Option<PathBuf>) -> Result<(), ModtraderError> {
    let adapter = config_path.map(load_config).transpose()?;
    let dir = resolve_data_dir(data_dir, adapter.as_ref().map(|a| a as &dyn ConfigPort));
    let symbols = CsvAdapter::new(dir.clone()).list_symbols()?;
    if symbols.is_empty() {
        eprintln!("No symbols found in {}", dir.display());
    } else {
        for symbol in &symbols {
            println!("{}", symbol);
        }
        eprintln!("{} symbols found", symbols.len());
    }
    Ok(())
}

fn describe_strategy(strategy: &StrategyConfig) {
    eprintln!(
        "Strategy: {} {} {} over {}, tp {}R / sl {}R, risk {}%",
        strategy.direction,
        strategy.symbol,
        strategy.timeframe,
        strategy.period,
        strategy.tp_r,
        strategy.sl_r,
        strategy.risk_pct
    );
    if let Some(session) = strategy.session {
        eprintln!("  session filter: {}", session);
    }
    for module in &strategy.modules {
        let params: Vec<String> = module
            .values
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect();
        eprintln!("  module {} ({}): {}", module.label, module.module_id, params.join(" "));
    }
}

fn print_summary(summary: &TradeSummary) {
    eprintln!("\n=== Results ===");
    eprintln!("Total Trades:     {}", summary.trades);
    eprintln!(
        "Wins/Losses/TO:   {}/{}/{}",
        summary.wins, summary.losses, summary.timeouts
    );
    eprintln!("Win Rate:         {:.1}%", summary.win_rate * 100.0);
    eprintln!("Total R:          {:+.2}", summary.total_r);
    eprintln!("Average R:        {:+.2}", summary.avg_r);
    eprintln!("Profit Factor:    {:.2}", summary.profit_factor);
    eprintln!("Max Drawdown:     {:.2}R", summary.max_drawdown_r);
    eprintln!("Max Loss Streak:  {}", summary.max_consecutive_losses);
}

fn print_modules(registry: &dyn ModuleRegistry) {
    for id in registry.ids() {
        let Some(module) = registry.create(id) else {
            continue;
        };
        println!(
            "{} - {} [{}, {}]",
            module.id(),
            module.name(),
            module.category(),
            module.signal_path()
        );
        for param in module.describe_config().params {
            println!(
                "    {:<20} {:<40} default {:<12} {}",
                param.name,
                param.kind.to_string(),
                param.default.to_string(),
                param.help
            );
        }
    }
}
