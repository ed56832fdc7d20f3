//! Run configuration: load the `[strategy]`, per-module and `[engine]`
//! sections through a `ConfigPort` and validate them before any data is
//! touched.

use std::collections::HashSet;
use std::str::FromStr;

use crate::domain::backtest::{DEFAULT_MIN_ROWS, DEFAULT_SLIPPAGE, EngineSettings};
use crate::domain::error::ModtraderError;
use crate::domain::module::ModuleConfig;
use crate::domain::modules::ModuleRegistry;
use crate::domain::session::Session;
use crate::domain::simulator::TieBreak;
use crate::domain::strategy::{DEFAULT_RISK_PCT, StrategyConfig};
use crate::ports::config_port::ConfigPort;

const STRATEGY: &str = "strategy";
const ENGINE: &str = "engine";

/// Key inside a module section that selects the module kind.
const MODULE_KEY: &str = "module";

fn field(section: &str, key: &str) -> String {
    format!("{}.{}", section, key)
}

fn required(config: &dyn ConfigPort, section: &str, key: &str) -> Result<String, ModtraderError> {
    config
        .get_string(section, key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ModtraderError::config(field(section, key), "required"))
}

fn parse<T>(config: &dyn ConfigPort, section: &str, key: &str) -> Result<T, ModtraderError>
where
    T: FromStr,
    T::Err: ToString,
{
    required(config, section, key)?
        .parse()
        .map_err(|e: T::Err| ModtraderError::config(field(section, key), e.to_string()))
}

fn parse_or<T>(config: &dyn ConfigPort, section: &str, key: &str, default: T) -> Result<T, ModtraderError>
where
    T: FromStr,
    T::Err: ToString,
{
    match config.get_string(section, key) {
        Some(v) if !v.trim().is_empty() => parse(config, section, key),
        _ => Ok(default),
    }
}

/// Read the `[strategy]` section and every module section it lists.
pub fn load_strategy(
    config: &dyn ConfigPort,
    registry: &dyn ModuleRegistry,
) -> Result<StrategyConfig, ModtraderError> {
    let session = match config.get_string(STRATEGY, "session") {
        Some(v) if !v.trim().is_empty() && !v.trim().eq_ignore_ascii_case("none") => Some(
            v.parse::<Session>()
                .map_err(|e| ModtraderError::config(field(STRATEGY, "session"), e))?,
        ),
        _ => None,
    };

    Ok(StrategyConfig {
        symbol: required(config, STRATEGY, "symbol")?.to_uppercase(),
        timeframe: parse(config, STRATEGY, "timeframe")?,
        direction: parse(config, STRATEGY, "direction")?,
        period: parse(config, STRATEGY, "period")?,
        session,
        tp_r: parse(config, STRATEGY, "tp_r")?,
        sl_r: parse(config, STRATEGY, "sl_r")?,
        risk_pct: parse_or(config, STRATEGY, "risk_pct", DEFAULT_RISK_PCT)?,
        modules: load_modules(config, registry)?,
    })
}

fn load_modules(
    config: &dyn ConfigPort,
    registry: &dyn ModuleRegistry,
) -> Result<Vec<ModuleConfig>, ModtraderError> {
    let list = required(config, STRATEGY, "modules")?;
    let mut seen = HashSet::new();
    let mut modules = Vec::new();

    for label in list.split(',').map(|s| s.trim().to_lowercase()) {
        if label.is_empty() {
            continue;
        }
        if !seen.insert(label.clone()) {
            return Err(ModtraderError::config(
                field(STRATEGY, "modules"),
                format!("module entry {} listed twice", label),
            ));
        }
        let mut raw = config.section_entries(&label);
        let module_id = match raw.iter().position(|(k, _)| k == MODULE_KEY) {
            Some(i) => raw.remove(i).1.trim().to_lowercase(),
            None => label.clone(),
        };
        let module = registry.create(&module_id).ok_or_else(|| {
            ModtraderError::config(
                format!("module.{}", label),
                format!(
                    "unknown module {:?}; available: {}",
                    module_id,
                    registry.ids().join(", ")
                ),
            )
        })?;
        modules.push(module.describe_config().resolve(module.id(), &label, &raw)?);
    }

    if modules.is_empty() {
        return Err(ModtraderError::config(
            field(STRATEGY, "modules"),
            "at least one module is required",
        ));
    }
    Ok(modules)
}

/// Read the optional `[engine]` section.
pub fn load_engine_settings(config: &dyn ConfigPort) -> Result<EngineSettings, ModtraderError> {
    let min_rows: usize = parse_or(config, ENGINE, "min_rows", DEFAULT_MIN_ROWS)?;
    if min_rows < 2 {
        return Err(ModtraderError::config(
            field(ENGINE, "min_rows"),
            "must be at least 2",
        ));
    }
    let slippage: f64 = parse_or(config, ENGINE, "slippage", DEFAULT_SLIPPAGE)?;
    if !(0.0..1.0).contains(&slippage) {
        return Err(ModtraderError::config(
            field(ENGINE, "slippage"),
            "must be a fraction in [0, 1)",
        ));
    }
    let tie_break: TieBreak = parse_or(config, ENGINE, "tie_break", TieBreak::default())?;
    Ok(EngineSettings {
        min_rows,
        slippage,
        tie_break,
    })
}

pub fn validate_strategy(strategy: &StrategyConfig, engine: &EngineSettings) -> Result<(), ModtraderError> {
    validate_symbol(strategy)?;
    validate_ratios(strategy)?;
    validate_risk_pct(strategy)?;
    validate_modules(strategy)?;
    validate_target_beats_slippage(strategy, engine)?;
    Ok(())
}

fn validate_symbol(strategy: &StrategyConfig) -> Result<(), ModtraderError> {
    if strategy.symbol.trim().is_empty() {
        return Err(ModtraderError::config(field(STRATEGY, "symbol"), "required"));
    }
    Ok(())
}

fn validate_ratios(strategy: &StrategyConfig) -> Result<(), ModtraderError> {
    for (key, value) in [("tp_r", strategy.tp_r), ("sl_r", strategy.sl_r)] {
        if !value.is_finite() || value <= 0.0 {
            return Err(ModtraderError::config(
                field(STRATEGY, key),
                format!("must be strictly positive, got {}", value),
            ));
        }
    }
    Ok(())
}

fn validate_risk_pct(strategy: &StrategyConfig) -> Result<(), ModtraderError> {
    if !(strategy.risk_pct > 0.0 && strategy.risk_pct <= 100.0) {
        return Err(ModtraderError::config(
            field(STRATEGY, "risk_pct"),
            format!("must be in (0, 100], got {}", strategy.risk_pct),
        ));
    }
    Ok(())
}

fn validate_modules(strategy: &StrategyConfig) -> Result<(), ModtraderError> {
    if strategy.modules.is_empty() {
        return Err(ModtraderError::config(
            field(STRATEGY, "modules"),
            "at least one module is required",
        ));
    }
    let mut labels = HashSet::new();
    for module in &strategy.modules {
        if !labels.insert(module.label.as_str()) {
            return Err(ModtraderError::config(
                field(STRATEGY, "modules"),
                format!("module entry {} listed twice", module.label),
            ));
        }
    }
    Ok(())
}

/// A take-profit closer than the entry slippage would book a WIN at a loss.
fn validate_target_beats_slippage(
    strategy: &StrategyConfig,
    engine: &EngineSettings,
) -> Result<(), ModtraderError> {
    let target = strategy.risk_pct / 100.0 * strategy.tp_r;
    if target <= engine.slippage {
        return Err(ModtraderError::config(
            field(STRATEGY, "tp_r"),
            format!(
                "take-profit distance {:.6} of price does not exceed slippage {:.6}",
                target, engine.slippage
            ),
        ));
    }
    Ok(())
}
