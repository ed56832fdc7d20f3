//! Strategy module contract.
//!
//! A module declares its parameters (`describe_config`), derives columns from
//! the series (`calculate`) and answers a row-local entry predicate
//! (`check_entry_condition`). Modules that can express their predicate as a
//! whole-column comparison also implement `entry_flags` and report
//! `SignalPath::Vectorized`; both paths must agree row for row.

use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

use crate::domain::error::{ModtraderError, ModuleError};
use crate::domain::series::{Bar, Column, Series};
use crate::domain::strategy::Direction;

#[derive(Debug, Clone, PartialEq)]
pub enum ParamKind {
    Int { min: i64, max: i64 },
    Float { min: f64, max: f64 },
    Bool,
    Choice(&'static [&'static str]),
    MultiChoice(&'static [&'static str]),
}

impl fmt::Display for ParamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamKind::Int { min, max } => write!(f, "int [{}, {}]", min, max),
            ParamKind::Float { min, max } => write!(f, "float [{}, {}]", min, max),
            ParamKind::Bool => f.write_str("bool"),
            ParamKind::Choice(options) => write!(f, "one of {}", options.join("|")),
            ParamKind::MultiChoice(options) => write!(f, "any of {}", options.join(",")),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Int(i64),
    Float(f64),
    Bool(bool),
    Choice(String),
    Multi(Vec<String>),
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Int(v) => write!(f, "{}", v),
            ParamValue::Float(v) => write!(f, "{}", v),
            ParamValue::Bool(v) => write!(f, "{}", v),
            ParamValue::Choice(v) => f.write_str(v),
            ParamValue::Multi(v) => f.write_str(&v.join(",")),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParamSpec {
    pub name: &'static str,
    pub kind: ParamKind,
    pub default: ParamValue,
    pub help: &'static str,
}

impl ParamSpec {
    pub fn int(name: &'static str, default: i64, min: i64, max: i64, help: &'static str) -> Self {
        ParamSpec {
            name,
            kind: ParamKind::Int { min, max },
            default: ParamValue::Int(default),
            help,
        }
    }

    pub fn float(name: &'static str, default: f64, min: f64, max: f64, help: &'static str) -> Self {
        ParamSpec {
            name,
            kind: ParamKind::Float { min, max },
            default: ParamValue::Float(default),
            help,
        }
    }

    pub fn flag(name: &'static str, default: bool, help: &'static str) -> Self {
        ParamSpec {
            name,
            kind: ParamKind::Bool,
            default: ParamValue::Bool(default),
            help,
        }
    }

    pub fn choice(
        name: &'static str,
        default: &str,
        options: &'static [&'static str],
        help: &'static str,
    ) -> Self {
        ParamSpec {
            name,
            kind: ParamKind::Choice(options),
            default: ParamValue::Choice(default.to_string()),
            help,
        }
    }

    pub fn multi(
        name: &'static str,
        default: &[&str],
        options: &'static [&'static str],
        help: &'static str,
    ) -> Self {
        ParamSpec {
            name,
            kind: ParamKind::MultiChoice(options),
            default: ParamValue::Multi(default.iter().map(|s| s.to_string()).collect()),
            help,
        }
    }

    /// Parse a textual value according to the declared kind.
    pub fn parse(&self, raw: &str) -> Result<ParamValue, String> {
        let raw = raw.trim();
        let value = match &self.kind {
            ParamKind::Int { .. } => raw
                .parse::<i64>()
                .map(ParamValue::Int)
                .map_err(|_| format!("expected an integer, got {:?}", raw))?,
            ParamKind::Float { .. } => raw
                .parse::<f64>()
                .map(ParamValue::Float)
                .map_err(|_| format!("expected a number, got {:?}", raw))?,
            ParamKind::Bool => match raw.to_lowercase().as_str() {
                "true" | "yes" | "1" => ParamValue::Bool(true),
                "false" | "no" | "0" => ParamValue::Bool(false),
                _ => return Err(format!("expected true or false, got {:?}", raw)),
            },
            ParamKind::Choice(_) => ParamValue::Choice(raw.to_lowercase()),
            ParamKind::MultiChoice(_) => ParamValue::Multi(
                raw.split(',')
                    .map(|s| s.trim().to_lowercase())
                    .filter(|s| !s.is_empty())
                    .collect(),
            ),
        };
        self.check(&value)?;
        Ok(value)
    }

    /// Check type and bounds of a value.
    pub fn check(&self, value: &ParamValue) -> Result<(), String> {
        match (&self.kind, value) {
            (ParamKind::Int { min, max }, ParamValue::Int(v)) => {
                if v < min || v > max {
                    return Err(format!("{} is outside [{}, {}]", v, min, max));
                }
            }
            (ParamKind::Float { min, max }, ParamValue::Float(v)) => {
                if !v.is_finite() || v < min || v > max {
                    return Err(format!("{} is outside [{}, {}]", v, min, max));
                }
            }
            (ParamKind::Bool, ParamValue::Bool(_)) => {}
            (ParamKind::Choice(options), ParamValue::Choice(v)) => {
                if !options.contains(&v.as_str()) {
                    return Err(format!("{:?} is not one of {}", v, options.join(", ")));
                }
            }
            (ParamKind::MultiChoice(options), ParamValue::Multi(values)) => {
                if let Some(bad) = values.iter().find(|v| !options.contains(&v.as_str())) {
                    return Err(format!("{:?} is not one of {}", bad, options.join(", ")));
                }
            }
            (kind, value) => {
                return Err(format!("value {} does not match kind {:?}", value, kind));
            }
        }
        Ok(())
    }
}

/// Parameter schema of a module.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ConfigSchema {
    pub params: Vec<ParamSpec>,
}

impl ConfigSchema {
    pub fn new(params: Vec<ParamSpec>) -> Self {
        ConfigSchema { params }
    }

    pub fn param(&self, name: &str) -> Option<&ParamSpec> {
        self.params.iter().find(|p| p.name == name)
    }

    /// Configuration with every parameter at its default.
    pub fn defaults(&self, module_id: &str) -> ModuleConfig {
        ModuleConfig {
            module_id: module_id.to_string(),
            label: module_id.to_string(),
            values: self
                .params
                .iter()
                .map(|p| (p.name.to_string(), p.default.clone()))
                .collect(),
        }
    }

    /// Build a configuration from textual key/value pairs: declared
    /// parameters are parsed and bounds-checked, omitted ones take their
    /// default, empty values mean "use the default", unknown keys are
    /// rejected.
    pub fn resolve(
        &self,
        module_id: &str,
        label: &str,
        raw: &[(String, String)],
    ) -> Result<ModuleConfig, ModtraderError> {
        let mut config = self.defaults(module_id);
        config.label = label.to_string();
        for (key, value) in raw {
            let key = key.trim().to_lowercase();
            let spec = self.param(&key).ok_or_else(|| {
                ModtraderError::config(
                    format!("module.{}.{}", label, key),
                    format!("unknown parameter for module {}", module_id),
                )
            })?;
            if value.trim().is_empty() {
                continue;
            }
            let parsed = spec
                .parse(value)
                .map_err(|reason| ModtraderError::config(format!("module.{}.{}", label, key), reason))?;
            config.values.insert(key, parsed);
        }
        Ok(config)
    }

    /// Check that a configuration carries exactly the declared parameters
    /// with valid values.
    pub fn validate(&self, config: &ModuleConfig) -> Result<(), ModtraderError> {
        for spec in &self.params {
            let field = format!("module.{}.{}", config.label, spec.name);
            let value = config
                .values
                .get(spec.name)
                .ok_or_else(|| ModtraderError::config(field.clone(), "parameter missing"))?;
            spec.check(value)
                .map_err(|reason| ModtraderError::config(field, reason))?;
        }
        if let Some(extra) = config.values.keys().find(|k| self.param(k).is_none()) {
            return Err(ModtraderError::config(
                format!("module.{}.{}", config.label, extra),
                format!("unknown parameter for module {}", config.module_id),
            ));
        }
        Ok(())
    }
}

/// Validated parameter values of one configured module.
#[derive(Debug, Clone, PartialEq)]
pub struct ModuleConfig {
    pub module_id: String,
    /// Entry name in the run configuration; distinguishes two entries of the
    /// same module kind.
    pub label: String,
    pub values: BTreeMap<String, ParamValue>,
}

impl ModuleConfig {
    pub fn with(mut self, name: &str, value: ParamValue) -> Self {
        self.values.insert(name.to_string(), value);
        self
    }

    fn value(&self, name: &str) -> Result<&ParamValue, ModuleError> {
        self.values.get(name).ok_or_else(|| ModuleError::MissingParam {
            name: name.to_string(),
        })
    }

    fn mismatch(name: &str, expected: &str) -> ModuleError {
        ModuleError::Computation {
            reason: format!("parameter {} is not {}", name, expected),
        }
    }

    pub fn get_int(&self, name: &str) -> Result<i64, ModuleError> {
        match self.value(name)? {
            ParamValue::Int(v) => Ok(*v),
            _ => Err(Self::mismatch(name, "an integer")),
        }
    }

    pub fn get_usize(&self, name: &str) -> Result<usize, ModuleError> {
        let v = self.get_int(name)?;
        usize::try_from(v).map_err(|_| Self::mismatch(name, "non-negative"))
    }

    pub fn get_float(&self, name: &str) -> Result<f64, ModuleError> {
        match self.value(name)? {
            ParamValue::Float(v) => Ok(*v),
            ParamValue::Int(v) => Ok(*v as f64),
            _ => Err(Self::mismatch(name, "a number")),
        }
    }

    pub fn get_bool(&self, name: &str) -> Result<bool, ModuleError> {
        match self.value(name)? {
            ParamValue::Bool(v) => Ok(*v),
            _ => Err(Self::mismatch(name, "a boolean")),
        }
    }

    pub fn get_choice(&self, name: &str) -> Result<&str, ModuleError> {
        match self.value(name)? {
            ParamValue::Choice(v) => Ok(v),
            _ => Err(Self::mismatch(name, "a choice")),
        }
    }

    pub fn get_list(&self, name: &str) -> Result<&[String], ModuleError> {
        match self.value(name)? {
            ParamValue::Multi(v) => Ok(v),
            _ => Err(Self::mismatch(name, "a list")),
        }
    }
}

/// Logical column name (as produced by `calculate`) to the name it was stored
/// under after collision handling.
pub type ColumnNames = HashMap<String, String>;

/// Read access to the series for one module, limited to rows `0..len()`.
///
/// Row-wise evaluation hands a module a view ending at the evaluated index,
/// so later rows cannot be observed.
#[derive(Debug, Clone, Copy)]
pub struct ModuleView<'a> {
    series: &'a Series,
    names: &'a ColumnNames,
    rows: usize,
}

impl<'a> ModuleView<'a> {
    pub fn new(series: &'a Series, names: &'a ColumnNames) -> Self {
        ModuleView {
            series,
            names,
            rows: series.len(),
        }
    }

    /// View of rows `0..=index`.
    pub fn upto(&self, index: usize) -> ModuleView<'a> {
        ModuleView {
            rows: (index + 1).min(self.rows),
            ..*self
        }
    }

    pub fn len(&self) -> usize {
        self.rows
    }

    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }

    pub fn bar(&self, row: usize) -> Option<Bar> {
        (row < self.rows).then(|| self.series.bar(row))
    }

    pub fn time_at(&self, row: usize) -> Option<DateTime<Utc>> {
        if row < self.rows {
            self.series.time_at(row)
        } else {
            None
        }
    }

    pub fn open(&self) -> &'a [f64] {
        &self.series.open()[..self.rows]
    }

    pub fn high(&self) -> &'a [f64] {
        &self.series.high()[..self.rows]
    }

    pub fn low(&self) -> &'a [f64] {
        &self.series.low()[..self.rows]
    }

    pub fn close(&self) -> &'a [f64] {
        &self.series.close()[..self.rows]
    }

    fn column(&self, name: &str) -> Result<&'a Column, ModuleError> {
        let actual = self.names.get(name).map(String::as_str).unwrap_or(name);
        self.series
            .column(actual)
            .ok_or_else(|| ModuleError::MissingColumn {
                name: actual.to_string(),
            })
    }

    pub fn numeric(&self, name: &str) -> Result<&'a [f64], ModuleError> {
        match self.column(name)? {
            Column::Numeric(v) => Ok(&v[..self.rows]),
            other => Err(ModuleError::Computation {
                reason: format!("column {} is {}, expected numeric", name, other.kind()),
            }),
        }
    }

    pub fn flag(&self, name: &str) -> Result<&'a [bool], ModuleError> {
        match self.column(name)? {
            Column::Flag(v) => Ok(&v[..self.rows]),
            other => Err(ModuleError::Computation {
                reason: format!("column {} is {}, expected flag", name, other.kind()),
            }),
        }
    }

    pub fn label(&self, name: &str) -> Result<&'a [Option<String>], ModuleError> {
        match self.column(name)? {
            Column::Label(v) => Ok(&v[..self.rows]),
            other => Err(ModuleError::Computation {
                reason: format!("column {} is {}, expected label", name, other.kind()),
            }),
        }
    }
}

/// How a module's boolean entry series is produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalPath {
    /// Whole-column comparison via `entry_flags`.
    Vectorized,
    /// One `check_entry_condition` call per row.
    RowWise,
}

impl fmt::Display for SignalPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignalPath::Vectorized => f.write_str("vectorized"),
            SignalPath::RowWise => f.write_str("row-wise"),
        }
    }
}

pub trait StrategyModule {
    /// Stable identifier used in run configurations.
    fn id(&self) -> &'static str;

    /// Display name.
    fn name(&self) -> &'static str;

    /// Catalog grouping, e.g. "indicator" or "ict".
    fn category(&self) -> &'static str;

    fn describe_config(&self) -> ConfigSchema;

    /// Rows before this index never produce an entry.
    fn warmup(&self, _config: &ModuleConfig) -> usize {
        0
    }

    /// Derive named columns from the series. Must be deterministic and
    /// causal: the value at row `i` may only depend on rows `0..=i`.
    fn calculate(
        &self,
        series: &Series,
        config: &ModuleConfig,
    ) -> Result<Vec<(String, Column)>, ModuleError>;

    /// Entry predicate at `index`. `view` ends at `index`.
    fn check_entry_condition(
        &self,
        view: &ModuleView<'_>,
        index: usize,
        config: &ModuleConfig,
        direction: Direction,
    ) -> Result<bool, ModuleError>;

    /// True when the output depends on the UTC hour of each candle, which
    /// is meaningless on a synthetic index.
    fn reads_candle_hours(&self) -> bool {
        false
    }

    fn signal_path(&self) -> SignalPath {
        SignalPath::RowWise
    }

    /// Whole-series entry flags; only called when `signal_path` is
    /// `Vectorized`.
    fn entry_flags(
        &self,
        _view: &ModuleView<'_>,
        _config: &ModuleConfig,
        _direction: Direction,
    ) -> Result<Vec<bool>, ModuleError> {
        Err(ModuleError::Computation {
            reason: format!("module {} has no vectorized entry signal", self.id()),
        })
    }
}

/// A module paired with its validated configuration.
pub struct ConfiguredModule {
    pub module: Box<dyn StrategyModule>,
    pub config: ModuleConfig,
}

impl ConfiguredModule {
    pub fn new(module: Box<dyn StrategyModule>, config: ModuleConfig) -> Self {
        ConfiguredModule { module, config }
    }

    pub fn label(&self) -> &str {
        &self.config.label
    }
}

impl fmt::Debug for ConfiguredModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfiguredModule")
            .field("module", &self.module.id())
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::series::Bar;
    use chrono::TimeZone;

    fn schema() -> ConfigSchema {
        ConfigSchema::new(vec![
            ParamSpec::int("period", 14, 2, 200, "lookback"),
            ParamSpec::float("level", 30.0, 0.0, 100.0, "threshold"),
            ParamSpec::choice("mode", "cross", &["cross", "level"], "mode"),
            ParamSpec::multi("zones", &["london"], &["london", "asian"], "zones"),
        ])
    }

    #[test]
    fn resolve_fills_defaults() {
        let config = schema().resolve("rsi", "fast_rsi", &[]).unwrap();
        assert_eq!(config.label, "fast_rsi");
        assert_eq!(config.get_usize("period").unwrap(), 14);
        assert_eq!(config.get_float("level").unwrap(), 30.0);
        assert_eq!(config.get_choice("mode").unwrap(), "cross");
        assert_eq!(config.get_list("zones").unwrap(), &["london".to_string()]);
        assert!(schema().validate(&config).is_ok());
    }

    #[test]
    fn resolve_parses_declared_types() {
        let raw = vec![
            ("period".to_string(), "21".to_string()),
            ("level".to_string(), "25".to_string()),
            ("MODE".to_string(), "Level".to_string()),
            ("zones".to_string(), "london, asian".to_string()),
        ];
        let config = schema().resolve("rsi", "rsi", &raw).unwrap();
        assert_eq!(config.get_int("period").unwrap(), 21);
        assert_eq!(config.get_float("level").unwrap(), 25.0);
        assert_eq!(config.get_choice("mode").unwrap(), "level");
        assert_eq!(config.get_list("zones").unwrap().len(), 2);
    }

    #[test]
    fn resolve_empty_value_means_default() {
        let raw = vec![("period".to_string(), "".to_string())];
        let config = schema().resolve("rsi", "rsi", &raw).unwrap();
        assert_eq!(config.get_int("period").unwrap(), 14);
    }

    #[test]
    fn resolve_rejects_unknown_and_out_of_bounds() {
        let unknown = vec![("speed".to_string(), "3".to_string())];
        let err = schema().resolve("rsi", "rsi", &unknown).unwrap_err();
        assert!(err.to_string().contains("module.rsi.speed"));

        let high = vec![("period".to_string(), "500".to_string())];
        assert!(schema().resolve("rsi", "rsi", &high).is_err());

        let bad_choice = vec![("mode".to_string(), "other".to_string())];
        assert!(schema().resolve("rsi", "rsi", &bad_choice).is_err());

        let not_number = vec![("level".to_string(), "abc".to_string())];
        assert!(schema().resolve("rsi", "rsi", &not_number).is_err());
    }

    #[test]
    fn validate_rejects_missing_and_extra() {
        let mut config = schema().defaults("rsi");
        config.values.remove("period");
        assert!(schema().validate(&config).is_err());

        let extra = schema()
            .defaults("rsi")
            .with("bogus", ParamValue::Int(1));
        assert!(schema().validate(&extra).is_err());
    }

    #[test]
    fn getters_report_missing_param() {
        let config = schema().defaults("rsi");
        assert_eq!(
            config.get_int("nope"),
            Err(ModuleError::MissingParam {
                name: "nope".into()
            })
        );
        assert!(config.get_bool("period").is_err());
    }

    #[test]
    fn view_is_truncated_and_resolves_renames() {
        let base = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let mut series = Series::from_bars(
            (0..5).map(|i| (base + chrono::Duration::minutes(i), Bar::flat(i as f64))),
        );
        series
            .push_column("sma_1", Column::Numeric(vec![1.0, 2.0, 3.0, 4.0, 5.0]))
            .unwrap();
        let mut names = ColumnNames::new();
        names.insert("sma".to_string(), "sma_1".to_string());

        let full = ModuleView::new(&series, &names);
        assert_eq!(full.len(), 5);
        let view = full.upto(2);
        assert_eq!(view.len(), 3);
        assert_eq!(view.close(), &[0.0, 1.0, 2.0]);
        assert_eq!(view.numeric("sma").unwrap(), &[1.0, 2.0, 3.0]);
        assert!(view.bar(3).is_none());
        assert!(view.time_at(3).is_none());
        assert!(matches!(
            view.numeric("missing"),
            Err(ModuleError::MissingColumn { .. })
        ));
        assert!(view.flag("sma").is_err());
    }
}
