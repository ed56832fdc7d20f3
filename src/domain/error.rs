//! Domain error types.

/// Error returned by a strategy module's `calculate` or
/// `check_entry_condition`.
///
/// `Misaligned` is the only variant that asks the pipeline to re-standardize
/// the series and retry the module once.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ModuleError {
    #[error("row alignment error: {reason}")]
    Misaligned { reason: String },

    #[error("missing column {name}")]
    MissingColumn { name: String },

    #[error("missing parameter {name}")]
    MissingParam { name: String },

    #[error("computation failed: {reason}")]
    Computation { reason: String },
}

impl ModuleError {
    pub fn requests_restandardize(&self) -> bool {
        matches!(self, ModuleError::Misaligned { .. })
    }
}

/// Top-level error type for modtrader.
#[derive(Debug, thiserror::Error)]
pub enum ModtraderError {
    #[error("invalid configuration {field}: {reason}")]
    ConfigValidation { field: String, reason: String },

    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("no data available for {symbol} ({timeframe})")]
    DataUnavailable { symbol: String, timeframe: String },

    #[error("data source error: {reason}")]
    DataSource { reason: String },

    #[error(
        "insufficient data: only {rows} usable rows after indicator calculation, need at least {minimum}\n\
         Solutions:\n  \
         1. Use a longer backtest period (try 3mo or 6mo)\n  \
         2. Use shorter indicator periods (e.g. SMA 20 instead of SMA 200)\n  \
         3. Use a higher timeframe (1h or 4h instead of 15m)"
    )]
    InsufficientData { rows: usize, minimum: usize },

    #[error("module {module} failed after {attempts} attempt(s): {reason}")]
    ModuleComputation {
        module: String,
        attempts: usize,
        reason: String,
    },

    #[error("standardization failure: {reason}")]
    StandardizationFailure { reason: String },

    #[error("invalid trade list: {0}")]
    TradeValidation(#[from] crate::domain::trade::TradeViolation),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl ModtraderError {
    pub fn config(field: impl Into<String>, reason: impl Into<String>) -> Self {
        ModtraderError::ConfigValidation {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

impl From<&ModtraderError> for std::process::ExitCode {
    fn from(err: &ModtraderError) -> Self {
        let code: u8 = match err {
            ModtraderError::Io(_) => 1,
            ModtraderError::ConfigValidation { .. } | ModtraderError::ConfigParse { .. } => 2,
            ModtraderError::DataUnavailable { .. } | ModtraderError::DataSource { .. } => 3,
            ModtraderError::InsufficientData { .. } => 4,
            ModtraderError::ModuleComputation { .. } => 5,
            ModtraderError::StandardizationFailure { .. } => 6,
            ModtraderError::TradeValidation(_) => 7,
        };
        std::process::ExitCode::from(code)
    }
}
