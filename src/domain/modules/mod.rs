//! Built-in strategy modules and the catalog that instantiates them by id.

pub mod displacement;
pub mod fair_value_gaps;
pub mod kill_zones;
pub mod rsi;
pub mod sma;

use crate::domain::error::ModtraderError;
use crate::domain::module::{ConfiguredModule, ModuleConfig, StrategyModule};

pub use displacement::DisplacementModule;
pub use fair_value_gaps::FairValueGapsModule;
pub use kill_zones::KillZonesModule;
pub use rsi::RsiModule;
pub use sma::SmaModule;

/// Supplies module implementations for configured entries.
pub trait ModuleRegistry {
    /// Ids of every module this registry can create, in listing order.
    fn ids(&self) -> Vec<&'static str>;

    fn create(&self, module_id: &str) -> Option<Box<dyn StrategyModule>>;

    /// Pair every configuration with its implementation, preserving order.
    /// The configuration is re-validated against the module's schema.
    fn configure(&self, configs: &[ModuleConfig]) -> Result<Vec<ConfiguredModule>, ModtraderError> {
        configs
            .iter()
            .map(|config| -> Result<ConfiguredModule, ModtraderError> {
                let module = self.create(&config.module_id).ok_or_else(|| {
                    ModtraderError::config(
                        format!("module.{}", config.label),
                        format!(
                            "unknown module {:?}; available: {}",
                            config.module_id,
                            self.ids().join(", ")
                        ),
                    )
                })?;
                module.describe_config().validate(config)?;
                Ok(ConfiguredModule::new(module, config.clone()))
            })
            .collect()
    }
}

/// The modules shipped with modtrader.
#[derive(Debug, Default, Clone, Copy)]
pub struct Catalog;

impl ModuleRegistry for Catalog {
    fn ids(&self) -> Vec<&'static str> {
        vec!["rsi", "sma", "kill_zones", "fair_value_gaps", "displacement"]
    }

    fn create(&self, module_id: &str) -> Option<Box<dyn StrategyModule>> {
        match module_id {
            "rsi" => Some(Box::new(RsiModule)),
            "sma" => Some(Box::new(SmaModule)),
            "kill_zones" => Some(Box::new(KillZonesModule)),
            "fair_value_gaps" | "fvg" => Some(Box::new(FairValueGapsModule)),
            "displacement" => Some(Box::new(DisplacementModule)),
            _ => None,
        }
    }
}
