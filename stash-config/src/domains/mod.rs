//! Domain-specific configuration modules

pub mod logging;
pub mod store;
pub mod utils;

use crate::error::ConfigResult;
use crate::validation::Validatable;
use serde::{Deserialize, Serialize};

/// Top-level stash configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StashConfig {
    /// Backend selection and arguments
    #[serde(default)]
    pub store: store::StoreConfig,

    /// Install a local-cache overlay around the store for each unit of work
    #[serde(default = "crate::domains::utils::default_true")]
    pub local_cache: bool,

    /// Logging configuration
    #[serde(default)]
    pub logging: logging::LoggingConfig,
}

impl Default for StashConfig {
    fn default() -> Self {
        Self {
            store: store::StoreConfig::default(),
            local_cache: true,
            logging: logging::LoggingConfig::default(),
        }
    }
}

impl StashConfig {
    /// Validate all domain configurations
    pub fn validate_all(&self) -> ConfigResult<()> {
        self.store.validate()?;
        Ok(())
    }

    /// Serialize the configuration as YAML
    pub fn to_yaml(&self) -> ConfigResult<String> {
        Ok(serde_yaml::to_string(self)?)
    }
}
