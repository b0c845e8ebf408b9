//! Configuration loading and environment variable handling

use crate::domains::store::{BackendKind, StoreConfig};
use crate::domains::StashConfig;
use crate::error::{ConfigError, ConfigResult};
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Configuration loader with environment variable support
pub struct ConfigLoader {
    /// Environment variable prefix
    prefix: String,
}

impl ConfigLoader {
    /// Create a new config loader with default prefix
    pub fn new() -> Self {
        Self {
            prefix: "STASH".to_string(),
        }
    }

    /// Create a new config loader with custom prefix
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// Load configuration from a YAML file with environment overrides
    pub fn from_file(&self, path: impl AsRef<Path>) -> ConfigResult<StashConfig> {
        let content = std::fs::read_to_string(path)?;
        let mut config: StashConfig = serde_yaml::from_str(&content)?;

        self.apply_env_overrides(&mut config)?;
        config.validate_all()?;

        Ok(config)
    }

    /// Load configuration from environment variables only
    pub fn from_env(&self) -> ConfigResult<StashConfig> {
        let mut config = StashConfig::default();
        self.apply_env_overrides(&mut config)?;
        config.validate_all()?;
        Ok(config)
    }

    /// Load configuration with fallback chain
    pub fn load(&self, config_path: Option<impl AsRef<Path>>) -> ConfigResult<StashConfig> {
        match config_path {
            Some(path) => self.from_file(path),
            None => self.from_env(),
        }
    }

    /// Apply environment variable overrides to configuration
    fn apply_env_overrides(&self, config: &mut StashConfig) -> ConfigResult<()> {
        self.apply_store_overrides(&mut config.store)?;

        if let Ok(local_cache) = self.get_env_var("LOCAL_CACHE") {
            config.local_cache = local_cache
                .parse()
                .map_err(|e| ConfigError::EnvError(format!("Invalid LOCAL_CACHE: {}", e)))?;
        }

        if let Ok(log_level) = self.get_env_var("LOG_LEVEL") {
            config.logging.level = crate::domains::logging::LogLevel::from_str(&log_level)
                .map_err(|_| ConfigError::EnvError(format!("Invalid LOG_LEVEL: {}", log_level)))?;
        }

        Ok(())
    }

    /// Apply store config overrides
    fn apply_store_overrides(&self, config: &mut StoreConfig) -> ConfigResult<()> {
        if let Ok(backend) = self.get_env_var("BACKEND") {
            let kind = BackendKind::from_str(&backend)
                .map_err(|e| ConfigError::EnvError(format!("Invalid BACKEND: {}", e)))?;
            if config.kind() != kind {
                *config = StoreConfig::for_kind(kind);
            }
        }

        if let Ok(max) = self.get_env_var("MAX_ENTRIES") {
            let StoreConfig::Memory { max_entries } = config else {
                return Err(ConfigError::EnvError(
                    "MAX_ENTRIES requires the memory backend".to_string(),
                ));
            };
            let max: usize = max
                .parse()
                .map_err(|e| ConfigError::EnvError(format!("Invalid MAX_ENTRIES: {}", e)))?;
            *max_entries = Some(max);
        }

        if let Ok(path) = self.get_env_var("CACHE_PATH") {
            let StoreConfig::File { cache_path } = config else {
                return Err(ConfigError::EnvError(
                    "CACHE_PATH requires the file backend".to_string(),
                ));
            };
            *cache_path = PathBuf::from(path);
        }

        if let StoreConfig::Distributed {
            servers,
            namespace,
            default_ttl,
        } = config
        {
            if let Ok(list) = self.get_env_var("SERVERS") {
                *servers = list
                    .split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect();
            }

            if let Ok(ns) = self.get_env_var("NAMESPACE") {
                *namespace = Some(ns);
            }

            if let Ok(ttl) = self.get_env_var("DEFAULT_TTL") {
                let seconds: u64 = ttl
                    .parse()
                    .map_err(|e| ConfigError::EnvError(format!("Invalid DEFAULT_TTL: {}", e)))?;
                *default_ttl = Some(std::time::Duration::from_secs(seconds));
            }
        }

        Ok(())
    }

    /// Get environment variable with prefix
    fn get_env_var(&self, name: &str) -> Result<String, std::env::VarError> {
        std::env::var(format!("{}_{}", self.prefix, name))
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}
