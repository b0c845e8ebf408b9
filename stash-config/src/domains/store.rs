//! Store backend configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigResult;
use crate::validation::{
    validate_positive, validate_required_string, validate_server_address, Validatable,
};

/// Backend selection plus the arguments needed to construct it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "snake_case")]
pub enum StoreConfig {
    /// Process-wide in-memory mapping
    Memory {
        /// Refuse new keys once this many live entries are stored
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max_entries: Option<usize>,
    },

    /// One file per key under `cache_path`
    File {
        cache_path: PathBuf,
    },

    /// Networked cache service reached through a client
    Distributed {
        /// Server addresses in `host:port` form, order preserved
        #[serde(default)]
        servers: Vec<String>,

        /// Prefix prepended to every key before it crosses the wire
        #[serde(default, skip_serializing_if = "Option::is_none")]
        namespace: Option<String>,

        /// TTL applied to writes that do not carry their own
        #[serde(
            default,
            with = "crate::domains::utils::serde_duration_option",
            skip_serializing_if = "Option::is_none"
        )]
        default_ttl: Option<Duration>,
    },
}

/// Backend identifier used by `STASH_BACKEND`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Memory,
    File,
    Distributed,
}

impl StoreConfig {
    /// Backend identifier of this configuration
    pub fn kind(&self) -> BackendKind {
        match self {
            StoreConfig::Memory { .. } => BackendKind::Memory,
            StoreConfig::File { .. } => BackendKind::File,
            StoreConfig::Distributed { .. } => BackendKind::Distributed,
        }
    }

    /// Empty configuration for the given backend
    pub fn for_kind(kind: BackendKind) -> Self {
        match kind {
            BackendKind::Memory => StoreConfig::Memory { max_entries: None },
            BackendKind::File => StoreConfig::File {
                cache_path: PathBuf::new(),
            },
            BackendKind::Distributed => StoreConfig::Distributed {
                servers: Vec::new(),
                namespace: None,
                default_ttl: None,
            },
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig::Memory { max_entries: None }
    }
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "memory" | "memory_store" => Ok(BackendKind::Memory),
            "file" | "file_store" => Ok(BackendKind::File),
            "distributed" | "mem_cache_store" | "memcache" => Ok(BackendKind::Distributed),
            _ => Err(format!("Invalid store backend: {}", s)),
        }
    }
}

impl Validatable for StoreConfig {
    fn validate(&self) -> ConfigResult<()> {
        match self {
            StoreConfig::Memory { max_entries } => {
                if let Some(max_entries) = max_entries {
                    validate_positive(*max_entries, "max_entries", self.domain_name())?;
                }
                Ok(())
            }
            StoreConfig::File { cache_path } => {
                validate_required_string(
                    &cache_path.to_string_lossy(),
                    "cache_path",
                    self.domain_name(),
                )
            }
            StoreConfig::Distributed {
                servers, namespace, ..
            } => {
                if servers.is_empty() {
                    return Err(self.validation_error("At least one server must be configured"));
                }
                for server in servers {
                    validate_server_address(server, "servers", self.domain_name())?;
                }
                if let Some(namespace) = namespace {
                    validate_required_string(namespace, "namespace", self.domain_name())?;
                }
                Ok(())
            }
        }
    }

    fn domain_name(&self) -> &'static str {
        "store"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_unbounded_memory() {
        let config = StoreConfig::default();
        assert_eq!(config, StoreConfig::Memory { max_entries: None });
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_backend_kind_parsing() {
        assert_eq!("memory".parse::<BackendKind>().unwrap(), BackendKind::Memory);
        assert_eq!("FILE".parse::<BackendKind>().unwrap(), BackendKind::File);
        assert_eq!(
            "mem_cache_store".parse::<BackendKind>().unwrap(),
            BackendKind::Distributed
        );
        assert!("redis".parse::<BackendKind>().is_err());
    }

    #[test]
    fn test_distributed_requires_servers() {
        let config = StoreConfig::for_kind(BackendKind::Distributed);
        assert!(config.validate().is_err());

        let config = StoreConfig::Distributed {
            servers: vec!["localhost:11211".to_string(), "localhost:11211".to_string()],
            namespace: Some("app".to_string()),
            default_ttl: None,
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_file_requires_path() {
        assert!(StoreConfig::for_kind(BackendKind::File).validate().is_err());
        let config = StoreConfig::File {
            cache_path: PathBuf::from("/tmp/stash"),
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let config = StoreConfig::Memory {
            max_entries: Some(0),
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_yaml_tagging() {
        let yaml = r#"
backend: distributed
servers:
  - "cache-1:11211"
  - "cache-2:11211"
namespace: app
default_ttl: 300
"#;
        let config: StoreConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(
            config,
            StoreConfig::Distributed {
                servers: vec!["cache-1:11211".to_string(), "cache-2:11211".to_string()],
                namespace: Some("app".to_string()),
                default_ttl: Some(Duration::from_secs(300)),
            }
        );
    }

    #[test]
    fn test_ttl_written_as_seconds() {
        let config = StoreConfig::Distributed {
            servers: vec!["localhost:11211".to_string()],
            namespace: None,
            default_ttl: Some(Duration::from_secs(90)),
        };
        let yaml = serde_yaml::to_string(&config).unwrap();
        assert!(yaml.contains("default_ttl: 90"));

        let back: StoreConfig = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(back, config);
    }
}
