//! Configuration for stash cache stores
//!
//! Selects the store backend and its construction arguments, whether a
//! local-cache overlay is installed per unit of work, and the log level.
//! Configuration is read from YAML, overridden by `STASH_*` environment
//! variables and validated per domain.

pub mod domains;
pub mod error;
pub mod loader;
pub mod validation;

pub use error::{ConfigError, ConfigResult};
pub use loader::ConfigLoader;

pub use domains::{
    logging::{LogLevel, LoggingConfig},
    store::StoreConfig,
    StashConfig,
};
