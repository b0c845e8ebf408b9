//! Cache error types

use thiserror::Error;

/// Result type for cache operations
pub type CacheResult<T> = std::result::Result<T, CacheError>;

/// Cache-related errors
///
/// A missing key is never an error: reads return `Ok(None)` for it.
#[derive(Debug, Error)]
pub enum CacheError {
    /// Caller tried to mutate a value the store handed out frozen
    #[error("can't modify frozen value for key '{key}'")]
    ImmutableValue { key: String },

    /// The medium behind the store could not be reached
    #[error("Cache backend unavailable: {0}")]
    BackendUnavailable(String),

    /// Value could not be encoded for storage
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Operation the backend cannot express
    #[error("Operation not supported by {backend} store: {operation}")]
    Unsupported {
        backend: &'static str,
        operation: &'static str,
    },

    /// Invalid configuration
    #[error("Invalid cache configuration: {0}")]
    InvalidConfiguration(String),

    /// Pattern passed to `delete_matched` did not compile
    #[error("Invalid key pattern: {0}")]
    InvalidPattern(#[from] regex::Error),

    /// Filesystem failure
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

impl CacheError {
    /// Wrap a client failure reported by a distributed cache service
    pub fn backend(message: impl Into<String>) -> Self {
        CacheError::BackendUnavailable(message.into())
    }

    /// Whether the error means the storage medium itself failed
    pub fn is_backend_failure(&self) -> bool {
        matches!(
            self,
            CacheError::BackendUnavailable(_) | CacheError::IoError(_)
        )
    }
}

impl From<serde_json::Error> for CacheError {
    fn from(err: serde_json::Error) -> Self {
        CacheError::Serialization(err.to_string())
    }
}

impl From<stash_config::ConfigError> for CacheError {
    fn from(err: stash_config::ConfigError) -> Self {
        CacheError::InvalidConfiguration(err.to_string())
    }
}
