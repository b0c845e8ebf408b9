//! Per-operation options

use std::time::Duration;

/// Options accepted by every store operation
///
/// Backends ignore options that do not apply to them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheOptions {
    /// Store and return the value's direct string form, without serialization
    pub raw: bool,

    /// `fetch` only: skip the read and always recompute
    pub force: bool,

    /// Only write when the key is not already present
    pub unless_exist: bool,

    /// Expire the entry after this long, where the backend supports it
    pub expires_in: Option<Duration>,

    /// Distributed stores: key prefix overriding the configured namespace
    pub namespace: Option<String>,
}

impl CacheOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raw(mut self) -> Self {
        self.raw = true;
        self
    }

    pub fn force(mut self) -> Self {
        self.force = true;
        self
    }

    pub fn unless_exist(mut self) -> Self {
        self.unless_exist = true;
        self
    }

    pub fn expires_in(mut self, ttl: Duration) -> Self {
        self.expires_in = Some(ttl);
        self
    }

    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    /// Options to use when `fetch` writes a computed value
    pub(crate) fn for_fetch_write(&self) -> Self {
        Self {
            force: false,
            ..self.clone()
        }
    }
}
