//! Store construction from configuration
//!
//! [`Store`] is the closed set of backends. It is resolved once, from either a
//! [`StoreConfig`] or an already-built store, and then used through the
//! [`CacheStore`] contract like any single backend.

use async_trait::async_trait;
use serde_json::Value;
use stash_config::validation::Validatable;
use stash_config::StoreConfig;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

use crate::{
    cache::CacheStore,
    client::CacheClient,
    stores::{DistributedStore, FileStore, MemoryStore},
    CacheError, CacheOptions, CacheResult, CachedValue,
};

/// One of the supported backends
#[derive(Debug, Clone)]
pub enum Store {
    Memory(MemoryStore),
    File(FileStore),
    Distributed(DistributedStore),
}

/// What [`Store::lookup`] builds a store from
#[derive(Debug)]
pub enum StoreSource {
    /// Construct from configuration; distributed backends need a client
    Config {
        config: StoreConfig,
        client: Option<Arc<dyn CacheClient>>,
    },
    /// Use an existing store unchanged
    Instance(Store),
}

impl From<StoreConfig> for StoreSource {
    fn from(config: StoreConfig) -> Self {
        StoreSource::Config {
            config,
            client: None,
        }
    }
}

impl From<Store> for StoreSource {
    fn from(store: Store) -> Self {
        StoreSource::Instance(store)
    }
}

impl From<MemoryStore> for Store {
    fn from(store: MemoryStore) -> Self {
        Store::Memory(store)
    }
}

impl From<FileStore> for Store {
    fn from(store: FileStore) -> Self {
        Store::File(store)
    }
}

impl From<DistributedStore> for Store {
    fn from(store: DistributedStore) -> Self {
        Store::Distributed(store)
    }
}

impl Store {
    /// Resolve a store from configuration or pass an existing one through
    pub fn lookup(source: impl Into<StoreSource>) -> CacheResult<Store> {
        match source.into() {
            StoreSource::Instance(store) => Ok(store),
            StoreSource::Config { config, client } => Self::from_config(&config, client),
        }
    }

    /// Build the configured backend
    pub fn from_config(
        config: &StoreConfig,
        client: Option<Arc<dyn CacheClient>>,
    ) -> CacheResult<Store> {
        config.validate()?;

        let store = match config {
            StoreConfig::Memory { max_entries } => Store::Memory(match max_entries {
                Some(max) => MemoryStore::with_max_entries(*max),
                None => MemoryStore::new(),
            }),
            StoreConfig::File { cache_path } => Store::File(FileStore::new(cache_path.clone())),
            StoreConfig::Distributed {
                servers,
                namespace,
                default_ttl,
            } => {
                let client = client.ok_or_else(|| {
                    CacheError::InvalidConfiguration(
                        "distributed store requires a cache client".to_string(),
                    )
                })?;
                if client.servers() != servers.as_slice() {
                    debug!(
                        configured = ?servers,
                        client = ?client.servers(),
                        "client server list differs from configuration"
                    );
                }

                let mut store = DistributedStore::new(client);
                if let Some(namespace) = namespace {
                    store = store.with_namespace(namespace.clone());
                }
                if let Some(ttl) = default_ttl {
                    store = store.with_default_ttl(*ttl);
                }
                Store::Distributed(store)
            }
        };

        info!(backend = store.backend_name(), "cache store ready");
        Ok(store)
    }

    /// The memory store, when that is the active backend
    pub fn as_memory(&self) -> Option<&MemoryStore> {
        match self {
            Store::Memory(store) => Some(store),
            _ => None,
        }
    }
}

macro_rules! dispatch {
    ($self:ident, $store:ident => $call:expr) => {
        match $self {
            Store::Memory($store) => $call,
            Store::File($store) => $call,
            Store::Distributed($store) => $call,
        }
    };
}

#[async_trait]
impl CacheStore for Store {
    fn backend_name(&self) -> &'static str {
        dispatch!(self, store => store.backend_name())
    }

    async fn read(&self, key: &str, options: &CacheOptions) -> CacheResult<Option<CachedValue>> {
        dispatch!(self, store => store.read(key, options).await)
    }

    async fn write(&self, key: &str, value: Value, options: &CacheOptions) -> CacheResult<bool> {
        dispatch!(self, store => store.write(key, value, options).await)
    }

    async fn delete(&self, key: &str, options: &CacheOptions) -> CacheResult<bool> {
        dispatch!(self, store => store.delete(key, options).await)
    }

    async fn exist(&self, key: &str, options: &CacheOptions) -> CacheResult<bool> {
        dispatch!(self, store => store.exist(key, options).await)
    }

    async fn increment(&self, key: &str, amount: i64, options: &CacheOptions) -> CacheResult<i64> {
        dispatch!(self, store => store.increment(key, amount, options).await)
    }

    async fn decrement(&self, key: &str, amount: i64, options: &CacheOptions) -> CacheResult<i64> {
        dispatch!(self, store => store.decrement(key, amount, options).await)
    }

    async fn clear(&self) -> CacheResult<()> {
        dispatch!(self, store => store.clear().await)
    }

    async fn delete_matched(&self, pattern: &str, options: &CacheOptions) -> CacheResult<usize> {
        dispatch!(self, store => store.delete_matched(pattern, options).await)
    }

    async fn read_multi(
        &self,
        keys: &[&str],
        options: &CacheOptions,
    ) -> CacheResult<HashMap<String, CachedValue>> {
        dispatch!(self, store => store.read_multi(keys, options).await)
    }
}
