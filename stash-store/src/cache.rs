//! Core store contract and entry types

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::{CacheOptions, CacheResult, CachedValue};

/// Operations every cache backend implements
///
/// Keys are canonical strings (see [`crate::expand_cache_key`]). A missing
/// key reads as `Ok(None)`, which is distinct from a stored `Value::Null`.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Short backend name used in logs and errors
    fn backend_name(&self) -> &'static str;

    /// Read a value, `None` when the key is missing
    async fn read(&self, key: &str, options: &CacheOptions) -> CacheResult<Option<CachedValue>>;

    /// Write a value; `false` when the write was declined (e.g. `unless_exist`)
    async fn write(&self, key: &str, value: Value, options: &CacheOptions) -> CacheResult<bool>;

    /// Delete a key; `false` when nothing was stored under it
    async fn delete(&self, key: &str, options: &CacheOptions) -> CacheResult<bool>;

    /// Whether a value is stored under `key`
    async fn exist(&self, key: &str, options: &CacheOptions) -> CacheResult<bool> {
        Ok(self.read(key, options).await?.is_some())
    }

    /// Add `amount` to the raw integer stored under `key` and return the result
    async fn increment(&self, key: &str, amount: i64, options: &CacheOptions) -> CacheResult<i64>;

    /// Subtract `amount` from the raw integer stored under `key` and return the result
    async fn decrement(&self, key: &str, amount: i64, options: &CacheOptions) -> CacheResult<i64>;

    /// Remove every entry
    async fn clear(&self) -> CacheResult<()>;

    /// Delete every key matching a regular expression, returning how many went
    async fn delete_matched(&self, pattern: &str, options: &CacheOptions) -> CacheResult<usize>;

    /// Read several keys at once; missing keys are absent from the result
    async fn read_multi(
        &self,
        keys: &[&str],
        options: &CacheOptions,
    ) -> CacheResult<HashMap<String, CachedValue>> {
        let mut found = HashMap::with_capacity(keys.len());
        for key in keys {
            if let Some(value) = self.read(key, options).await? {
                found.insert((*key).to_string(), value);
            }
        }
        Ok(found)
    }

    /// Return the cached value, computing and storing it on a miss
    ///
    /// With `options.force` the read is skipped and `default` always runs.
    async fn fetch<F, Fut>(
        &self,
        key: &str,
        options: &CacheOptions,
        default: F,
    ) -> CacheResult<CachedValue>
    where
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = Value> + Send,
    {
        if !options.force {
            if let Some(value) = self.read(key, options).await? {
                return Ok(value);
            }
        }

        let value = default().await;
        self.write(key, value.clone(), &options.for_fetch_write())
            .await?;
        Ok(CachedValue::new(key, value))
    }
}

macro_rules! forward_cache_store {
    ($($wrapper:ty),*) => {
        $(
            #[async_trait]
            impl<T: CacheStore + ?Sized> CacheStore for $wrapper {
                fn backend_name(&self) -> &'static str {
                    (**self).backend_name()
                }

                async fn read(&self, key: &str, options: &CacheOptions) -> CacheResult<Option<CachedValue>> {
                    (**self).read(key, options).await
                }

                async fn write(&self, key: &str, value: Value, options: &CacheOptions) -> CacheResult<bool> {
                    (**self).write(key, value, options).await
                }

                async fn delete(&self, key: &str, options: &CacheOptions) -> CacheResult<bool> {
                    (**self).delete(key, options).await
                }

                async fn exist(&self, key: &str, options: &CacheOptions) -> CacheResult<bool> {
                    (**self).exist(key, options).await
                }

                async fn increment(&self, key: &str, amount: i64, options: &CacheOptions) -> CacheResult<i64> {
                    (**self).increment(key, amount, options).await
                }

                async fn decrement(&self, key: &str, amount: i64, options: &CacheOptions) -> CacheResult<i64> {
                    (**self).decrement(key, amount, options).await
                }

                async fn clear(&self) -> CacheResult<()> {
                    (**self).clear().await
                }

                async fn delete_matched(&self, pattern: &str, options: &CacheOptions) -> CacheResult<usize> {
                    (**self).delete_matched(pattern, options).await
                }

                async fn read_multi(
                    &self,
                    keys: &[&str],
                    options: &CacheOptions,
                ) -> CacheResult<HashMap<String, CachedValue>> {
                    (**self).read_multi(keys, options).await
                }
            }
        )*
    };
}

forward_cache_store!(Arc<T>, &T);

/// Stored entry with expiry metadata
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// The stored value, shared read-only with readers
    pub value: Arc<Value>,

    /// When the entry was created
    pub created_at: Instant,

    /// When the entry expires (if applicable)
    pub expires_at: Option<Instant>,

    /// Stored as raw text rather than a structured value
    pub raw: bool,
}

impl CacheEntry {
    /// Create a new cache entry
    pub fn new(value: Value) -> Self {
        Self {
            value: Arc::new(value),
            created_at: Instant::now(),
            expires_at: None,
            raw: false,
        }
    }

    /// Create a new cache entry with TTL
    pub fn with_ttl(value: Value, ttl: Duration) -> Self {
        let mut entry = Self::new(value);
        entry.expires_at = Some(entry.created_at + ttl);
        entry
    }

    /// Create an entry honouring `options.expires_in` and `options.raw`
    pub fn from_options(value: Value, options: &CacheOptions) -> Self {
        let mut entry = match options.expires_in {
            Some(ttl) => Self::with_ttl(value, ttl),
            None => Self::new(value),
        };
        entry.raw = options.raw;
        entry
    }

    /// Mark the entry as raw text
    pub fn into_raw(mut self) -> Self {
        self.raw = true;
        self
    }

    /// Check if the entry is expired
    pub fn is_expired(&self) -> bool {
        match self.expires_at {
            Some(expires_at) => Instant::now() > expires_at,
            None => false,
        }
    }
}
