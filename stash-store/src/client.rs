//! Client seam for networked cache services
//!
//! The wire protocol is not part of this crate. A [`CacheClient`] is bound to
//! a list of server addresses and exposes the handful of operations a
//! memcached-style service offers. Implementations own connection pooling,
//! timeouts and retries; any failure they report is propagated unchanged.

use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt::Debug;
use std::time::Duration;

use crate::CacheResult;

#[async_trait]
pub trait CacheClient: Debug + Send + Sync {
    /// Server addresses this client talks to, in configured order
    fn servers(&self) -> &[String];

    async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>>;

    /// Fetch several keys in one round trip; missing keys are omitted
    async fn get_multi(&self, keys: &[String]) -> CacheResult<HashMap<String, Vec<u8>>> {
        let mut found = HashMap::with_capacity(keys.len());
        for key in keys {
            if let Some(value) = self.get(key).await? {
                found.insert(key.clone(), value);
            }
        }
        Ok(found)
    }

    /// Store unconditionally
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> CacheResult<()>;

    /// Store only if absent; `false` when the key already exists
    async fn add(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> CacheResult<bool>;

    /// `false` when the key did not exist
    async fn delete(&self, key: &str) -> CacheResult<bool>;

    /// Atomic increment; `None` when the key does not exist
    async fn incr(&self, key: &str, amount: u64) -> CacheResult<Option<u64>>;

    /// Atomic decrement, floored at zero; `None` when the key does not exist
    async fn decr(&self, key: &str, amount: u64) -> CacheResult<Option<u64>>;

    /// Drop every key on every server
    async fn flush_all(&self) -> CacheResult<()>;
}
