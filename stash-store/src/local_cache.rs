//! Scoped local cache in front of a shared store
//!
//! A [`LocalCache`] wraps another store for one unit of work (typically one
//! request). Every write, delete and counter update goes through to the
//! wrapped store immediately; the local map only remembers what this scope
//! has already seen so repeated reads skip the round trip.
//!
//! The local map is never written back. Dropping the `LocalCache` ends the
//! scope and discards it. Changes other processes make to a key this scope
//! has already seen are not observed until the scope ends or the key is
//! [invalidated](LocalCache::invalidate).

use async_trait::async_trait;
use parking_lot::Mutex;
use regex::Regex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, trace};

use crate::{
    cache::CacheStore,
    value::{decode_payload, encode_payload, raw_text},
    CacheOptions, CacheResult, CachedValue,
};

/// What the scope knows about a key
#[derive(Debug, Clone)]
enum LocalEntry {
    /// Value as a non-raw read would return it
    Cached(Arc<Value>),
    /// Observed missing, or deleted within the scope
    CachedNil,
}

/// Scope-owned overlay around a store
#[derive(Debug)]
pub struct LocalCache<S> {
    store: S,
    entries: Mutex<HashMap<String, LocalEntry>>,
}

impl<S: CacheStore> LocalCache<S> {
    /// Begin a scope around `store` with an empty local map
    pub fn new(store: S) -> Self {
        debug!(backend = store.backend_name(), "local cache scope started");
        Self {
            store,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// The wrapped store
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Number of keys the scope currently knows about
    pub fn local_len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Forget what the scope knows about `key`; the next read goes to the store
    pub fn invalidate(&self, key: &str, options: &CacheOptions) {
        self.entries.lock().remove(&local_key(key, options));
    }

    /// End the scope, returning the wrapped store
    pub fn into_inner(self) -> S {
        debug!(known_keys = self.local_len(), "local cache scope ended");
        self.store
    }

    fn lookup(&self, key: &str) -> Option<LocalEntry> {
        self.entries.lock().get(key).cloned()
    }

    fn remember(&self, key: String, entry: LocalEntry) {
        self.entries.lock().insert(key, entry);
    }

    fn forget(&self, key: &str) {
        self.entries.lock().remove(key);
    }
}

/// Local map key; a per-call namespace addresses a different remote key
fn local_key(key: &str, options: &CacheOptions) -> String {
    match &options.namespace {
        Some(namespace) => format!("{}:{}", namespace, key),
        None => key.to_string(),
    }
}

/// The value a later non-raw read of what was just written would return
fn written_value(value: Value, options: &CacheOptions) -> CacheResult<Value> {
    if options.raw {
        Ok(decode_payload(&encode_payload(&value, true)?, false))
    } else {
        Ok(value)
    }
}

fn local_hit(key: &str, entry: LocalEntry, options: &CacheOptions) -> Option<CachedValue> {
    match entry {
        LocalEntry::Cached(value) if options.raw => Some(CachedValue::frozen(
            key,
            Arc::new(Value::String(raw_text(&value))),
        )),
        LocalEntry::Cached(value) => Some(CachedValue::frozen(key, value)),
        LocalEntry::CachedNil => None,
    }
}

#[async_trait]
impl<S: CacheStore> CacheStore for LocalCache<S> {
    fn backend_name(&self) -> &'static str {
        self.store.backend_name()
    }

    async fn read(&self, key: &str, options: &CacheOptions) -> CacheResult<Option<CachedValue>> {
        let local = local_key(key, options);
        if let Some(entry) = self.lookup(&local) {
            trace!(key, "local cache hit");
            return Ok(local_hit(key, entry, options));
        }

        let found = self.store.read(key, options).await?;
        match found {
            None => {
                self.remember(local, LocalEntry::CachedNil);
                Ok(None)
            }
            // A raw payload is not the value a regular read would see.
            Some(value) if options.raw => Ok(Some(value)),
            Some(value) => {
                let value = value.freeze();
                self.remember(local, LocalEntry::Cached(value.shared()));
                Ok(Some(value))
            }
        }
    }

    async fn write(&self, key: &str, value: Value, options: &CacheOptions) -> CacheResult<bool> {
        let local = local_key(key, options);
        let cached = written_value(value.clone(), options)?;

        if self.store.write(key, value, options).await? {
            self.remember(local, LocalEntry::Cached(Arc::new(cached)));
            Ok(true)
        } else {
            // Declined: the store holds something this scope has not seen.
            self.forget(&local);
            Ok(false)
        }
    }

    async fn delete(&self, key: &str, options: &CacheOptions) -> CacheResult<bool> {
        let deleted = self.store.delete(key, options).await?;
        self.remember(local_key(key, options), LocalEntry::CachedNil);
        Ok(deleted)
    }

    async fn exist(&self, key: &str, options: &CacheOptions) -> CacheResult<bool> {
        let local = local_key(key, options);
        if let Some(entry) = self.lookup(&local) {
            trace!(key, "local cache hit");
            return Ok(matches!(entry, LocalEntry::Cached(_)));
        }

        // Learn the value too, so later reads and checks stay local
        let regular = CacheOptions {
            raw: false,
            ..options.clone()
        };
        Ok(self.read(key, &regular).await?.is_some())
    }

    async fn increment(&self, key: &str, amount: i64, options: &CacheOptions) -> CacheResult<i64> {
        let value = self.store.increment(key, amount, options).await?;
        self.remember(
            local_key(key, options),
            LocalEntry::Cached(Arc::new(Value::from(value))),
        );
        Ok(value)
    }

    async fn decrement(&self, key: &str, amount: i64, options: &CacheOptions) -> CacheResult<i64> {
        let value = self.store.decrement(key, amount, options).await?;
        self.remember(
            local_key(key, options),
            LocalEntry::Cached(Arc::new(Value::from(value))),
        );
        Ok(value)
    }

    async fn clear(&self) -> CacheResult<()> {
        self.store.clear().await?;
        self.entries.lock().clear();
        Ok(())
    }

    async fn delete_matched(&self, pattern: &str, options: &CacheOptions) -> CacheResult<usize> {
        let deleted = self.store.delete_matched(pattern, options).await?;
        let matcher = Regex::new(pattern)?;
        let prefix = options
            .namespace
            .as_ref()
            .map(|namespace| format!("{}:", namespace));

        let mut entries = self.entries.lock();
        entries.retain(|local, entry| {
            let own_key = match &prefix {
                Some(prefix) => local.strip_prefix(prefix.as_str()),
                None => Some(local.as_str()),
            };
            if own_key.is_some_and(|key| matcher.is_match(key)) {
                *entry = LocalEntry::CachedNil;
                return true;
            }
            // Another namespace's entry may name the same stored key; re-read it
            let bare = local.split_once(':').map_or(local.as_str(), |(_, key)| key);
            !(matcher.is_match(local) || matcher.is_match(bare))
        });
        debug!(pattern, deleted, known_keys = entries.len(), "local cache delete matched");
        Ok(deleted)
    }

    async fn read_multi(
        &self,
        keys: &[&str],
        options: &CacheOptions,
    ) -> CacheResult<HashMap<String, CachedValue>> {
        let mut found = HashMap::with_capacity(keys.len());
        let mut unknown = Vec::new();
        for key in keys {
            match self.lookup(&local_key(key, options)) {
                Some(entry) => {
                    if let Some(value) = local_hit(key, entry, options) {
                        found.insert((*key).to_string(), value);
                    }
                }
                None => unknown.push(*key),
            }
        }

        if unknown.is_empty() {
            return Ok(found);
        }

        let fetched = self.store.read_multi(&unknown, options).await?;
        for key in unknown {
            let local = local_key(key, options);
            match fetched.get(key) {
                Some(value) if options.raw => {
                    found.insert(key.to_string(), value.clone());
                }
                Some(value) => {
                    let value = value.clone().freeze();
                    self.remember(local, LocalEntry::Cached(value.shared()));
                    found.insert(key.to_string(), value);
                }
                None => self.remember(local, LocalEntry::CachedNil),
            }
        }
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::CacheClient;
    use crate::stores::{DistributedStore, MemoryStore};
    use crate::testing::MemoryClient;
    use crate::CacheError;
    use serde_json::json;

    fn opts() -> CacheOptions {
        CacheOptions::default()
    }

    fn distributed() -> (DistributedStore, Arc<MemoryClient>) {
        let client = Arc::new(MemoryClient::new(vec!["localhost:11211".to_string()]));
        (DistributedStore::new(client.clone()), client)
    }

    #[tokio::test]
    async fn test_write_then_read_skips_network() {
        let (store, client) = distributed();
        let local = LocalCache::new(&store);

        local.write("foo", json!("bar"), &opts()).await.unwrap();
        let calls = client.total_calls();

        assert_eq!(local.read("foo", &opts()).await.unwrap().unwrap(), json!("bar"));
        assert!(local.exist("foo", &opts()).await.unwrap());
        assert_eq!(client.total_calls(), calls);
    }

    #[tokio::test]
    async fn test_repeated_reads_hit_store_once() {
        let (store, client) = distributed();
        store.write("foo", json!({"a": 1}), &opts()).await.unwrap();
        let local = LocalCache::new(&store);

        for _ in 0..3 {
            assert_eq!(local.read("foo", &opts()).await.unwrap().unwrap(), json!({"a": 1}));
        }
        assert_eq!(client.reads(), 1);
    }

    #[tokio::test]
    async fn test_missing_is_remembered() {
        let (store, client) = distributed();
        let local = LocalCache::new(&store);

        assert!(local.read("nope", &opts()).await.unwrap().is_none());
        assert!(local.read("nope", &opts()).await.unwrap().is_none());
        assert!(!local.exist("nope", &opts()).await.unwrap());
        assert_eq!(client.reads(), 1);
    }

    #[tokio::test]
    async fn test_stored_null_is_not_missing() {
        let (store, _) = distributed();
        let local = LocalCache::new(&store);

        local.write("nil", Value::Null, &opts()).await.unwrap();
        assert_eq!(local.read("nil", &opts()).await.unwrap().unwrap(), Value::Null);
        assert!(local.exist("nil", &opts()).await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_serves_missing_locally() {
        let (store, client) = distributed();
        let local = LocalCache::new(&store);

        local.write("foo", json!("bar"), &opts()).await.unwrap();
        assert!(local.delete("foo", &opts()).await.unwrap());
        let calls = client.total_calls();

        assert!(local.read("foo", &opts()).await.unwrap().is_none());
        assert_eq!(client.total_calls(), calls);
        assert!(client.raw_value("foo").is_none());
    }

    #[tokio::test]
    async fn test_local_value_wins_over_external_flush() {
        let (store, client) = distributed();
        let local = LocalCache::new(&store);

        local.write("foo", json!("bar"), &opts()).await.unwrap();
        client.flush_all().await.unwrap();

        assert_eq!(local.read("foo", &opts()).await.unwrap().unwrap(), json!("bar"));
        assert!(store.read("foo", &opts()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_invalidate_rereads() {
        let (store, client) = distributed();
        let local = LocalCache::new(&store);

        local.write("foo", json!("bar"), &opts()).await.unwrap();
        client.put_raw("foo", br#""external""#.to_vec());
        assert_eq!(local.read("foo", &opts()).await.unwrap().unwrap(), json!("bar"));

        local.invalidate("foo", &opts());
        assert_eq!(
            local.read("foo", &opts()).await.unwrap().unwrap(),
            json!("external")
        );
    }

    #[tokio::test]
    async fn test_failed_write_leaves_local_state() {
        let (store, client) = distributed();
        let local = LocalCache::new(&store);

        local.write("foo", json!("old"), &opts()).await.unwrap();
        client.set_available(false);

        let err = local.write("foo", json!("new"), &opts()).await.unwrap_err();
        assert!(err.is_backend_failure());
        assert!(local.delete("foo", &opts()).await.is_err());

        assert_eq!(local.read("foo", &opts()).await.unwrap().unwrap(), json!("old"));
    }

    #[tokio::test]
    async fn test_failed_read_is_not_cached() {
        let (store, client) = distributed();
        store.write("foo", json!(1), &opts()).await.unwrap();
        let local = LocalCache::new(&store);

        client.set_available(false);
        assert!(local.read("foo", &opts()).await.is_err());
        client.set_available(true);

        assert_eq!(local.read("foo", &opts()).await.unwrap().unwrap(), json!(1));
    }

    #[tokio::test]
    async fn test_counters_go_through_and_update_local() {
        let (store, client) = distributed();
        let local = LocalCache::new(&store);
        let raw = CacheOptions::new().raw();

        local.write("count", json!(1), &raw).await.unwrap();
        assert_eq!(local.increment("count", 1, &opts()).await.unwrap(), 2);
        assert_eq!(local.increment("count", 1, &opts()).await.unwrap(), 3);
        assert_eq!(client.counter_ops(), 2);

        let reads = client.reads();
        assert_eq!(local.read("count", &raw).await.unwrap().unwrap(), json!("3"));
        assert_eq!(local.read("count", &opts()).await.unwrap().unwrap(), json!(3));
        assert_eq!(client.reads(), reads);
    }

    #[tokio::test]
    async fn test_declined_write_forgets_local_state() {
        let (store, _) = distributed();
        store.write("k", json!("theirs"), &opts()).await.unwrap();
        let local = LocalCache::new(&store);

        assert!(!local
            .write("k", json!("ours"), &CacheOptions::new().unless_exist())
            .await
            .unwrap());
        assert_eq!(local.read("k", &opts()).await.unwrap().unwrap(), json!("theirs"));
    }

    #[tokio::test]
    async fn test_local_values_are_frozen() {
        let store = MemoryStore::new();
        let local = LocalCache::new(&store);
        local.write("foo", json!("bar"), &opts()).await.unwrap();

        let mut value = local.read("foo", &opts()).await.unwrap().unwrap();
        assert!(matches!(value.make_mut(), Err(CacheError::ImmutableValue { .. })));
    }

    #[tokio::test]
    async fn test_read_multi_mixes_local_and_remote() {
        let (store, client) = distributed();
        store.write("remote", json!(2), &opts()).await.unwrap();
        let local = LocalCache::new(&store);
        local.write("local", json!(1), &opts()).await.unwrap();

        let found = local
            .read_multi(&["local", "remote", "absent"], &opts())
            .await
            .unwrap();
        assert_eq!(found.len(), 2);
        let reads = client.reads();

        assert!(local.read("absent", &opts()).await.unwrap().is_none());
        assert_eq!(local.read("remote", &opts()).await.unwrap().unwrap(), json!(2));
        assert_eq!(client.reads(), reads);
    }

    #[tokio::test]
    async fn test_clear_drops_local_map() {
        let store = MemoryStore::new();
        let local = LocalCache::new(&store);
        local.write("a", json!(1), &opts()).await.unwrap();

        local.clear().await.unwrap();
        assert_eq!(local.local_len(), 0);
        assert!(local.read("a", &opts()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_matched_marks_local_keys_missing() {
        let store = MemoryStore::new();
        let local = LocalCache::new(&store);
        local.write("views/1", json!(1), &opts()).await.unwrap();
        local.write("users/1", json!(2), &opts()).await.unwrap();

        assert_eq!(local.delete_matched("^views/", &opts()).await.unwrap(), 1);
        assert!(local.read("views/1", &opts()).await.unwrap().is_none());
        assert_eq!(local.read("users/1", &opts()).await.unwrap().unwrap(), json!(2));
    }

    #[tokio::test]
    async fn test_delete_matched_within_namespace() {
        let local = LocalCache::new(MemoryStore::new());
        let app = CacheOptions::new().namespace("app");

        local.write("views/1", json!(1), &app).await.unwrap();
        local.write("users/1", json!(2), &app).await.unwrap();

        assert_eq!(local.delete_matched("^views/", &app).await.unwrap(), 1);
        assert!(local.read("views/1", &app).await.unwrap().is_none());
        assert_eq!(local.read("users/1", &app).await.unwrap().unwrap(), json!(2));
    }

    #[tokio::test]
    async fn test_delete_matched_forgets_other_namespaces() {
        let memory = MemoryStore::new();
        let local = LocalCache::new(&memory);
        let app = CacheOptions::new().namespace("app");

        local.write("views/1", json!(1), &app).await.unwrap();
        assert_eq!(local.delete_matched("^views/", &opts()).await.unwrap(), 1);

        // memory keys ignore the namespace, so the entry is gone remotely too
        assert!(local.read("views/1", &app).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_exist_on_remote_key_reads_once() {
        let (store, client) = distributed();
        store.write("foo", json!("bar"), &opts()).await.unwrap();
        let local = LocalCache::new(&store);

        for _ in 0..3 {
            assert!(local.exist("foo", &opts()).await.unwrap());
        }
        assert_eq!(client.reads(), 1);

        assert_eq!(local.read("foo", &opts()).await.unwrap().unwrap(), json!("bar"));
        assert_eq!(client.reads(), 1);
    }

    #[tokio::test]
    async fn test_fetch_through_overlay() {
        let (store, client) = distributed();
        let local = LocalCache::new(&store);

        let value = local
            .fetch("computed", &opts(), || async { json!("fresh") })
            .await
            .unwrap();
        assert_eq!(value, json!("fresh"));
        assert!(client.raw_value("computed").is_some());

        let calls = client.total_calls();
        let value = local
            .fetch("computed", &opts(), || async { json!("recomputed") })
            .await
            .unwrap();
        assert_eq!(value, json!("fresh"));
        assert_eq!(client.total_calls(), calls);
    }
}
