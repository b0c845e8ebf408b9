//! Store backed by a networked cache service
//!
//! Values cross the wire serialized unless `raw` is set. Keys are prefixed
//! with the namespace (`namespace:key`), have control characters, spaces and
//! `%` percent-escaped, and are shortened with a digest suffix when longer
//! than the service accepts.
//!
//! Counters use the service's atomic increment and decrement and are
//! therefore unsigned: decrementing floors at zero.

use async_trait::async_trait;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::{
    cache::CacheStore,
    client::CacheClient,
    value::{decode_payload, encode_payload},
    CacheError, CacheOptions, CacheResult, CachedValue,
};

/// Longest key the service accepts
pub const MAX_KEY_LENGTH: usize = 250;

const DIGEST_MARKER: &str = ":sha256:";

/// Store delegating every operation to a [`CacheClient`]
#[derive(Debug, Clone)]
pub struct DistributedStore {
    client: Arc<dyn CacheClient>,
    namespace: Option<String>,
    default_ttl: Option<Duration>,
}

impl DistributedStore {
    pub fn new(client: Arc<dyn CacheClient>) -> Self {
        Self {
            client,
            namespace: None,
            default_ttl: None,
        }
    }

    /// Prefix every key with `namespace:`
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    /// TTL for writes that carry no `expires_in`
    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = Some(ttl);
        self
    }

    /// Server addresses of the underlying client
    pub fn servers(&self) -> &[String] {
        self.client.servers()
    }

    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    /// Key as sent to the service
    pub fn wire_key(&self, key: &str, options: &CacheOptions) -> String {
        let namespaced = match options.namespace.as_deref().or(self.namespace.as_deref()) {
            Some(namespace) => format!("{}:{}", namespace, key),
            None => key.to_string(),
        };
        shorten_key(escape_key(&namespaced))
    }

    fn ttl(&self, options: &CacheOptions) -> Option<Duration> {
        options.expires_in.or(self.default_ttl)
    }

    async fn adjust(&self, key: &str, delta: i64, options: &CacheOptions) -> CacheResult<i64> {
        let wire_key = self.wire_key(key, options);
        if let Some(value) = self.apply_delta(&wire_key, delta).await? {
            return Ok(value);
        }

        // Missing counters start from zero.
        let initial = delta.max(0);
        let created = self
            .client
            .add(&wire_key, initial.to_string().into_bytes(), self.ttl(options))
            .await?;
        if created {
            return Ok(initial);
        }

        // Another writer created the key between our two calls.
        self.apply_delta(&wire_key, delta).await?.ok_or_else(|| {
            CacheError::backend(format!("counter '{}' disappeared during update", key))
        })
    }

    async fn apply_delta(&self, wire_key: &str, delta: i64) -> CacheResult<Option<i64>> {
        let amount = delta.unsigned_abs();
        let value = if delta >= 0 {
            self.client.incr(wire_key, amount).await?
        } else {
            self.client.decr(wire_key, amount).await?
        };
        Ok(value.map(|v| i64::try_from(v).unwrap_or(i64::MAX)))
    }
}

fn escape_key(key: &str) -> String {
    let mut escaped = String::with_capacity(key.len());
    for ch in key.chars() {
        if ch.is_ascii_control() || ch == ' ' || ch == '%' {
            escaped.push_str(&format!("%{:02X}", ch as u32));
        } else {
            escaped.push(ch);
        }
    }
    escaped
}

fn shorten_key(key: String) -> String {
    if key.len() <= MAX_KEY_LENGTH {
        return key;
    }
    let digest = hex::encode(Sha256::digest(key.as_bytes()));
    let mut keep = MAX_KEY_LENGTH - DIGEST_MARKER.len() - digest.len();
    while !key.is_char_boundary(keep) {
        keep -= 1;
    }
    format!("{}{}{}", &key[..keep], DIGEST_MARKER, digest)
}

#[async_trait]
impl CacheStore for DistributedStore {
    fn backend_name(&self) -> &'static str {
        "distributed"
    }

    async fn read(&self, key: &str, options: &CacheOptions) -> CacheResult<Option<CachedValue>> {
        debug!(key, "cache read");
        let payload = self.client.get(&self.wire_key(key, options)).await?;
        Ok(payload.map(|bytes| CachedValue::new(key, decode_payload(&bytes, options.raw))))
    }

    async fn write(&self, key: &str, value: Value, options: &CacheOptions) -> CacheResult<bool> {
        debug!(key, "cache write");
        let wire_key = self.wire_key(key, options);
        let payload = encode_payload(&value, options.raw)?;
        let ttl = self.ttl(options);

        if options.unless_exist {
            return self.client.add(&wire_key, payload, ttl).await;
        }
        self.client.set(&wire_key, payload, ttl).await?;
        Ok(true)
    }

    async fn delete(&self, key: &str, options: &CacheOptions) -> CacheResult<bool> {
        debug!(key, "cache delete");
        self.client.delete(&self.wire_key(key, options)).await
    }

    async fn increment(&self, key: &str, amount: i64, options: &CacheOptions) -> CacheResult<i64> {
        debug!(key, amount, "cache increment");
        self.adjust(key, amount, options).await
    }

    async fn decrement(&self, key: &str, amount: i64, options: &CacheOptions) -> CacheResult<i64> {
        debug!(key, amount, "cache decrement");
        self.adjust(key, amount.saturating_neg(), options).await
    }

    async fn clear(&self) -> CacheResult<()> {
        debug!(servers = ?self.servers(), "cache flush");
        self.client.flush_all().await
    }

    async fn delete_matched(&self, _pattern: &str, _options: &CacheOptions) -> CacheResult<usize> {
        Err(CacheError::Unsupported {
            backend: "distributed",
            operation: "delete_matched",
        })
    }

    async fn read_multi(
        &self,
        keys: &[&str],
        options: &CacheOptions,
    ) -> CacheResult<HashMap<String, CachedValue>> {
        let wire_keys: HashMap<String, &str> = keys
            .iter()
            .map(|key| (self.wire_key(key, options), *key))
            .collect();
        let request: Vec<String> = wire_keys.keys().cloned().collect();

        let found = self.client.get_multi(&request).await?;
        Ok(found
            .into_iter()
            .filter_map(|(wire_key, bytes)| {
                let key = *wire_keys.get(&wire_key)?;
                Some((
                    key.to_string(),
                    CachedValue::new(key, decode_payload(&bytes, options.raw)),
                ))
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MemoryClient;
    use serde_json::json;

    fn store() -> (DistributedStore, Arc<MemoryClient>) {
        let client = Arc::new(MemoryClient::new(vec!["localhost:11211".to_string()]));
        (DistributedStore::new(client.clone()), client)
    }

    fn opts() -> CacheOptions {
        CacheOptions::default()
    }

    #[test]
    fn test_wire_key_namespacing() {
        let (store, _) = store();
        assert_eq!(store.wire_key("foo", &opts()), "foo");

        let store = store.with_namespace("app");
        assert_eq!(store.wire_key("foo", &opts()), "app:foo");
        assert_eq!(
            store.wire_key("foo", &CacheOptions::new().namespace("other")),
            "other:foo"
        );
    }

    #[test]
    fn test_wire_key_escaping_and_length() {
        let (store, _) = store();
        assert_eq!(store.wire_key("a b%c\n", &opts()), "a%20b%25c%0A");

        let long = "x".repeat(400);
        let wire = store.wire_key(&long, &opts());
        assert_eq!(wire.len(), MAX_KEY_LENGTH);
        assert!(wire.contains(DIGEST_MARKER));
        assert_ne!(wire, store.wire_key(&"x".repeat(401), &opts()));
    }

    #[tokio::test]
    async fn test_values_are_serialized_on_the_wire() {
        let (store, client) = store();
        store.write("doc", json!({"a": 1}), &opts()).await.unwrap();
        assert_eq!(client.raw_value("doc").unwrap(), br#"{"a":1}"#.to_vec());

        store.write("n", json!(7), &CacheOptions::new().raw()).await.unwrap();
        assert_eq!(client.raw_value("n").unwrap(), b"7".to_vec());

        let value = store.read("doc", &opts()).await.unwrap().unwrap();
        assert_eq!(value, json!({"a": 1}));
    }

    #[tokio::test]
    async fn test_unless_exist_uses_add() {
        let (store, _) = store();
        let add = CacheOptions::new().unless_exist();
        assert!(store.write("k", json!(1), &add).await.unwrap());
        assert!(!store.write("k", json!(2), &add).await.unwrap());
        assert_eq!(store.read("k", &opts()).await.unwrap().unwrap(), json!(1));
    }

    #[tokio::test]
    async fn test_counters_use_atomic_ops() {
        let (store, client) = store();
        assert_eq!(store.increment("missing", 3, &opts()).await.unwrap(), 3);
        assert_eq!(store.decrement("missing", 5, &opts()).await.unwrap(), 0);
        assert_eq!(store.decrement("other", 1, &opts()).await.unwrap(), 0);
        assert!(client.counter_ops() >= 3);
    }

    #[tokio::test]
    async fn test_read_multi_maps_namespaced_keys_back() {
        let (store, _) = store();
        let store = store.with_namespace("app");
        store.write("a", json!(1), &opts()).await.unwrap();
        store.write("b", json!(2), &opts()).await.unwrap();

        let found = store.read_multi(&["a", "b", "c"], &opts()).await.unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(found["a"], json!(1));
        assert_eq!(found["b"], json!(2));
    }

    #[tokio::test]
    async fn test_delete_matched_is_unsupported() {
        let (store, _) = store();
        assert!(matches!(
            store.delete_matched(".*", &opts()).await,
            Err(CacheError::Unsupported { .. })
        ));
    }

    #[tokio::test]
    async fn test_client_failures_propagate() {
        let (store, client) = store();
        client.set_available(false);
        let err = store.write("k", json!(1), &opts()).await.unwrap_err();
        assert!(err.is_backend_failure());
        assert!(store.read("k", &opts()).await.is_err());
    }
}
