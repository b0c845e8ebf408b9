//! Process-wide in-memory store

use async_trait::async_trait;
use parking_lot::RwLock;
use regex::Regex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::{
    cache::{CacheEntry, CacheStore},
    value::{decode_payload, parse_counter, raw_text},
    CacheOptions, CacheResult, CachedValue,
};

/// In-memory store shared by every clone
///
/// Values are moved in on write and handed out frozen on read, so callers
/// never hold a mutable alias of a stored entry.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: Arc<RwLock<HashMap<String, CacheEntry>>>,
    max_entries: Option<usize>,
}

impl MemoryStore {
    /// Create a new, unbounded memory store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store that refuses new keys once `max_entries` are live
    pub fn with_max_entries(max_entries: usize) -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::with_capacity(max_entries))),
            max_entries: Some(max_entries),
        }
    }

    /// Number of live entries
    pub fn len(&self) -> usize {
        self.entries
            .read()
            .values()
            .filter(|entry| !entry.is_expired())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn insert(&self, key: &str, entry: CacheEntry, unless_exist: bool) -> bool {
        let mut entries = self.entries.write();

        let live = entries.get(key).is_some_and(|existing| !existing.is_expired());
        if unless_exist && live {
            return false;
        }

        if let Some(max) = self.max_entries {
            if !live && entries.len() >= max {
                entries.retain(|_, entry| !entry.is_expired());
                if entries.len() >= max {
                    warn!(key, max_entries = max, "memory store full, write refused");
                    return false;
                }
            }
        }

        entries.insert(key.to_string(), entry);
        true
    }

    fn adjust(&self, key: &str, delta: i64, options: &CacheOptions) -> i64 {
        let mut entries = self.entries.write();
        let current = entries
            .get(key)
            .filter(|entry| !entry.is_expired())
            .map(|entry| raw_text(&entry.value));
        let value = parse_counter(key, current.as_deref()).saturating_add(delta);
        entries.insert(
            key.to_string(),
            CacheEntry::from_options(Value::String(value.to_string()), options).into_raw(),
        );
        value
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    async fn read(&self, key: &str, options: &CacheOptions) -> CacheResult<Option<CachedValue>> {
        debug!(key, "cache read");

        let found = {
            let entries = self.entries.read();
            match entries.get(key) {
                Some(entry) if !entry.is_expired() => {
                    Some((Arc::clone(&entry.value), entry.raw))
                }
                Some(_) => None,
                None => return Ok(None),
            }
        };

        let Some((value, stored_raw)) = found else {
            let mut entries = self.entries.write();
            if entries.get(key).is_some_and(CacheEntry::is_expired) {
                entries.remove(key);
            }
            return Ok(None);
        };

        if options.raw {
            return Ok(Some(CachedValue::frozen(
                key,
                Arc::new(Value::String(raw_text(&value))),
            )));
        }
        if stored_raw {
            let decoded = decode_payload(raw_text(&value).as_bytes(), false);
            return Ok(Some(CachedValue::frozen(key, Arc::new(decoded))));
        }
        Ok(Some(CachedValue::frozen(key, value)))
    }

    async fn write(&self, key: &str, value: Value, options: &CacheOptions) -> CacheResult<bool> {
        debug!(key, "cache write");
        let value = if options.raw {
            Value::String(raw_text(&value))
        } else {
            value
        };
        Ok(self.insert(key, CacheEntry::from_options(value, options), options.unless_exist))
    }

    async fn delete(&self, key: &str, _options: &CacheOptions) -> CacheResult<bool> {
        debug!(key, "cache delete");
        Ok(self
            .entries
            .write()
            .remove(key)
            .is_some_and(|entry| !entry.is_expired()))
    }

    async fn exist(&self, key: &str, _options: &CacheOptions) -> CacheResult<bool> {
        Ok(self
            .entries
            .read()
            .get(key)
            .is_some_and(|entry| !entry.is_expired()))
    }

    async fn increment(&self, key: &str, amount: i64, options: &CacheOptions) -> CacheResult<i64> {
        debug!(key, amount, "cache increment");
        Ok(self.adjust(key, amount, options))
    }

    async fn decrement(&self, key: &str, amount: i64, options: &CacheOptions) -> CacheResult<i64> {
        debug!(key, amount, "cache decrement");
        Ok(self.adjust(key, amount.saturating_neg(), options))
    }

    async fn clear(&self) -> CacheResult<()> {
        let mut entries = self.entries.write();
        debug!(count = entries.len(), "cache clear");
        entries.clear();
        Ok(())
    }

    async fn delete_matched(&self, pattern: &str, _options: &CacheOptions) -> CacheResult<usize> {
        let matcher = Regex::new(pattern)?;
        let mut entries = self.entries.write();
        let mut deleted = 0;
        entries.retain(|key, entry| {
            if entry.is_expired() {
                return false;
            }
            if matcher.is_match(key) {
                deleted += 1;
                return false;
            }
            true
        });
        debug!(pattern, deleted, "cache delete matched");
        Ok(deleted)
    }
}
