//! Values handed in and out of stores
//!
//! Stores accept `serde_json::Value`s and hand back [`CachedValue`]s. A value
//! read from the memory store is *frozen*: it shares its allocation with the
//! stored entry, so any attempt to mutate it in place is refused with
//! [`CacheError::ImmutableValue`] instead of corrupting the entry. Values
//! decoded from files or the network are fresh copies and can be mutated.

use serde::de::DeserializeOwned;
use serde_json::Value;
use std::ops::Deref;
use std::sync::Arc;

use crate::{CacheError, CacheResult};

/// A value returned by a store read
#[derive(Debug, Clone)]
pub struct CachedValue {
    key: String,
    value: Arc<Value>,
    frozen: bool,
}

impl CachedValue {
    /// A fresh, mutable value
    pub fn new(key: impl Into<String>, value: Value) -> Self {
        Self {
            key: key.into(),
            value: Arc::new(value),
            frozen: false,
        }
    }

    /// A read-only view sharing storage with a cache entry
    pub(crate) fn frozen(key: impl Into<String>, value: Arc<Value>) -> Self {
        Self {
            key: key.into(),
            value,
            frozen: true,
        }
    }

    /// The same value, refusing mutation from now on
    pub(crate) fn freeze(mut self) -> Self {
        self.frozen = true;
        self
    }

    /// Storage shared with this view
    pub(crate) fn shared(&self) -> Arc<Value> {
        Arc::clone(&self.value)
    }

    /// Key this value was read from
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Whether in-place mutation is refused
    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// Borrow the underlying value
    pub fn as_value(&self) -> &Value {
        &self.value
    }

    /// Mutable access to the value, refused for frozen values
    pub fn make_mut(&mut self) -> CacheResult<&mut Value> {
        if self.frozen {
            return Err(CacheError::ImmutableValue {
                key: self.key.clone(),
            });
        }
        Ok(Arc::make_mut(&mut self.value))
    }

    /// Take an owned copy of the value; never aliases the stored entry
    pub fn into_value(self) -> Value {
        Arc::try_unwrap(self.value).unwrap_or_else(|shared| (*shared).clone())
    }

    /// Deserialize the value into a concrete type
    pub fn deserialize<T: DeserializeOwned>(&self) -> CacheResult<T> {
        Ok(T::deserialize(self.value.as_ref())?)
    }
}

impl Deref for CachedValue {
    type Target = Value;

    fn deref(&self) -> &Self::Target {
        &self.value
    }
}

impl PartialEq for CachedValue {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
    }
}

impl PartialEq<Value> for CachedValue {
    fn eq(&self, other: &Value) -> bool {
        self.value.as_ref() == other
    }
}

impl PartialEq<&str> for CachedValue {
    fn eq(&self, other: &&str) -> bool {
        self.value.as_str() == Some(*other)
    }
}

/// Direct string form of a value, used for raw writes and counters
pub fn raw_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Parse a raw counter payload, treating anything unparseable as 0
pub(crate) fn parse_counter(key: &str, raw: Option<&str>) -> i64 {
    let Some(raw) = raw else {
        return 0;
    };
    match raw.trim().parse::<i64>() {
        Ok(n) => n,
        Err(_) => {
            tracing::warn!(key, raw, "counter value is not an integer, treating as 0");
            0
        }
    }
}

/// Encode a value into the bytes stored on disk or sent over the wire
pub(crate) fn encode_payload(value: &Value, raw: bool) -> CacheResult<Vec<u8>> {
    if raw {
        Ok(raw_text(value).into_bytes())
    } else {
        Ok(serde_json::to_vec(value)?)
    }
}

/// Decode stored bytes back into a value
///
/// A raw read yields the payload text. A regular read of a payload that was
/// written raw (and so is not a serialized value) falls back to the text too.
pub(crate) fn decode_payload(bytes: &[u8], raw: bool) -> Value {
    if !raw {
        if let Ok(value) = serde_json::from_slice(bytes) {
            return value;
        }
    }
    Value::String(String::from_utf8_lossy(bytes).into_owned())
}
