//! Canonical cache key expansion
//!
//! Structured keys (namespaces, record ids, flags, nested lists) are turned
//! into one `/`-joined string. Every backend keys its storage by the result,
//! so equal logical keys always address the same entry.

use std::fmt;

/// One component of a structured cache key
#[derive(Debug, Clone, PartialEq)]
pub enum KeyPart {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    List(Vec<KeyPart>),
}

impl KeyPart {
    /// Canonical string form of this component
    pub fn to_param(&self) -> String {
        match self {
            KeyPart::Str(s) => s.clone(),
            KeyPart::Int(i) => i.to_string(),
            KeyPart::Float(f) => f.to_string(),
            KeyPart::Bool(b) => b.to_string(),
            KeyPart::List(parts) => parts
                .iter()
                .map(KeyPart::to_param)
                .collect::<Vec<_>>()
                .join("/"),
        }
    }
}

impl fmt::Display for KeyPart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_param())
    }
}

impl From<&str> for KeyPart {
    fn from(value: &str) -> Self {
        KeyPart::Str(value.to_string())
    }
}

impl From<String> for KeyPart {
    fn from(value: String) -> Self {
        KeyPart::Str(value)
    }
}

impl From<&String> for KeyPart {
    fn from(value: &String) -> Self {
        KeyPart::Str(value.clone())
    }
}

impl From<bool> for KeyPart {
    fn from(value: bool) -> Self {
        KeyPart::Bool(value)
    }
}

impl From<f64> for KeyPart {
    fn from(value: f64) -> Self {
        KeyPart::Float(value)
    }
}

macro_rules! key_part_from_int {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for KeyPart {
                fn from(value: $ty) -> Self {
                    KeyPart::Int(i64::from(value))
                }
            }
        )*
    };
}

key_part_from_int!(i8, i16, i32, i64, u8, u16, u32);

impl<T: Into<KeyPart>> From<Vec<T>> for KeyPart {
    fn from(value: Vec<T>) -> Self {
        KeyPart::List(value.into_iter().map(Into::into).collect())
    }
}

/// Build a list key from heterogeneous components
///
/// ```
/// use stash_store::{cache_key, expand_cache_key};
///
/// let key = cache_key![1, "2", true];
/// assert_eq!(expand_cache_key(&key, Some("name")), "name/1/2/true");
/// ```
#[macro_export]
macro_rules! cache_key {
    ($($part:expr),* $(,)?) => {
        $crate::KeyPart::List(vec![$($crate::KeyPart::from($part)),*])
    };
}

/// Expand a structured key into its canonical string, optionally prefixed
/// with `namespace/`
pub fn expand_cache_key(key: &KeyPart, namespace: Option<&str>) -> String {
    let expanded = key.to_param();
    match namespace {
        Some(namespace) => format!("{}/{}", namespace, expanded),
        None => expanded,
    }
}
