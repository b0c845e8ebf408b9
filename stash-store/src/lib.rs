//! Cache stores behind one contract
//!
//! This crate provides a uniform read/write/delete/counter interface over
//! three storage media, plus a scoped local cache for the networked one:
//!
//! - [`MemoryStore`]: a process-wide map that hands out frozen values
//! - [`FileStore`]: one file per key under a root directory
//! - [`DistributedStore`]: a networked cache service reached through a
//!   [`CacheClient`]
//! - [`LocalCache`]: a per-request overlay that serves repeated reads from
//!   memory while writing every change through
//!
//! ```
//! use serde_json::json;
//! use stash_store::{CacheOptions, CacheStore, LocalCache, MemoryStore};
//!
//! # async fn example() -> stash_store::CacheResult<()> {
//! let store = MemoryStore::new();
//! let local = LocalCache::new(&store);
//!
//! local.write("greeting", json!("hello"), &CacheOptions::default()).await?;
//! let value = local.read("greeting", &CacheOptions::default()).await?;
//! assert_eq!(value.unwrap(), json!("hello"));
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod client;
pub mod errors;
pub mod key;
pub mod local_cache;
pub mod middleware;
pub mod options;
pub mod registry;
pub mod stores;
pub mod value;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use cache::{CacheEntry, CacheStore};
pub use client::CacheClient;
pub use errors::{CacheError, CacheResult};
pub use key::{expand_cache_key, KeyPart};
pub use local_cache::LocalCache;
pub use middleware::LocalCacheMiddleware;
pub use options::CacheOptions;
pub use registry::{Store, StoreSource};
pub use stores::{DistributedStore, FileStore, MemoryStore};
pub use value::{raw_text, CachedValue};
