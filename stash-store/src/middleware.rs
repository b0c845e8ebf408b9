//! Per-unit-of-work local cache scopes
//!
//! Request handling code (an HTTP middleware, a job runner) calls
//! [`LocalCacheMiddleware::begin_scope`] before the work and
//! [`LocalCacheMiddleware::end_scope`] after it, or lets
//! [`LocalCacheMiddleware::scoped`] do both. Each scope owns a fresh
//! [`LocalCache`]; ending it only discards the local map.

use std::future::Future;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::{cache::CacheStore, local_cache::LocalCache};

/// Hands out one [`LocalCache`] per unit of work around a shared store
#[derive(Debug)]
pub struct LocalCacheMiddleware<S> {
    store: Arc<S>,
}

impl<S> Clone for LocalCacheMiddleware<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: CacheStore> LocalCacheMiddleware<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// The shared store every scope writes through to
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Start a unit of work with an empty local cache
    pub fn begin_scope(&self) -> LocalCache<Arc<S>> {
        LocalCache::new(Arc::clone(&self.store))
    }

    /// Finish a unit of work; nothing is sent to the store
    pub fn end_scope(&self, scope: LocalCache<Arc<S>>) {
        scope.into_inner();
    }

    /// Run `work` inside a fresh scope and discard the scope afterwards
    pub async fn scoped<F, Fut, T>(&self, work: F) -> T
    where
        F: FnOnce(Arc<LocalCache<Arc<S>>>) -> Fut,
        Fut: Future<Output = T>,
    {
        let scope = Arc::new(self.begin_scope());
        let output = work(Arc::clone(&scope)).await;

        match Arc::try_unwrap(scope) {
            Ok(scope) => self.end_scope(scope),
            Err(leaked) => {
                warn!(
                    holders = Arc::strong_count(&leaked),
                    "local cache scope outlived its unit of work"
                );
                debug!(known_keys = leaked.local_len(), "local cache scope abandoned");
            }
        }
        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stores::DistributedStore;
    use crate::testing::MemoryClient;
    use crate::CacheOptions;
    use serde_json::json;

    fn middleware() -> (LocalCacheMiddleware<DistributedStore>, Arc<MemoryClient>) {
        let client = Arc::new(MemoryClient::new(vec!["localhost:11211".to_string()]));
        let store = Arc::new(DistributedStore::new(client.clone()));
        (LocalCacheMiddleware::new(store), client)
    }

    #[tokio::test]
    async fn test_scopes_do_not_share_local_state() {
        let (middleware, client) = middleware();
        let opts = CacheOptions::default();

        let first = middleware.begin_scope();
        first.write("foo", json!("bar"), &opts).await.unwrap();
        assert_eq!(first.read("foo", &opts).await.unwrap().unwrap(), json!("bar"));
        middleware.end_scope(first);

        client.put_raw("foo", br#""external""#.to_vec());

        let second = middleware.begin_scope();
        assert_eq!(
            second.read("foo", &opts).await.unwrap().unwrap(),
            json!("external")
        );
        assert_eq!(second.local_len(), 1);
    }

    #[tokio::test]
    async fn test_scoped_runs_work_in_fresh_scope() {
        let (middleware, client) = middleware();

        let value = middleware
            .scoped(|cache| async move {
                let opts = CacheOptions::default();
                cache.write("greeting", json!("hello"), &opts).await.unwrap();
                cache.read("greeting", &opts).await.unwrap().unwrap().into_value()
            })
            .await;

        assert_eq!(value, json!("hello"));
        assert_eq!(client.reads(), 0);
        assert_eq!(client.raw_value("greeting").unwrap(), br#""hello""#.to_vec());
    }
}
