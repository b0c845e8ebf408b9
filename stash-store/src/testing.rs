//! Test doubles
//!
//! [`MemoryClient`] stands in for a networked cache service. It keeps its data
//! in process, counts every call that would have crossed the network, and can
//! be switched to a failing state to exercise error propagation.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use crate::{client::CacheClient, value::parse_counter, CacheError, CacheResult};

#[derive(Debug)]
struct Stored {
    bytes: Vec<u8>,
    expires_at: Option<Instant>,
}

impl Stored {
    fn new(bytes: Vec<u8>, ttl: Option<Duration>) -> Self {
        Self {
            bytes,
            expires_at: ttl.map(|ttl| Instant::now() + ttl),
        }
    }

    fn is_live(&self) -> bool {
        self.expires_at.is_none_or(|at| Instant::now() <= at)
    }
}

/// In-process fake of a distributed cache service
#[derive(Debug)]
pub struct MemoryClient {
    servers: Vec<String>,
    data: Mutex<HashMap<String, Stored>>,
    available: AtomicBool,
    reads: AtomicUsize,
    writes: AtomicUsize,
    deletes: AtomicUsize,
    counter_ops: AtomicUsize,
    flushes: AtomicUsize,
}

impl MemoryClient {
    pub fn new(servers: Vec<String>) -> Self {
        Self {
            servers,
            data: Mutex::new(HashMap::new()),
            available: AtomicBool::new(true),
            reads: AtomicUsize::new(0),
            writes: AtomicUsize::new(0),
            deletes: AtomicUsize::new(0),
            counter_ops: AtomicUsize::new(0),
            flushes: AtomicUsize::new(0),
        }
    }

    /// Make every subsequent call fail (or succeed again)
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Bytes stored under a wire key, bypassing the call counters
    pub fn raw_value(&self, key: &str) -> Option<Vec<u8>> {
        self.data
            .lock()
            .get(key)
            .filter(|stored| stored.is_live())
            .map(|stored| stored.bytes.clone())
    }

    /// Store bytes directly, as another process would
    pub fn put_raw(&self, key: &str, bytes: impl Into<Vec<u8>>) {
        self.data
            .lock()
            .insert(key.to_string(), Stored::new(bytes.into(), None));
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn deletes(&self) -> usize {
        self.deletes.load(Ordering::SeqCst)
    }

    pub fn counter_ops(&self) -> usize {
        self.counter_ops.load(Ordering::SeqCst)
    }

    pub fn flushes(&self) -> usize {
        self.flushes.load(Ordering::SeqCst)
    }

    /// Every call that reached the service
    pub fn total_calls(&self) -> usize {
        self.reads() + self.writes() + self.deletes() + self.counter_ops() + self.flushes()
    }

    fn check(&self, counter: &AtomicUsize) -> CacheResult<()> {
        counter.fetch_add(1, Ordering::SeqCst);
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(CacheError::backend(format!(
                "no server available among {:?}",
                self.servers
            )))
        }
    }

    fn apply(&self, key: &str, delta: i64) -> Option<u64> {
        let mut data = self.data.lock();
        let stored = data.get_mut(key).filter(|stored| stored.is_live())?;
        let text = String::from_utf8_lossy(&stored.bytes).into_owned();
        let current = parse_counter(key, Some(&text));
        let next = u64::try_from(current.saturating_add(delta).max(0)).unwrap_or(0);
        stored.bytes = next.to_string().into_bytes();
        Some(next)
    }
}

#[async_trait]
impl CacheClient for MemoryClient {
    fn servers(&self) -> &[String] {
        &self.servers
    }

    async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>> {
        self.check(&self.reads)?;
        Ok(self.raw_value(key))
    }

    async fn get_multi(&self, keys: &[String]) -> CacheResult<HashMap<String, Vec<u8>>> {
        self.check(&self.reads)?;
        Ok(keys
            .iter()
            .filter_map(|key| Some((key.clone(), self.raw_value(key)?)))
            .collect())
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> CacheResult<()> {
        self.check(&self.writes)?;
        self.data.lock().insert(key.to_string(), Stored::new(value, ttl));
        Ok(())
    }

    async fn add(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> CacheResult<bool> {
        self.check(&self.writes)?;
        let mut data = self.data.lock();
        if data.get(key).is_some_and(Stored::is_live) {
            return Ok(false);
        }
        data.insert(key.to_string(), Stored::new(value, ttl));
        Ok(true)
    }

    async fn delete(&self, key: &str) -> CacheResult<bool> {
        self.check(&self.deletes)?;
        Ok(self
            .data
            .lock()
            .remove(key)
            .is_some_and(|stored| stored.is_live()))
    }

    async fn incr(&self, key: &str, amount: u64) -> CacheResult<Option<u64>> {
        self.check(&self.counter_ops)?;
        Ok(self.apply(key, i64::try_from(amount).unwrap_or(i64::MAX)))
    }

    async fn decr(&self, key: &str, amount: u64) -> CacheResult<Option<u64>> {
        self.check(&self.counter_ops)?;
        Ok(self.apply(key, -i64::try_from(amount).unwrap_or(i64::MAX)))
    }

    async fn flush_all(&self) -> CacheResult<()> {
        self.check(&self.flushes)?;
        self.data.lock().clear();
        Ok(())
    }
}
