//! File-backed store
//!
//! Each key maps to one file beneath the cache root: `/` in a key becomes a
//! directory separator and the last segment gets a `.cache` extension, so
//! `views/home` lives at `<root>/views/home.cache`. Writes go to a temporary
//! sibling first and are renamed into place, so readers never see a partial
//! file.

use async_trait::async_trait;
use regex::Regex;
use serde_json::Value;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use tokio::fs;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::{
    cache::CacheStore,
    value::{decode_payload, encode_payload, parse_counter},
    CacheOptions, CacheResult, CachedValue,
};

const EXTENSION: &str = ".cache";

/// Store persisting one file per key under a root directory
#[derive(Debug, Clone)]
pub struct FileStore {
    cache_path: PathBuf,
}

impl FileStore {
    /// Create a store rooted at `cache_path`; the directory is created lazily
    pub fn new(cache_path: impl Into<PathBuf>) -> Self {
        Self {
            cache_path: cache_path.into(),
        }
    }

    /// Root directory of the store
    pub fn cache_path(&self) -> &Path {
        &self.cache_path
    }

    /// Path of the file holding `key`
    pub fn key_file_path(&self, key: &str) -> PathBuf {
        let mut path = self.cache_path.clone();
        let segments: Vec<String> = key.split('/').map(escape_segment).collect();
        if let Some((last, dirs)) = segments.split_last() {
            for dir in dirs {
                path.push(dir);
            }
            path.push(format!("{}{}", last, EXTENSION));
        }
        path
    }

    /// Recover the key stored at `path`, if it is a cache file of this store
    fn file_path_key(&self, path: &Path) -> Option<String> {
        let relative = path.strip_prefix(&self.cache_path).ok()?;
        let mut segments = Vec::new();
        for component in relative.components() {
            let Component::Normal(segment) = component else {
                return None;
            };
            segments.push(segment.to_str()?.to_string());
        }
        let last = segments.pop()?;
        segments.push(last.strip_suffix(EXTENSION)?.to_string());
        Some(
            segments
                .iter()
                .map(|segment| unescape_segment(segment))
                .collect::<Vec<_>>()
                .join("/"),
        )
    }

    async fn read_payload(&self, key: &str) -> CacheResult<Option<Vec<u8>>> {
        match fs::read(self.key_file_path(key)).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn write_payload(&self, key: &str, payload: &[u8]) -> CacheResult<()> {
        let path = self.key_file_path(key);
        let parent = path.parent().unwrap_or(self.cache_path.as_path());
        fs::create_dir_all(parent).await?;

        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let temp_path = parent.join(format!(".{}.{}.tmp", file_name, uuid::Uuid::new_v4()));

        if let Err(e) = fs::write(&temp_path, payload).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(e.into());
        }
        if let Err(e) = fs::rename(&temp_path, &path).await {
            warn!(key, error = %e, "failed to move cache file into place");
            let _ = fs::remove_file(&temp_path).await;
            return Err(e.into());
        }
        Ok(())
    }

    async fn remove_key_file(&self, key: &str) -> CacheResult<bool> {
        let path = self.key_file_path(key);
        match fs::remove_file(&path).await {
            Ok(()) => {
                self.prune_empty_dirs(&path).await;
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Remove now-empty directories between a deleted file and the root
    async fn prune_empty_dirs(&self, path: &Path) {
        let mut dir = path.parent();
        while let Some(current) = dir {
            if current == self.cache_path || !current.starts_with(&self.cache_path) {
                break;
            }
            if fs::remove_dir(current).await.is_err() {
                break;
            }
            dir = current.parent();
        }
    }

    async fn adjust(&self, key: &str, delta: i64) -> CacheResult<i64> {
        let current = self
            .read_payload(key)
            .await?
            .map(|bytes| String::from_utf8_lossy(&bytes).into_owned());
        let value = parse_counter(key, current.as_deref()).saturating_add(delta);
        self.write_payload(key, value.to_string().as_bytes()).await?;
        Ok(value)
    }
}

fn escape_segment(segment: &str) -> String {
    match segment {
        "" => "%".to_string(),
        "." => "%2E".to_string(),
        ".." => "%2E%2E".to_string(),
        _ => segment
            .replace('%', "%25")
            .replace(['?', ':'], ".")
            .replace('\\', "%5C"),
    }
}

fn unescape_segment(segment: &str) -> String {
    match segment {
        "%" => String::new(),
        "%2E" => ".".to_string(),
        "%2E%2E" => "..".to_string(),
        _ => segment.replace("%5C", "\\").replace("%25", "%"),
    }
}

#[async_trait]
impl CacheStore for FileStore {
    fn backend_name(&self) -> &'static str {
        "file"
    }

    async fn read(&self, key: &str, options: &CacheOptions) -> CacheResult<Option<CachedValue>> {
        debug!(key, "cache read");
        Ok(self
            .read_payload(key)
            .await?
            .map(|bytes| CachedValue::new(key, decode_payload(&bytes, options.raw))))
    }

    async fn write(&self, key: &str, value: Value, options: &CacheOptions) -> CacheResult<bool> {
        debug!(key, "cache write");
        if options.unless_exist && fs::try_exists(self.key_file_path(key)).await? {
            return Ok(false);
        }
        let payload = encode_payload(&value, options.raw)?;
        self.write_payload(key, &payload).await?;
        Ok(true)
    }

    async fn delete(&self, key: &str, _options: &CacheOptions) -> CacheResult<bool> {
        debug!(key, "cache delete");
        self.remove_key_file(key).await
    }

    async fn exist(&self, key: &str, _options: &CacheOptions) -> CacheResult<bool> {
        Ok(fs::try_exists(self.key_file_path(key)).await?)
    }

    async fn increment(&self, key: &str, amount: i64, _options: &CacheOptions) -> CacheResult<i64> {
        debug!(key, amount, "cache increment");
        self.adjust(key, amount).await
    }

    async fn decrement(&self, key: &str, amount: i64, _options: &CacheOptions) -> CacheResult<i64> {
        debug!(key, amount, "cache decrement");
        self.adjust(key, amount.saturating_neg()).await
    }

    async fn clear(&self) -> CacheResult<()> {
        debug!(path = %self.cache_path.display(), "cache clear");
        let mut entries = match fs::read_dir(&self.cache_path).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if entry.file_type().await?.is_dir() {
                fs::remove_dir_all(&path).await?;
            } else {
                fs::remove_file(&path).await?;
            }
        }
        Ok(())
    }

    async fn delete_matched(&self, pattern: &str, _options: &CacheOptions) -> CacheResult<usize> {
        let matcher = Regex::new(pattern)?;

        let keys: Vec<String> = WalkDir::new(&self.cache_path)
            .into_iter()
            .filter_map(Result::ok)
            .filter(|entry| entry.file_type().is_file())
            .filter_map(|entry| self.file_path_key(entry.path()))
            .filter(|key| matcher.is_match(key))
            .collect();

        let mut deleted = 0;
        for key in &keys {
            if self.remove_key_file(key).await? {
                deleted += 1;
            }
        }
        debug!(pattern, deleted, "cache delete matched");
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn opts() -> CacheOptions {
        CacheOptions::default()
    }

    #[test]
    fn test_key_file_path() {
        let store = FileStore::new("/cache");
        assert_eq!(store.key_file_path("foo"), PathBuf::from("/cache/foo.cache"));
        assert_eq!(
            store.key_file_path("views/home"),
            PathBuf::from("/cache/views/home.cache")
        );
        assert_eq!(
            store.key_file_path("a?b:c"),
            PathBuf::from("/cache/a.b.c.cache")
        );
        assert_eq!(
            store.key_file_path("../../etc/passwd"),
            PathBuf::from("/cache/%2E%2E/%2E%2E/etc/passwd.cache")
        );
    }

    #[test]
    fn test_file_path_key_round_trip() {
        let store = FileStore::new("/cache");
        for key in ["foo", "views/home", "../up", "100%/done", "a//b"] {
            let path = store.key_file_path(key);
            assert_eq!(store.file_path_key(&path).as_deref(), Some(key));
        }
        assert_eq!(store.file_path_key(Path::new("/cache/.foo.cache.tmp")), None);
    }

    #[tokio::test]
    async fn test_write_creates_directories() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::new(dir.path().join("nested"));

        store.write("views/home", json!({"title": "Home"}), &opts()).await.unwrap();
        assert!(dir.path().join("nested/views/home.cache").is_file());

        let value = store.read("views/home", &opts()).await.unwrap().unwrap();
        assert_eq!(value, json!({"title": "Home"}));
        assert!(!value.is_frozen());
    }

    #[tokio::test]
    async fn test_no_temp_files_left_behind() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::new(dir.path());
        store.write("foo", json!("bar"), &opts()).await.unwrap();
        store.write("foo", json!("baz"), &opts()).await.unwrap();

        let names: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["foo.cache".to_string()]);
    }

    #[tokio::test]
    async fn test_delete_prunes_empty_directories() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::new(dir.path());
        store.write("a/b/c", json!(1), &opts()).await.unwrap();

        assert!(store.delete("a/b/c", &opts()).await.unwrap());
        assert!(!dir.path().join("a").exists());
        assert!(dir.path().exists());
        assert!(!store.delete("a/b/c", &opts()).await.unwrap());
    }

    #[tokio::test]
    async fn test_raw_counter_file() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::new(dir.path());
        let raw = CacheOptions::new().raw();

        store.write("hits", json!(3), &raw).await.unwrap();
        assert_eq!(std::fs::read_to_string(dir.path().join("hits.cache")).unwrap(), "3");
        assert_eq!(store.decrement("hits", 1, &opts()).await.unwrap(), 2);
        assert_eq!(store.read("hits", &raw).await.unwrap().unwrap(), json!("2"));
        assert_eq!(store.read("hits", &opts()).await.unwrap().unwrap(), json!(2));
    }

    #[tokio::test]
    async fn test_delete_matched_and_clear() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::new(dir.path());
        store.write("views/1", json!(1), &opts()).await.unwrap();
        store.write("views/2", json!(2), &opts()).await.unwrap();
        store.write("users/1", json!(3), &opts()).await.unwrap();

        assert_eq!(store.delete_matched("^views/", &opts()).await.unwrap(), 2);
        assert!(!store.exist("views/1", &opts()).await.unwrap());
        assert!(store.exist("users/1", &opts()).await.unwrap());

        store.clear().await.unwrap();
        assert!(!store.exist("users/1", &opts()).await.unwrap());
        assert!(dir.path().exists());
    }

    #[tokio::test]
    async fn test_clear_missing_root_is_ok() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::new(dir.path().join("never-created"));
        store.clear().await.unwrap();
        assert!(store.read("foo", &opts()).await.unwrap().is_none());
    }
}
