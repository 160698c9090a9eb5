//! Per-user cache records and the stores that persist them.
//!
//! A store is a flat key → JSON map keyed by the stringified user id. The
//! engine only ever reads or writes a whole [`Cache`] record.

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

/// Small per-user state that outlives a single conversation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Cache {
    /// OpenDota account linked by the user.
    pub linked_account_id: Option<u64>,
    /// Text of the message that opened the latest conversation.
    pub last_phrase: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("cache store I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cache store file {path} is not a JSON object: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to encode cache record: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Durable key → JSON value store.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError>;
    async fn set(&self, key: &str, value: Value) -> Result<(), StoreError>;
}

/// Read the cache for `key`. Missing records and records that no longer
/// decode both start from an empty cache.
pub async fn load_cache(store: &dyn CacheStore, key: &str) -> Result<Cache, StoreError> {
    let Some(raw) = store.get(key).await? else {
        return Ok(Cache::default());
    };
    match serde_json::from_value(raw) {
        Ok(cache) => Ok(cache),
        Err(err) => {
            tracing::warn!(user = key, error = %err, "discarding undecodable cache record");
            Ok(Cache::default())
        }
    }
}

pub async fn flush_cache(store: &dyn CacheStore, key: &str, cache: &Cache) -> Result<(), StoreError> {
    store.set(key, serde_json::to_value(cache)?).await
}

/// In-process store; contents are lost when the process exits.
#[derive(Debug, Default)]
pub struct MemoryCacheStore {
    entries: DashMap<String, Value>,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        Ok(self.entries.get(key).map(|v| v.value().clone()))
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), StoreError> {
        self.entries.insert(key.to_string(), value);
        Ok(())
    }
}

/// Store backed by a single JSON object file.
///
/// The file is read once at open and rewritten after every `set`, through a
/// temporary file that is renamed over the original.
#[derive(Debug)]
pub struct JsonFileCacheStore {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, Value>>,
}

impl JsonFileCacheStore {
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let entries: BTreeMap<String, Value> = match tokio::fs::read(&path).await {
            Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => BTreeMap::new(),
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|source| StoreError::Corrupt { path: path.clone(), source })?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(source) => return Err(StoreError::Io { path, source }),
        };
        tracing::info!(path = %path.display(), users = entries.len(), "cache store opened");
        Ok(Self { path, entries: Mutex::new(entries) })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn dump(&self, entries: &BTreeMap<String, Value>) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec_pretty(entries)?;
        let tmp = self.path.with_extension("json.tmp");
        let io_err = |source| StoreError::Io { path: self.path.clone(), source };

        tokio::fs::write(&tmp, bytes).await.map_err(io_err)?;
        tokio::fs::rename(&tmp, &self.path).await.map_err(io_err)
    }
}

#[async_trait]
impl CacheStore for JsonFileCacheStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        Ok(self.entries.lock().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().await;
        entries.insert(key.to_string(), value);
        self.dump(&entries).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn missing_and_undecodable_records_load_as_default() {
        let store = MemoryCacheStore::new();
        assert_eq!(load_cache(&store, "1").await.unwrap(), Cache::default());

        store.set("1", json!({"linked_account_id": "not a number"})).await.unwrap();
        assert_eq!(load_cache(&store, "1").await.unwrap(), Cache::default());
    }

    #[tokio::test]
    async fn partial_records_fill_missing_fields() {
        let store = MemoryCacheStore::new();
        store.set("7", json!({"linked_account_id": 55136643})).await.unwrap();

        let cache = load_cache(&store, "7").await.unwrap();
        assert_eq!(cache.linked_account_id, Some(55136643));
        assert_eq!(cache.last_phrase, None);
    }

    #[tokio::test]
    async fn file_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");

        let store = JsonFileCacheStore::open(&path).await.unwrap();
        let cache = Cache { linked_account_id: Some(42), last_phrase: Some("lm".into()) };
        flush_cache(&store, "100", &cache).await.unwrap();
        drop(store);

        let reopened = JsonFileCacheStore::open(&path).await.unwrap();
        assert_eq!(load_cache(&reopened, "100").await.unwrap(), cache);
        assert_eq!(load_cache(&reopened, "200").await.unwrap(), Cache::default());
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[tokio::test]
    async fn file_store_rejects_corrupt_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");
        std::fs::write(&path, "[1, 2, 3]").unwrap();

        let err = JsonFileCacheStore::open(&path).await.unwrap_err();
        assert!(matches!(err, StoreError::Corrupt { .. }));
    }

    #[tokio::test]
    async fn empty_file_opens_as_empty_store() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");
        std::fs::write(&path, "").unwrap();

        let store = JsonFileCacheStore::open(&path).await.unwrap();
        assert_eq!(store.get("1").await.unwrap(), None);
        assert_eq!(store.path(), path.as_path());
    }
}
