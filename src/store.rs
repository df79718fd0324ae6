use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::fs;
use tokio::sync::RwLock;
use tracing::warn;

use crate::error::{Error, Result};

/// Logical keys the sync job persists under.
pub mod keys {
    /// Most recent validated [`IpListSnapshot`](crate::ip_source::IpListSnapshot).
    pub const IP_LIST: &str = "zoom_ip_list";
    /// Result of the most recent reconciliation pass.
    pub const LAST_RESULT: &str = "last_update_result";
    /// Persisted target account selection.
    pub const SELECTED_ACCOUNT: &str = "selected_account";
    /// Bounded, newest-first list of past results.
    pub const HISTORY: &str = "update_history";

    pub const ALL: [&str; 4] = [IP_LIST, LAST_RESULT, SELECTED_ACCOUNT, HISTORY];
}

/// Plain string key-value persistence. Callers own (de)serialization; there
/// are no transactions, so read-modify-write sequences are only safe while
/// invocations stay serialized.
#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;
    async fn put(&self, key: &str, value: String) -> Result<()>;
    async fn delete(&self, key: &str) -> Result<()>;
}

pub async fn get_json<T: DeserializeOwned>(store: &dyn KvStore, key: &str) -> Result<Option<T>> {
    match store.get(key).await? {
        Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
        None => Ok(None),
    }
}

pub async fn put_json<T: Serialize>(store: &dyn KvStore, key: &str, value: &T) -> Result<()> {
    store.put(key, serde_json::to_string(value)?).await
}

/// In-memory store for tests and ephemeral deployments.
#[derive(Debug, Default)]
pub struct MemoryKvStore {
    inner: RwLock<HashMap<String, String>>,
}

impl MemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KvStore for MemoryKvStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.inner.read().await.get(key).cloned())
    }

    async fn put(&self, key: &str, value: String) -> Result<()> {
        self.inner.write().await.insert(key.to_string(), value);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.inner.write().await.remove(key);
        Ok(())
    }
}

/// Single-file JSON store. Writes go to a sibling temp file first and are
/// renamed into place; a corrupt file is treated as empty since every value
/// can be rebuilt from upstream.
#[derive(Debug)]
pub struct FileKvStore {
    path: PathBuf,
    inner: RwLock<HashMap<String, String>>,
}

impl FileKvStore {
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .await
                    .map_err(|err| Error::store(format!("create {}: {err}", parent.display())))?;
            }
        }

        let map = match fs::read_to_string(&path).await {
            Ok(raw) => match serde_json::from_str(&raw) {
                Ok(map) => map,
                Err(err) => {
                    warn!(path = %path.display(), %err, "state file corrupt, starting empty");
                    HashMap::new()
                }
            },
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(err) => return Err(Error::store(format!("read {}: {err}", path.display()))),
        };

        Ok(Self {
            path,
            inner: RwLock::new(map),
        })
    }

    async fn flush(&self, map: &HashMap<String, String>) -> Result<()> {
        let raw = serde_json::to_string_pretty(map)?;
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, raw)
            .await
            .map_err(|err| Error::store(format!("write {}: {err}", tmp.display())))?;
        fs::rename(&tmp, &self.path)
            .await
            .map_err(|err| Error::store(format!("rename {}: {err}", self.path.display())))
    }
}

#[async_trait]
impl KvStore for FileKvStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.inner.read().await.get(key).cloned())
    }

    async fn put(&self, key: &str, value: String) -> Result<()> {
        let mut guard = self.inner.write().await;
        guard.insert(key.to_string(), value);
        self.flush(&guard).await
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut guard = self.inner.write().await;
        guard.remove(key);
        self.flush(&guard).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_store_round_trip() {
        let store = MemoryKvStore::new();
        assert_eq!(store.get("missing").await.unwrap(), None);

        store.put("k", String::from("v")).await.unwrap();
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("v"));

        store.delete("k").await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn json_helpers_round_trip() {
        let store = MemoryKvStore::new();
        put_json(&store, "nums", &vec![1, 2, 3]).await.unwrap();
        let nums: Option<Vec<i32>> = get_json(&store, "nums").await.unwrap();
        assert_eq!(nums, Some(vec![1, 2, 3]));
    }

    #[tokio::test]
    async fn file_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");

        let store = FileKvStore::open(&path).await.unwrap();
        store.put("a", String::from("1")).await.unwrap();
        store.put("b", String::from("2")).await.unwrap();
        store.delete("a").await.unwrap();
        drop(store);

        let reopened = FileKvStore::open(&path).await.unwrap();
        assert_eq!(reopened.get("a").await.unwrap(), None);
        assert_eq!(reopened.get("b").await.unwrap().as_deref(), Some("2"));
    }

    #[tokio::test]
    async fn corrupt_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(&path, "{not json").unwrap();

        let store = FileKvStore::open(&path).await.unwrap();
        assert_eq!(store.get("anything").await.unwrap(), None);
    }
}
