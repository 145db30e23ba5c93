//! Key-value stores backing the type registry
//!
//! The registry only needs get/set and prefix invalidation, so any external
//! cache can sit behind `KeyValueStore`. Two stores ship with the crate:
//! an in-process map and a JSON file.

use super::error::{RegistryError, RegistryResult};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;

/// Opaque string key-value service
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Read a key; `None` when absent
    async fn get(&self, key: &str) -> RegistryResult<Option<String>>;

    /// Write a key, replacing any previous value
    async fn set(&self, key: &str, value: &str) -> RegistryResult<()>;

    /// Remove every key starting with `prefix`, returning how many were removed
    async fn delete_prefix(&self, prefix: &str) -> RegistryResult<usize>;
}

/// In-process store
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<BTreeMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> RegistryResult<Option<String>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> RegistryResult<()> {
        self.entries
            .write()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn delete_prefix(&self, prefix: &str) -> RegistryResult<usize> {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|k, _| !k.starts_with(prefix));
        Ok(before - entries.len())
    }
}

/// JSON-file store
///
/// The whole document is loaded at open and rewritten after every mutation.
/// A mutation is staged on a copy, written to a sibling temp file and renamed
/// over the document; memory is updated only once the rename succeeds, so a
/// failed write leaves both memory and disk at the previous state.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    entries: RwLock<BTreeMap<String, String>>,
}

impl FileStore {
    /// Open the store, starting empty when the file does not exist yet
    pub async fn open(path: impl Into<PathBuf>) -> RegistryResult<Self> {
        let path = path.into();
        let entries = if tokio::fs::try_exists(&path).await? {
            let content = tokio::fs::read_to_string(&path).await?;
            serde_json::from_str(&content)?
        } else {
            BTreeMap::new()
        };

        tracing::debug!(path = ?path, entries = entries.len(), "Opened registry file");
        Ok(Self {
            path,
            entries: RwLock::new(entries),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn staging_path(&self) -> PathBuf {
        let mut staging = self.path.clone().into_os_string();
        staging.push(".tmp");
        PathBuf::from(staging)
    }

    async fn persist(&self, entries: &BTreeMap<String, String>) -> RegistryResult<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let content = serde_json::to_string_pretty(entries)?;
        let staging = self.staging_path();
        tokio::fs::write(&staging, content).await?;
        if let Err(e) = tokio::fs::rename(&staging, &self.path).await {
            let _ = tokio::fs::remove_file(&staging).await;
            return Err(e.into());
        }
        Ok(())
    }
}

#[async_trait]
impl KeyValueStore for FileStore {
    async fn get(&self, key: &str) -> RegistryResult<Option<String>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> RegistryResult<()> {
        let mut entries = self.entries.write().await;
        let mut staged = entries.clone();
        staged.insert(key.to_string(), value.to_string());
        self.persist(&staged).await?;
        *entries = staged;
        Ok(())
    }

    async fn delete_prefix(&self, prefix: &str) -> RegistryResult<usize> {
        let mut entries = self.entries.write().await;
        let mut staged = entries.clone();
        staged.retain(|k, _| !k.starts_with(prefix));
        let removed = entries.len() - staged.len();
        if removed > 0 {
            self.persist(&staged).await?;
            *entries = staged;
        }
        Ok(removed)
    }
}

/// Store that fails every call, for exercising error paths
#[cfg(test)]
pub(crate) struct UnavailableStore;

#[cfg(test)]
#[async_trait]
impl KeyValueStore for UnavailableStore {
    async fn get(&self, _key: &str) -> RegistryResult<Option<String>> {
        Err(RegistryError::Store("connection refused".to_string()))
    }

    async fn set(&self, _key: &str, _value: &str) -> RegistryResult<()> {
        Err(RegistryError::Store("connection refused".to_string()))
    }

    async fn delete_prefix(&self, _prefix: &str) -> RegistryResult<usize> {
        Err(RegistryError::Store("connection refused".to_string()))
    }
}

/// Store that never answers
#[cfg(test)]
pub(crate) struct SilentStore;

#[cfg(test)]
#[async_trait]
impl KeyValueStore for SilentStore {
    async fn get(&self, _key: &str) -> RegistryResult<Option<String>> {
        std::future::pending().await
    }

    async fn set(&self, _key: &str, _value: &str) -> RegistryResult<()> {
        std::future::pending().await
    }

    async fn delete_prefix(&self, _prefix: &str) -> RegistryResult<usize> {
        std::future::pending().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_memory_store_roundtrip() {
        let store = MemoryStore::new();
        assert_eq!(store.get("e1:d1:temp").await.unwrap(), None);

        store.set("e1:d1:temp", "float").await.unwrap();
        store.set("e1:d1:humidity", "int").await.unwrap();
        store.set("e1:d10:temp", "int").await.unwrap();
        assert_eq!(
            store.get("e1:d1:temp").await.unwrap().as_deref(),
            Some("float")
        );

        assert_eq!(store.delete_prefix("e1:d1:").await.unwrap(), 2);
        assert_eq!(store.len().await, 1);
        assert_eq!(store.get("e1:d1:temp").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_file_store_persists_across_opens() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("meta").join("types.json");

        let store = FileStore::open(&path).await.unwrap();
        store.set("e1:d1:temp", "float").await.unwrap();
        drop(store);

        let reopened = FileStore::open(&path).await.unwrap();
        assert_eq!(
            reopened.get("e1:d1:temp").await.unwrap().as_deref(),
            Some("float")
        );

        assert_eq!(reopened.delete_prefix("e1:d1:").await.unwrap(), 1);
        drop(reopened);

        let reopened = FileStore::open(&path).await.unwrap();
        assert_eq!(reopened.get("e1:d1:temp").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_file_store_rejects_corrupt_document() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("types.json");
        std::fs::write(&path, "not json").unwrap();

        let result = FileStore::open(&path).await;
        assert!(matches!(result, Err(RegistryError::Serialization(_))));
    }

    #[tokio::test]
    async fn test_file_store_leaves_no_staging_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("types.json");

        let store = FileStore::open(&path).await.unwrap();
        store.set("e1:d1:temp", "float").await.unwrap();

        assert!(path.exists());
        assert!(!dir.path().join("types.json.tmp").exists());
    }

    #[tokio::test]
    async fn test_file_store_failed_write_keeps_previous_state() {
        let dir = tempdir().unwrap();
        let meta = dir.path().join("meta");
        let path = meta.join("types.json");

        let store = FileStore::open(&path).await.unwrap();
        store.set("e1:d1:temp", "float").await.unwrap();

        // A plain file where the directory was makes every write fail
        std::fs::remove_dir_all(&meta).unwrap();
        std::fs::write(&meta, "").unwrap();

        assert!(store.set("e1:d1:on", "bool").await.is_err());
        assert_eq!(store.get("e1:d1:on").await.unwrap(), None);

        assert!(store.delete_prefix("e1:d1:").await.is_err());
        assert_eq!(
            store.get("e1:d1:temp").await.unwrap().as_deref(),
            Some("float")
        );
    }
}
