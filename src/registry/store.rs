//! Wallet store persistence
//!
//! The store is a single JSON snapshot on disk. Every mutation rewrites the
//! whole file; there is no incremental log. A missing or unparseable snapshot
//! degrades to an empty store rather than failing the operation.

use std::collections::BTreeMap;
use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{Error, Result};

use super::Category;

/// Full snapshot of registered wallets, keyed by role category.
///
/// Keys are stringified user ids, values are wallet addresses. Both
/// categories are always present after load, even when empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletStore {
    #[serde(default)]
    pub og: BTreeMap<String, String>,
    #[serde(default)]
    pub wl: BTreeMap<String, String>,
}

impl WalletStore {
    /// Entries for a category
    pub fn category(&self, category: Category) -> &BTreeMap<String, String> {
        match category {
            Category::Og => &self.og,
            Category::Wl => &self.wl,
        }
    }

    /// Mutable entries for a category
    pub fn category_mut(&mut self, category: Category) -> &mut BTreeMap<String, String> {
        match category {
            Category::Og => &mut self.og,
            Category::Wl => &mut self.wl,
        }
    }

    /// Number of entries in a category
    pub fn count(&self, category: Category) -> usize {
        self.category(category).len()
    }

    /// Total entries across both categories
    pub fn total(&self) -> usize {
        self.og.len() + self.wl.len()
    }
}

/// Persistence port for the wallet registry
#[async_trait]
pub trait WalletStorage: Send + Sync {
    /// Read the current snapshot. Never fails: a missing or corrupt
    /// snapshot yields an empty store.
    async fn load(&self) -> WalletStore;

    /// Overwrite the snapshot with the given store.
    async fn save(&self, store: &WalletStore) -> Result<()>;
}

/// JSON file-backed storage
pub struct JsonFileStorage {
    path: PathBuf,
}

impl JsonFileStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".tmp");
        PathBuf::from(name)
    }
}

#[async_trait]
impl WalletStorage for JsonFileStorage {
    async fn load(&self) -> WalletStore {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("Snapshot {} not found, starting empty", self.path.display());
                return WalletStore::default();
            }
            Err(e) => {
                warn!("Failed to read snapshot {}: {}", self.path.display(), e);
                return WalletStore::default();
            }
        };

        match serde_json::from_str::<WalletStore>(&content) {
            Ok(store) => store,
            Err(e) => {
                warn!(
                    "Snapshot {} is not a valid wallet store ({}), starting empty",
                    self.path.display(),
                    e
                );
                WalletStore::default()
            }
        }
    }

    async fn save(&self, store: &WalletStore) -> Result<()> {
        let json = serde_json::to_string_pretty(store)
            .map_err(|e| Error::Persistence(format!("Failed to serialize snapshot: {}", e)))?;

        // Write to a temporary file and rename so readers never see a
        // half-written snapshot.
        let tmp = self.tmp_path();
        tokio::fs::write(&tmp, json)
            .await
            .map_err(|e| Error::Persistence(format!("Failed to write snapshot: {}", e)))?;

        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| Error::Persistence(format!("Failed to replace snapshot: {}", e)))?;

        debug!("Saved {} wallet entries", store.total());
        Ok(())
    }
}

/// In-memory storage for tests
#[cfg(test)]
pub struct MemoryStorage {
    inner: std::sync::Mutex<WalletStore>,
    fail_saves: std::sync::atomic::AtomicBool,
}

#[cfg(test)]
impl MemoryStorage {
    pub fn new(store: WalletStore) -> Self {
        Self {
            inner: std::sync::Mutex::new(store),
            fail_saves: std::sync::atomic::AtomicBool::new(false),
        }
    }

    pub fn empty() -> Self {
        Self::new(WalletStore::default())
    }

    /// Make every subsequent save fail with a persistence error
    pub fn fail_saves(&self) {
        self.fail_saves
            .store(true, std::sync::atomic::Ordering::SeqCst);
    }

    pub fn snapshot(&self) -> WalletStore {
        self.inner.lock().unwrap().clone()
    }
}

#[cfg(test)]
#[async_trait]
impl WalletStorage for MemoryStorage {
    async fn load(&self) -> WalletStore {
        self.inner.lock().unwrap().clone()
    }

    async fn save(&self, store: &WalletStore) -> Result<()> {
        if self.fail_saves.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(Error::Persistence("simulated write failure".into()));
        }
        *self.inner.lock().unwrap() = store.clone();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_load_missing_file() {
        let dir = tempdir().unwrap();
        let storage = JsonFileStorage::new(dir.path().join("wallets.json"));

        let store = storage.load().await;
        assert!(store.og.is_empty());
        assert!(store.wl.is_empty());
    }

    #[tokio::test]
    async fn test_load_empty_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("wallets.json");
        std::fs::write(&path, "").unwrap();

        let store = JsonFileStorage::new(&path).load().await;
        assert_eq!(store, WalletStore::default());
    }

    #[tokio::test]
    async fn test_load_malformed_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("wallets.json");
        std::fs::write(&path, "[1, 2, 3]").unwrap();

        let store = JsonFileStorage::new(&path).load().await;
        assert_eq!(store, WalletStore::default());
    }

    #[tokio::test]
    async fn test_load_fills_missing_category() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("wallets.json");
        std::fs::write(&path, r#"{"og": {"1": "addr"}}"#).unwrap();

        let store = JsonFileStorage::new(&path).load().await;
        assert_eq!(store.og.len(), 1);
        assert!(store.wl.is_empty());
    }

    #[tokio::test]
    async fn test_save_load_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("wallets.json");
        let storage = JsonFileStorage::new(&path);

        let mut store = WalletStore::default();
        store
            .og
            .insert("42".into(), "Addr11111111111111111111111111AA".into());
        store
            .wl
            .insert("43".into(), "Addr11111111111111111111111111BB".into());

        storage.save(&store).await.unwrap();
        let loaded = storage.load().await;
        assert_eq!(loaded, store);
    }

    #[tokio::test]
    async fn test_save_leaves_no_temp_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("wallets.json");
        let storage = JsonFileStorage::new(&path);

        storage.save(&WalletStore::default()).await.unwrap();

        let entries: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(entries, vec![std::ffi::OsString::from("wallets.json")]);
    }

    #[tokio::test]
    async fn test_save_overwrites_previous_snapshot() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("wallets.json");
        let storage = JsonFileStorage::new(&path);

        let mut store = WalletStore::default();
        store
            .og
            .insert("42".into(), "Addr11111111111111111111111111AA".into());
        storage.save(&store).await.unwrap();

        store.og.clear();
        storage.save(&store).await.unwrap();

        let loaded = storage.load().await;
        assert_eq!(loaded.total(), 0);
    }
}
