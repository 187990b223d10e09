//! Persistent storage for the registries.

use crate::error::BridgeResult;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// JSON snapshot file, replaced atomically on every save.
pub struct FileStore {
    storage_path: PathBuf,
}

impl FileStore {
    pub fn new(storage_path: impl Into<PathBuf>) -> Self {
        Self {
            storage_path: storage_path.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.storage_path
    }

    /// Write the snapshot through a synced temp file and rename it into place.
    pub async fn save<T: Serialize>(&self, data: &T) -> BridgeResult<()> {
        let bytes = serde_json::to_vec_pretty(data)?;

        if let Some(parent) = self.storage_path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let temp_path = self.storage_path.with_extension("tmp");
        let mut file = fs::File::create(&temp_path).await?;
        file.write_all(&bytes).await?;
        file.sync_all().await?;
        drop(file);

        fs::rename(&temp_path, &self.storage_path).await?;

        debug!(
            "Saved snapshot ({} bytes) to {:?}",
            bytes.len(),
            self.storage_path
        );
        Ok(())
    }

    /// Load the snapshot; a missing file yields the default value.
    ///
    /// Saves never write an empty file, so an empty or truncated snapshot is
    /// reported as a storage error.
    pub async fn load<T: DeserializeOwned + Default>(&self) -> BridgeResult<T> {
        if !self.storage_path.exists() {
            info!(
                "Snapshot not found at {:?}, starting empty",
                self.storage_path
            );
            return Ok(T::default());
        }

        let data = fs::read(&self.storage_path).await?;
        serde_json::from_slice(&data).map_err(|e| {
            warn!(error = %e, "Snapshot {:?} is unreadable", self.storage_path);
            e.into()
        })
    }
}

/// Storage backend for a registry.
pub enum Store {
    /// JSON file on disk
    File(FileStore),
    /// In-memory only (no persistence)
    Memory,
}

impl Store {
    pub fn file(storage_path: impl Into<PathBuf>) -> Self {
        Store::File(FileStore::new(storage_path))
    }

    pub fn memory() -> Self {
        Store::Memory
    }

    pub async fn save<T: Serialize>(&self, data: &T) -> BridgeResult<()> {
        match self {
            Store::File(s) => s.save(data).await,
            Store::Memory => Ok(()),
        }
    }

    pub async fn load<T: DeserializeOwned + Default>(&self) -> BridgeResult<T> {
        match self {
            Store::File(s) => s.load().await,
            Store::Memory => Ok(T::default()),
        }
    }
}

/// A keyed table held in memory and written through to its store.
///
/// Mutations keep the write lock while persisting, and roll the in-memory
/// change back if the write fails, so each operation is atomic.
pub struct Table<T> {
    records: RwLock<HashMap<String, T>>,
    store: Store,
}

impl<T> Table<T>
where
    T: Clone + Serialize + DeserializeOwned,
{
    /// Open a table, loading whatever the store holds.
    pub async fn open(store: Store) -> BridgeResult<Self> {
        let records: HashMap<String, T> = store.load().await?;
        Ok(Self {
            records: RwLock::new(records),
            store,
        })
    }

    pub fn in_memory() -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
            store: Store::memory(),
        }
    }

    pub async fn get(&self, key: &str) -> Option<T> {
        self.records.read().await.get(key).cloned()
    }

    pub async fn values(&self) -> Vec<T> {
        self.records.read().await.values().cloned().collect()
    }

    pub async fn find<F>(&self, predicate: F) -> Vec<T>
    where
        F: Fn(&T) -> bool,
    {
        self.records
            .read()
            .await
            .values()
            .filter(|v| predicate(v))
            .cloned()
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Insert or replace a record. `build` receives the previous value.
    pub async fn upsert<F>(&self, key: &str, build: F) -> BridgeResult<T>
    where
        F: FnOnce(Option<&T>) -> T,
    {
        let mut records = self.records.write().await;
        let value = build(records.get(key));
        let previous = records.insert(key.to_string(), value.clone());

        if let Err(e) = self.store.save(&*records).await {
            match previous {
                Some(p) => records.insert(key.to_string(), p),
                None => records.remove(key),
            };
            return Err(e);
        }

        Ok(value)
    }

    /// Remove a record, returning whether it existed.
    pub async fn remove(&self, key: &str) -> BridgeResult<bool> {
        let mut records = self.records.write().await;
        let Some(previous) = records.remove(key) else {
            return Ok(false);
        };

        if let Err(e) = self.store.save(&*records).await {
            records.insert(key.to_string(), previous);
            return Err(e);
        }

        Ok(true)
    }
}
