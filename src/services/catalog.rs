//! Metadata catalog: the authoritative list of published videos.
//!
//! Two strategies share the [`MetadataCatalog`] interface:
//! - [`FlatFileCatalog`] keeps the whole catalog as one JSON array on disk.
//! - [`PrefixCatalog`] keeps one JSON document per entry under `meta/` in
//!   the storage backend.
//!
//! Listing never fails because of bad data: a missing or corrupt catalog
//! file reads as empty, and an unreadable meta document is skipped.

use crate::models::movie::MovieEntry;
use crate::services::keys;
use crate::services::storage::{Backend, StorageAdapter, StorageError};
use async_trait::async_trait;
use bytes::Bytes;
use std::{
    io::{self, ErrorKind},
    path::PathBuf,
    sync::Arc,
};
use thiserror::Error;
use tokio::{fs, sync::Mutex};

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("could not encode catalog entry: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("key `{key}` shares a metadata document with `{existing}`")]
    KeyConflict { key: String, existing: String },
}

pub type CatalogResult<T> = Result<T, CatalogError>;

#[async_trait]
pub trait MetadataCatalog: Send + Sync {
    /// All readable entries.
    async fn list(&self) -> CatalogResult<Vec<MovieEntry>>;

    /// Insert `entry`, or update the entry with the same key.
    ///
    /// An update keeps the stored `created_at`. Returns the entry as stored.
    async fn append(&self, entry: MovieEntry) -> CatalogResult<MovieEntry>;

    /// Remove the entry with `key`. Returns whether one existed.
    async fn remove(&self, key: &str) -> CatalogResult<bool>;

    /// First entry addressed by `name` (key, display name or key suffix).
    async fn find(&self, name: &str) -> CatalogResult<Option<MovieEntry>> {
        Ok(self.list().await?.into_iter().find(|e| e.matches(name)))
    }
}

/// Pick the catalog strategy matching the active backend.
pub fn create_catalog(backend: &Backend, catalog_file: PathBuf) -> Arc<dyn MetadataCatalog> {
    match backend {
        Backend::Bucket(bucket) => Arc::new(PrefixCatalog::new(bucket.clone())),
        Backend::Disk(_) => Arc::new(FlatFileCatalog::new(catalog_file)),
    }
}

/// Whole-catalog JSON array persisted at a fixed path.
///
/// Read-modify-write cycles are serialised by an in-process lock. Another
/// process (or another instance) writing the same file can still interleave
/// and drop an update.
pub struct FlatFileCatalog {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FlatFileCatalog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    async fn read(&self) -> CatalogResult<Vec<MovieEntry>> {
        let raw = match fs::read(&self.path).await {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };
        if raw.iter().all(u8::is_ascii_whitespace) {
            return Ok(Vec::new());
        }
        match serde_json::from_slice(&raw) {
            Ok(entries) => Ok(entries),
            Err(err) => {
                tracing::warn!(
                    path = %self.path.display(),
                    error = %err,
                    "catalog file is corrupt; treating as empty"
                );
                Ok(Vec::new())
            }
        }
    }

    async fn write(&self, entries: &[MovieEntry]) -> CatalogResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }
        let body = serde_json::to_vec_pretty(entries)?;
        fs::write(&self.path, body).await?;
        Ok(())
    }
}

#[async_trait]
impl MetadataCatalog for FlatFileCatalog {
    async fn list(&self) -> CatalogResult<Vec<MovieEntry>> {
        self.read().await
    }

    async fn append(&self, mut entry: MovieEntry) -> CatalogResult<MovieEntry> {
        let _guard = self.lock.lock().await;
        let mut entries = self.read().await?;
        match entries.iter_mut().find(|e| e.key == entry.key) {
            Some(existing) => {
                entry.created_at = existing.created_at.or(entry.created_at);
                *existing = entry.clone();
            }
            None => entries.push(entry.clone()),
        }
        self.write(&entries).await?;
        Ok(entry)
    }

    async fn remove(&self, key: &str) -> CatalogResult<bool> {
        let _guard = self.lock.lock().await;
        let mut entries = self.read().await?;
        let before = entries.len();
        entries.retain(|e| e.key != key);
        if entries.len() == before {
            return Ok(false);
        }
        self.write(&entries).await?;
        Ok(true)
    }
}

/// One JSON document per entry at `meta/<sanitized-key>.json`.
pub struct PrefixCatalog {
    store: Arc<dyn StorageAdapter>,
}

impl PrefixCatalog {
    pub fn new(store: Arc<dyn StorageAdapter>) -> Self {
        Self { store }
    }

    async fn fetch(&self, meta_key: &str) -> Result<MovieEntry, String> {
        let raw = self.store.get(meta_key).await.map_err(|e| e.to_string())?;
        serde_json::from_slice(&raw).map_err(|e| e.to_string())
    }
}

#[async_trait]
impl MetadataCatalog for PrefixCatalog {
    async fn list(&self) -> CatalogResult<Vec<MovieEntry>> {
        let meta_keys = self.store.list_by_prefix(keys::META_PREFIX).await?;
        let mut entries = Vec::with_capacity(meta_keys.len());
        for meta_key in meta_keys {
            match self.fetch(&meta_key).await {
                Ok(entry) => entries.push(entry),
                Err(err) => {
                    tracing::warn!(meta_key = %meta_key, error = %err, "skipping unreadable metadata");
                }
            }
        }
        Ok(entries)
    }

    async fn append(&self, mut entry: MovieEntry) -> CatalogResult<MovieEntry> {
        let meta_key = keys::meta_key(&entry.key);
        if let Ok(existing) = self.fetch(&meta_key).await {
            if existing.key != entry.key {
                tracing::warn!(
                    key = %entry.key,
                    existing = %existing.key,
                    meta_key = %meta_key,
                    "two keys collide on one metadata document"
                );
                return Err(CatalogError::KeyConflict {
                    key: entry.key,
                    existing: existing.key,
                });
            }
            entry.created_at = existing.created_at.or(entry.created_at);
        }
        let body = serde_json::to_vec(&entry)?;
        self.store
            .put(&meta_key, Bytes::from(body), "application/json")
            .await?;
        Ok(entry)
    }

    async fn remove(&self, key: &str) -> CatalogResult<bool> {
        let meta_key = keys::meta_key(key);
        match self.fetch(&meta_key).await {
            Ok(existing) if existing.key != key => return Ok(false),
            _ => {}
        }
        match self.store.delete(&meta_key).await {
            Ok(()) => Ok(true),
            Err(StorageError::NotFound(_)) => Ok(false),
            Err(err) => Err(err.into()),
        }
    }
}
