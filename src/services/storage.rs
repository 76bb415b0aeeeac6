//! Storage adapter abstraction.
//!
//! Both backends (local disk and an S3-compatible bucket) implement
//! [`StorageAdapter`]. The active backend is chosen once at startup by
//! [`create_backend`] and carried as a [`Backend`] value; call sites never
//! test for "is there a bucket" themselves.

use crate::config::AppConfig;
use crate::services::{bucket::BucketAdapter, disk::DiskAdapter};
use async_trait::async_trait;
use bytes::Bytes;
use std::{fmt, io, sync::Arc, time::Duration};
use thiserror::Error;

/// Storage operation errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("object `{0}` not found")]
    NotFound(String),

    #[error("operation not supported by the {0} backend")]
    Unsupported(BackendKind),

    #[error("invalid storage key `{0}`")]
    InvalidKey(String),

    #[error("payload exceeds the {limit}-byte limit")]
    TooLarge { limit: u64 },

    #[error("storage backend error: {0}")]
    Backend(String),

    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Which backend variant is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Disk,
    Bucket,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Disk => write!(f, "disk"),
            BackendKind::Bucket => write!(f, "bucket"),
        }
    }
}

/// Uniform byte-store interface shared by both backends.
#[async_trait]
pub trait StorageAdapter: Send + Sync {
    /// Store `data` under `key`, replacing any existing content.
    async fn put(&self, key: &str, data: Bytes, content_type: &str) -> StorageResult<()>;

    /// Signed URL allowing a direct client PUT to `key` for `ttl`.
    ///
    /// Backends that cannot sign return [`StorageError::Unsupported`].
    async fn presign_put(
        &self,
        key: &str,
        content_type: &str,
        ttl: Duration,
    ) -> StorageResult<String>;

    async fn get(&self, key: &str) -> StorageResult<Bytes>;

    /// Keys starting with `prefix`, in the backend's native order.
    async fn list_by_prefix(&self, prefix: &str) -> StorageResult<Vec<String>>;

    /// Remove `key`. Reports [`StorageError::NotFound`] when nothing was there.
    async fn delete(&self, key: &str) -> StorageResult<()>;

    /// Public playback URL for `key`.
    fn public_url(&self, key: &str) -> String;

    fn kind(&self) -> BackendKind;
}

/// The storage backend chosen at startup.
#[derive(Clone)]
pub enum Backend {
    Disk(Arc<DiskAdapter>),
    Bucket(Arc<BucketAdapter>),
}

impl Backend {
    pub fn kind(&self) -> BackendKind {
        match self {
            Backend::Disk(_) => BackendKind::Disk,
            Backend::Bucket(_) => BackendKind::Bucket,
        }
    }

    /// The backend behind the common adapter interface.
    pub fn adapter(&self) -> Arc<dyn StorageAdapter> {
        match self {
            Backend::Disk(disk) => disk.clone(),
            Backend::Bucket(bucket) => bucket.clone(),
        }
    }
}

/// Build the process-wide backend from configuration.
///
/// A bucket backend is used only when all four connection parameters are
/// configured; anything less falls back to the upload directory on disk.
pub async fn create_backend(config: &AppConfig) -> StorageResult<Backend> {
    match &config.bucket {
        Some(bucket_cfg) => {
            let adapter = BucketAdapter::from_config(bucket_cfg)?;
            tracing::info!(
                bucket = %bucket_cfg.bucket,
                endpoint = %bucket_cfg.endpoint,
                "bucket storage configured"
            );
            Ok(Backend::Bucket(Arc::new(adapter)))
        }
        None => {
            let adapter = DiskAdapter::new(&config.upload_dir, "/uploads").await?;
            tracing::info!(
                upload_dir = %config.upload_dir.display(),
                "bucket not configured; using local disk storage"
            );
            Ok(Backend::Disk(Arc::new(adapter)))
        }
    }
}
