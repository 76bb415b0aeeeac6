//! S3-compatible bucket backend (AWS S3, Cloudflare R2, MinIO, ...).
//!
//! Bytes and metadata documents both live in one bucket. Presigned PUT URLs
//! let clients upload directly without routing video bytes through the
//! server.

use crate::config::BucketConfig;
use crate::services::storage::{BackendKind, StorageAdapter, StorageError, StorageResult};
use async_trait::async_trait;
use bytes::Bytes;
use futures::TryStreamExt;
use http::Method;
use object_store::aws::AmazonS3Builder;
use object_store::path::Path;
use object_store::signer::Signer;
use object_store::{
    Attribute, Attributes, Error as ObjectStoreError, ObjectStore, PutOptions, PutPayload,
};
use std::{sync::Arc, time::Duration};

/// Bucket-backed storage adapter.
#[derive(Clone)]
pub struct BucketAdapter {
    store: Arc<dyn ObjectStore>,
    signer: Arc<dyn Signer>,
    /// Prefix of public object URLs, without trailing slash.
    public_base: String,
}

impl BucketAdapter {
    /// Compose an adapter from an object store and a URL signer.
    pub fn new(store: Arc<dyn ObjectStore>, signer: Arc<dyn Signer>, public_base: &str) -> Self {
        Self {
            store,
            signer,
            public_base: public_base.trim_end_matches('/').to_string(),
        }
    }

    /// Build the S3 client from connection settings. No network I/O happens here.
    pub fn from_config(cfg: &BucketConfig) -> StorageResult<Self> {
        let s3 = AmazonS3Builder::new()
            .with_endpoint(&cfg.endpoint)
            .with_allow_http(cfg.endpoint.starts_with("http://"))
            .with_region(&cfg.region)
            .with_bucket_name(&cfg.bucket)
            .with_access_key_id(&cfg.access_key)
            .with_secret_access_key(&cfg.secret_key)
            .build()
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        let s3 = Arc::new(s3);

        let public_base = match &cfg.public_base_url {
            Some(base) => base.clone(),
            None => format!("{}/{}", cfg.endpoint.trim_end_matches('/'), cfg.bucket),
        };

        Ok(Self::new(s3.clone(), s3, &public_base))
    }

    fn map_err(key: &str, err: ObjectStoreError) -> StorageError {
        match err {
            ObjectStoreError::NotFound { .. } => StorageError::NotFound(key.to_string()),
            other => StorageError::Backend(other.to_string()),
        }
    }
}

#[async_trait]
impl StorageAdapter for BucketAdapter {
    async fn put(&self, key: &str, data: Bytes, content_type: &str) -> StorageResult<()> {
        let size = data.len();
        let start = std::time::Instant::now();
        let mut attributes = Attributes::new();
        attributes.insert(Attribute::ContentType, content_type.to_string().into());
        let opts = PutOptions {
            attributes,
            ..Default::default()
        };
        self.store
            .put_opts(&Path::from(key), PutPayload::from(data), opts)
            .await
            .map_err(|e| {
                tracing::error!(
                    error = %e,
                    key = %key,
                    size_bytes = size,
                    duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                    "bucket put failed"
                );
                Self::map_err(key, e)
            })?;
        tracing::debug!(key = %key, size_bytes = size, "bucket put successful");
        Ok(())
    }

    /// The signature covers method, key and expiry only. `content_type` is
    /// not bound into it; the uploader sends its own `Content-Type`.
    async fn presign_put(
        &self,
        key: &str,
        content_type: &str,
        ttl: Duration,
    ) -> StorageResult<String> {
        let url = self
            .signer
            .signed_url(Method::PUT, &Path::from(key), ttl)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, key = %key, "presign failed");
                StorageError::Backend(e.to_string())
            })?;
        tracing::info!(
            key = %key,
            content_type = %content_type,
            ttl_secs = ttl.as_secs(),
            "issued presigned upload url"
        );
        Ok(url.to_string())
    }

    async fn get(&self, key: &str) -> StorageResult<Bytes> {
        let result = self
            .store
            .get(&Path::from(key))
            .await
            .map_err(|e| Self::map_err(key, e))?;
        result.bytes().await.map_err(|e| Self::map_err(key, e))
    }

    async fn list_by_prefix(&self, prefix: &str) -> StorageResult<Vec<String>> {
        let prefix_path = Path::from(prefix.trim_end_matches('/'));
        let metas: Vec<_> = self
            .store
            .list(Some(&prefix_path))
            .try_collect()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, prefix = %prefix, "bucket listing failed");
                StorageError::Backend(e.to_string())
            })?;
        Ok(metas
            .into_iter()
            .map(|meta| meta.location.to_string())
            .filter(|key| key.starts_with(prefix))
            .collect())
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        let location = Path::from(key);
        // S3 deletes succeed for absent keys, so head first to report NotFound.
        self.store
            .head(&location)
            .await
            .map_err(|e| Self::map_err(key, e))?;
        self.store.delete(&location).await.map_err(|e| {
            tracing::error!(error = %e, key = %key, "bucket delete failed");
            Self::map_err(key, e)
        })?;
        tracing::info!(key = %key, "bucket delete successful");
        Ok(())
    }

    fn public_url(&self, key: &str) -> String {
        format!("{}/{}", self.public_base, key)
    }

    fn kind(&self) -> BackendKind {
        BackendKind::Bucket
    }
}
