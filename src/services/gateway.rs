//! Media gateway: list / presign / register / delete / direct upload.
//!
//! Composes the metadata catalog with whichever storage backend is active.
//! Multi-step operations are not transactional. Delete removes the object
//! first and then the metadata; a failure in the second step is logged and
//! swallowed, which can leave a metadata entry without its object.

use crate::models::movie::{MovieEntry, PresignRequest, PresignResponse, RegisterRequest, UploadResponse};
use crate::services::catalog::{CatalogError, MetadataCatalog};
use crate::services::disk::DiskAdapter;
use crate::services::keys;
use crate::services::storage::{Backend, StorageAdapter, StorageError};
use bytes::Bytes;
use futures::Stream;
use std::{collections::HashSet, sync::Arc, time::Duration};
use thiserror::Error;

/// Validity window of presigned upload URLs.
pub const PRESIGN_TTL: Duration = Duration::from_secs(900);

const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";
const DEFAULT_UPLOAD_NAME: &str = "upload";

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Unauthorized")]
    Unauthorized,
    #[error("{0}")]
    Validation(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("{0}")]
    NotConfigured(&'static str),
    #[error("upload exceeds the {limit}-byte limit")]
    PayloadTooLarge { limit: u64 },
    #[error("storage backend unavailable: {0}")]
    Backend(String),
}

pub type GatewayResult<T> = Result<T, GatewayError>;

impl From<StorageError> for GatewayError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(key) => GatewayError::NotFound(key),
            StorageError::Unsupported(_) => {
                GatewayError::NotConfigured("operation not supported by the active storage backend")
            }
            StorageError::InvalidKey(key) => {
                GatewayError::Validation(format!("invalid storage key `{}`", key))
            }
            StorageError::TooLarge { limit } => GatewayError::PayloadTooLarge { limit },
            other => GatewayError::Backend(other.to_string()),
        }
    }
}

impl From<CatalogError> for GatewayError {
    fn from(err: CatalogError) -> Self {
        match err {
            CatalogError::Storage(inner) => inner.into(),
            conflict @ CatalogError::KeyConflict { .. } => {
                GatewayError::Validation(conflict.to_string())
            }
            other => GatewayError::Backend(other.to_string()),
        }
    }
}

/// The only component allowed to mutate the catalog.
pub struct MediaGateway {
    backend: Backend,
    catalog: Arc<dyn MetadataCatalog>,
}

impl MediaGateway {
    pub fn new(backend: Backend, catalog: Arc<dyn MetadataCatalog>) -> Self {
        Self { backend, catalog }
    }

    pub fn backend(&self) -> &Backend {
        &self.backend
    }

    /// Full catalog.
    ///
    /// Bucket mode reads the meta documents. Disk mode scans the upload
    /// directory and appends catalog entries whose key is not a scanned file.
    pub async fn list(&self) -> GatewayResult<Vec<MovieEntry>> {
        match &self.backend {
            Backend::Bucket(_) => Ok(self.catalog.list().await?),
            Backend::Disk(disk) => {
                let mut movies = disk.list_videos().await.map_err(|e| {
                    tracing::error!(error = %e, "unable to read uploads");
                    GatewayError::from(e)
                })?;
                match self.catalog.list().await {
                    Ok(registered) => {
                        let scanned: HashSet<String> =
                            movies.iter().map(|m| m.key.clone()).collect();
                        movies.extend(registered.into_iter().filter(|e| !scanned.contains(&e.key)));
                    }
                    Err(err) => {
                        tracing::warn!(error = %err, "ignoring unreadable catalog file");
                    }
                }
                Ok(movies)
            }
        }
    }

    /// Issue a presigned PUT target for a new upload (bucket mode only).
    pub async fn presign(&self, req: PresignRequest) -> GatewayResult<PresignResponse> {
        let Backend::Bucket(bucket) = &self.backend else {
            return Err(GatewayError::NotConfigured("bucket storage not configured"));
        };
        let filename = req
            .filename
            .filter(|f| !f.is_empty())
            .ok_or_else(|| GatewayError::Validation("filename required".into()))?;
        let content_type = req
            .content_type
            .filter(|c| !c.is_empty())
            .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string());

        let key = keys::upload_key(&filename);
        let upload_url = bucket.presign_put(&key, &content_type, PRESIGN_TTL).await?;
        let public_url = bucket.public_url(&key);

        Ok(PresignResponse {
            upload_url,
            public_url,
            key,
        })
    }

    /// Record an uploaded object in the catalog.
    ///
    /// The object's existence is taken on the caller's word.
    pub async fn register(&self, req: RegisterRequest) -> GatewayResult<MovieEntry> {
        let (Some(key), Some(url)) = (
            req.key.filter(|k| !k.is_empty()),
            req.url.filter(|u| !u.is_empty()),
        ) else {
            return Err(GatewayError::Validation("key and url required".into()));
        };

        let entry = self
            .catalog
            .append(MovieEntry::register(key, req.name, url))
            .await?;
        tracing::info!(key = %entry.key, name = %entry.name, "registered movie");
        Ok(entry)
    }

    /// Delete a movie addressed by key, display name or key suffix.
    pub async fn delete(&self, name: &str) -> GatewayResult<()> {
        if name.is_empty() {
            return Err(GatewayError::NotFound(name.to_string()));
        }
        match &self.backend {
            Backend::Bucket(bucket) => self.delete_catalogued(bucket.as_ref(), name).await,
            Backend::Disk(disk) => self.delete_file(disk, name).await,
        }
    }

    async fn delete_catalogued(&self, store: &dyn StorageAdapter, name: &str) -> GatewayResult<()> {
        let entry = self
            .catalog
            .find(name)
            .await?
            .ok_or_else(|| GatewayError::NotFound(name.to_string()))?;

        match store.delete(&entry.key).await {
            Ok(()) => {}
            Err(StorageError::NotFound(_)) => {
                tracing::warn!(key = %entry.key, "object already gone; removing metadata");
            }
            Err(err) => {
                tracing::error!(key = %entry.key, error = %err, "object delete failed");
                return Err(err.into());
            }
        }
        self.forget(&entry.key).await;
        Ok(())
    }

    async fn delete_file(&self, disk: &DiskAdapter, name: &str) -> GatewayResult<()> {
        let file = keys::sanitize_filename(name);
        match disk.delete(&file).await {
            Ok(()) => {
                tracing::info!(file = %file, "deleted upload");
                self.forget(&file).await;
                Ok(())
            }
            Err(StorageError::NotFound(_)) | Err(StorageError::InvalidKey(_)) => {
                match self.catalog.find(name).await? {
                    Some(entry) => {
                        self.catalog.remove(&entry.key).await?;
                        Ok(())
                    }
                    None => Err(GatewayError::NotFound(name.to_string())),
                }
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Best-effort metadata removal after the object is gone.
    async fn forget(&self, key: &str) {
        if let Err(err) = self.catalog.remove(key).await {
            tracing::warn!(key = %key, error = %err, "metadata cleanup failed; entry may dangle");
        }
    }

    /// Write a multipart file straight into the upload directory (disk mode only).
    ///
    /// The catalog is not touched; disk-mode listing is a live directory scan.
    pub async fn upload<S, E>(
        &self,
        original_name: Option<&str>,
        stream: S,
        limit: u64,
    ) -> GatewayResult<UploadResponse>
    where
        S: Stream<Item = Result<Bytes, E>>,
        E: std::error::Error + Send + Sync + 'static,
    {
        let Backend::Disk(disk) = &self.backend else {
            return Err(GatewayError::NotConfigured(
                "direct upload is only available in disk mode",
            ));
        };
        let original = original_name
            .filter(|n| !n.is_empty())
            .unwrap_or(DEFAULT_UPLOAD_NAME);
        let name = keys::disk_upload_name(original);

        let size = disk.put_stream(&name, stream, limit).await?;
        if size == 0 {
            let _ = disk.delete(&name).await;
            return Err(GatewayError::Validation("No file uploaded".into()));
        }

        tracing::info!(name = %name, size_bytes = size, "stored direct upload");
        Ok(UploadResponse {
            url: disk.public_url(&name),
            name,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::bucket::test_support::memory_bucket;
    use crate::services::catalog::{FlatFileCatalog, PrefixCatalog};
    use std::io;
    use tempfile::{TempDir, tempdir};

    fn bucket_gateway() -> (MediaGateway, crate::services::bucket::BucketAdapter) {
        let (bucket, _) = memory_bucket();
        let adapter = Arc::new(bucket.clone());
        let gateway = MediaGateway::new(
            Backend::Bucket(adapter.clone()),
            Arc::new(PrefixCatalog::new(adapter)),
        );
        (gateway, bucket)
    }

    async fn disk_gateway() -> (MediaGateway, Arc<DiskAdapter>, TempDir) {
        let dir = tempdir().unwrap();
        let disk = Arc::new(
            DiskAdapter::new(dir.path().join("upload"), "/uploads")
                .await
                .unwrap(),
        );
        let gateway = MediaGateway::new(
            Backend::Disk(disk.clone()),
            Arc::new(FlatFileCatalog::new(dir.path().join("movies.json"))),
        );
        (gateway, disk, dir)
    }

    fn body(data: &'static [u8]) -> impl Stream<Item = Result<Bytes, io::Error>> {
        futures::stream::iter(vec![Ok(Bytes::from_static(data))])
    }

    fn register_req(key: &str, name: Option<&str>, url: &str) -> RegisterRequest {
        RegisterRequest {
            key: Some(key.into()),
            name: name.map(Into::into),
            url: Some(url.into()),
        }
    }

    #[tokio::test]
    async fn register_rejects_key_colliding_with_another_entry() {
        let (gateway, bucket) = bucket_gateway();
        bucket
            .put("uploads/a b.mp4", Bytes::from_static(b"first"), "video/mp4")
            .await
            .unwrap();
        gateway
            .register(register_req("uploads/a b.mp4", Some("first"), "https://cdn.example/1"))
            .await
            .unwrap();

        let err = gateway
            .register(register_req("uploads/a_b.mp4", Some("second"), "https://cdn.example/2"))
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Validation(_)));

        let listed = gateway.list().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].key, "uploads/a b.mp4");
        assert_eq!(listed[0].name, "first");

        gateway.delete("first").await.unwrap();
        assert!(gateway.list().await.unwrap().is_empty());
        assert!(matches!(
            bucket.get("uploads/a b.mp4").await,
            Err(StorageError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn bucket_mode_end_to_end() {
        let (gateway, bucket) = bucket_gateway();

        let presigned = gateway
            .presign(PresignRequest {
                filename: Some("clip.mov".into()),
                content_type: Some("video/quicktime".into()),
            })
            .await
            .unwrap();
        let suffix = presigned.key.strip_prefix("uploads/").unwrap();
        let (millis, rest) = suffix.split_once('-').unwrap();
        assert!(millis.chars().all(|c| c.is_ascii_digit()) && !millis.is_empty());
        assert_eq!(rest, "clip.mov");
        assert_eq!(
            presigned.public_url,
            format!("https://cdn.example/{}", presigned.key)
        );
        assert!(presigned.upload_url.contains("X-Amz-Expires=900"));

        // client PUTs directly to the bucket
        bucket
            .put(&presigned.key, Bytes::from_static(b"video"), "video/quicktime")
            .await
            .unwrap();

        let url = "https://cdn.example/uploads/123-clip.mov";
        let entry = gateway
            .register(register_req(&presigned.key, Some("clip.mov"), url))
            .await
            .unwrap();
        assert_eq!(entry.name, "clip.mov");

        let listed = gateway.list().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].key, presigned.key);
        assert_eq!(listed[0].name, "clip.mov");
        assert_eq!(listed[0].url, url);

        gateway.delete("clip.mov").await.unwrap();
        assert!(gateway.list().await.unwrap().is_empty());
        assert!(matches!(
            bucket.get(&presigned.key).await,
            Err(StorageError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn register_requires_key_and_url() {
        let (gateway, bucket) = bucket_gateway();
        let missing_url = RegisterRequest {
            key: Some("uploads/1-a.mp4".into()),
            ..Default::default()
        };
        assert!(matches!(
            gateway.register(missing_url).await,
            Err(GatewayError::Validation(_))
        ));
        let empty_key = register_req("", None, "https://cdn.example/x");
        assert!(matches!(
            gateway.register(empty_key).await,
            Err(GatewayError::Validation(_))
        ));
        assert!(bucket.list_by_prefix("").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn repeated_register_keeps_keys_unique() {
        let (gateway, _) = bucket_gateway();
        for name in ["first", "second", "third"] {
            gateway
                .register(register_req("uploads/1-a.mp4", Some(name), "u"))
                .await
                .unwrap();
        }
        gateway
            .register(register_req("uploads/2-b.mp4", None, "u"))
            .await
            .unwrap();
        let listed = gateway.list().await.unwrap();
        let keys: HashSet<_> = listed.iter().map(|e| e.key.as_str()).collect();
        assert_eq!(listed.len(), 2);
        assert_eq!(keys.len(), 2);
    }

    #[tokio::test]
    async fn delete_unknown_is_not_found_and_leaves_catalog() {
        let (gateway, _) = bucket_gateway();
        gateway
            .register(register_req("uploads/1-a.mp4", None, "u"))
            .await
            .unwrap();
        assert!(matches!(
            gateway.delete("nothing.mp4").await,
            Err(GatewayError::NotFound(_))
        ));
        assert_eq!(gateway.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn delete_with_missing_object_still_removes_metadata() {
        let (gateway, _) = bucket_gateway();
        gateway
            .register(register_req("uploads/1-a.mp4", None, "u"))
            .await
            .unwrap();
        gateway.delete("uploads/1-a.mp4").await.unwrap();
        assert!(gateway.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn bucket_listing_skips_malformed_metadata() {
        let (gateway, bucket) = bucket_gateway();
        gateway
            .register(register_req("uploads/1-a.mp4", None, "u"))
            .await
            .unwrap();
        bucket
            .put("meta/junk.json", Bytes::from_static(b"<html>"), "application/json")
            .await
            .unwrap();
        let listed = gateway.list().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].key, "uploads/1-a.mp4");
    }

    #[tokio::test]
    async fn presign_without_bucket_is_not_configured() {
        let (gateway, _disk, _dir) = disk_gateway().await;
        let result = gateway
            .presign(PresignRequest {
                filename: Some("clip.mov".into()),
                content_type: None,
            })
            .await;
        assert!(matches!(result, Err(GatewayError::NotConfigured(_))));
    }

    #[tokio::test]
    async fn presign_requires_filename() {
        let (gateway, _) = bucket_gateway();
        let result = gateway.presign(PresignRequest::default()).await;
        assert!(matches!(result, Err(GatewayError::Validation(_))));
    }

    #[tokio::test]
    async fn disk_mode_lists_only_videos() {
        let (gateway, disk, _dir) = disk_gateway().await;
        for name in ["a.mp4", "b.txt", "c.webm"] {
            std::fs::write(disk.root().join(name), b"x").unwrap();
        }
        let listed = gateway.list().await.unwrap();
        let pairs: Vec<_> = listed
            .iter()
            .map(|e| (e.name.as_str(), e.url.as_str()))
            .collect();
        assert_eq!(
            pairs,
            vec![("a.mp4", "/uploads/a.mp4"), ("c.webm", "/uploads/c.webm")]
        );
    }

    #[tokio::test]
    async fn disk_mode_list_survives_corrupt_catalog_file() {
        let (gateway, disk, dir) = disk_gateway().await;
        std::fs::write(disk.root().join("a.mp4"), b"x").unwrap();
        std::fs::write(dir.path().join("movies.json"), b"[{oops").unwrap();
        let listed = gateway.list().await.unwrap();
        assert_eq!(listed.len(), 1);
    }

    #[tokio::test]
    async fn disk_mode_list_includes_registered_external_entries() {
        let (gateway, disk, _dir) = disk_gateway().await;
        std::fs::write(disk.root().join("a.mp4"), b"x").unwrap();
        gateway
            .register(register_req("a.mp4", None, "/uploads/a.mp4"))
            .await
            .unwrap();
        gateway
            .register(register_req("remote/trailer.mp4", None, "https://cdn.example/t.mp4"))
            .await
            .unwrap();
        let names: Vec<_> = gateway
            .list()
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.name)
            .collect();
        assert_eq!(names, vec!["a.mp4", "trailer.mp4"]);
    }

    #[tokio::test]
    async fn disk_upload_then_delete() {
        let (gateway, disk, _dir) = disk_gateway().await;
        let uploaded = gateway
            .upload(Some("my movie.mp4"), body(b"frames"), 1024)
            .await
            .unwrap();
        assert!(uploaded.name.ends_with("-my_movie.mp4"));
        assert_eq!(uploaded.url, format!("/uploads/{}", uploaded.name));
        assert_eq!(
            disk.get(&uploaded.name).await.unwrap(),
            Bytes::from_static(b"frames")
        );

        gateway.delete(&uploaded.name).await.unwrap();
        assert!(gateway.list().await.unwrap().is_empty());
        assert!(matches!(
            gateway.delete(&uploaded.name).await,
            Err(GatewayError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn disk_upload_rejects_oversize_and_empty() {
        let (gateway, disk, _dir) = disk_gateway().await;
        let too_big = gateway.upload(Some("a.mp4"), body(b"0123456789"), 4).await;
        assert!(matches!(
            too_big,
            Err(GatewayError::PayloadTooLarge { limit: 4 })
        ));
        let empty = gateway.upload(Some("a.mp4"), body(b""), 4).await;
        assert!(matches!(empty, Err(GatewayError::Validation(_))));
        assert!(disk.list_by_prefix("").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn disk_delete_rejects_traversal_names() {
        let (gateway, _disk, dir) = disk_gateway().await;
        std::fs::write(dir.path().join("movies.json"), b"[]").unwrap();
        for name in ["..", "../movies.json"] {
            assert!(matches!(
                gateway.delete(name).await,
                Err(GatewayError::NotFound(_))
            ));
        }
        assert!(dir.path().join("movies.json").exists());
    }

    #[tokio::test]
    async fn direct_upload_in_bucket_mode_is_not_configured() {
        let (gateway, _) = bucket_gateway();
        let result = gateway.upload(Some("a.mp4"), body(b"x"), 10).await;
        assert!(matches!(result, Err(GatewayError::NotConfigured(_))));
    }
}
