//! Local filesystem backend.
//!
//! Objects are plain files beneath `root`, addressed by their key. Writes go
//! to a temporary file first and are renamed into place, so a reader never
//! observes a half-written video.

use crate::models::movie::MovieEntry;
use crate::services::keys;
use crate::services::storage::{BackendKind, StorageAdapter, StorageError, StorageResult};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::{Stream, StreamExt, pin_mut};
use std::{
    io::{self, ErrorKind},
    path::{Path, PathBuf},
    time::Duration,
};
use tokio::{
    fs::{self, File},
    io::AsyncWriteExt,
};
use tracing::debug;
use uuid::Uuid;

const MAX_KEY_LEN: usize = 1024;
const TMP_PREFIX: &str = ".tmp-";

/// Extensions listed by the public gallery in disk mode.
pub const VIDEO_EXTENSIONS: [&str; 3] = ["mp4", "webm", "ogg"];

/// Filesystem-backed storage adapter.
#[derive(Debug, Clone)]
pub struct DiskAdapter {
    root: PathBuf,
    public_prefix: String,
}

impl DiskAdapter {
    /// Create the adapter, making sure `root` exists.
    ///
    /// `public_prefix` is the URL path the directory is served under
    /// (e.g. `/uploads`).
    pub async fn new(root: impl Into<PathBuf>, public_prefix: &str) -> StorageResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root).await?;
        Ok(Self {
            root,
            public_prefix: public_prefix.to_string(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Reject keys that could escape `root`.
    fn key_to_path(&self, key: &str) -> StorageResult<PathBuf> {
        if key.is_empty() || key.len() > MAX_KEY_LEN {
            return Err(StorageError::InvalidKey(key.to_string()));
        }
        if key.starts_with('/')
            || key.split('/').any(|part| part.is_empty() || part == "." || part == "..")
        {
            return Err(StorageError::InvalidKey(key.to_string()));
        }
        if key
            .bytes()
            .any(|b| b.is_ascii_control() || b == b'\\' || b == b'\0')
        {
            return Err(StorageError::InvalidKey(key.to_string()));
        }
        Ok(self.root.join(key))
    }

    /// Stream a body into `key`, failing once more than `limit` bytes arrive.
    ///
    /// The partial temp file is removed on any error, including overflow.
    pub async fn put_stream<S, E>(&self, key: &str, stream: S, limit: u64) -> StorageResult<u64>
    where
        S: Stream<Item = Result<Bytes, E>>,
        E: std::error::Error + Send + Sync + 'static,
    {
        let file_path = self.key_to_path(key)?;
        let parent = file_path
            .parent()
            .map(Path::to_path_buf)
            .ok_or_else(|| StorageError::InvalidKey(key.to_string()))?;
        fs::create_dir_all(&parent).await?;
        let tmp_path = parent.join(format!("{}{}", TMP_PREFIX, Uuid::new_v4()));
        let mut file = File::create(&tmp_path).await?;

        let mut size_bytes: u64 = 0;
        pin_mut!(stream);
        while let Some(chunk_res) = stream.next().await {
            let chunk = match chunk_res {
                Ok(chunk) => chunk,
                Err(err) => {
                    let _ = fs::remove_file(&tmp_path).await;
                    return Err(StorageError::Io(io::Error::new(ErrorKind::Other, err)));
                }
            };
            size_bytes += chunk.len() as u64;
            if size_bytes > limit {
                let _ = fs::remove_file(&tmp_path).await;
                return Err(StorageError::TooLarge { limit });
            }
            if let Err(err) = file.write_all(&chunk).await {
                let _ = fs::remove_file(&tmp_path).await;
                return Err(StorageError::Io(err));
            }
        }
        if let Err(err) = file.sync_all().await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(StorageError::Io(err));
        }
        drop(file);

        if let Err(err) = fs::rename(&tmp_path, &file_path).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(StorageError::Io(err));
        }

        debug!(key = %key, size_bytes, "stored file");
        Ok(size_bytes)
    }

    /// Directory scan of playable files, sorted by name.
    pub async fn list_videos(&self) -> StorageResult<Vec<MovieEntry>> {
        let mut entries = Vec::new();
        let mut dir = fs::read_dir(&self.root).await?;
        while let Some(item) = dir.next_entry().await? {
            let Ok(name) = item.file_name().into_string() else {
                continue;
            };
            if !is_video(&name) {
                continue;
            }
            let metadata = match item.metadata().await {
                Ok(metadata) if metadata.is_file() => metadata,
                _ => continue,
            };
            let created_at = metadata.modified().ok().map(DateTime::<Utc>::from);
            entries.push(MovieEntry {
                key: name.clone(),
                url: self.public_url(&name),
                name,
                created_at,
            });
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }
}

/// Whether `name` has one of the accepted video extensions (any case).
pub fn is_video(name: &str) -> bool {
    match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => VIDEO_EXTENSIONS
            .iter()
            .any(|candidate| candidate.eq_ignore_ascii_case(ext)),
        _ => false,
    }
}

#[async_trait]
impl StorageAdapter for DiskAdapter {
    async fn put(&self, key: &str, data: Bytes, _content_type: &str) -> StorageResult<()> {
        let len = data.len() as u64;
        let stream = futures::stream::once(async move { Ok::<_, io::Error>(data) });
        self.put_stream(key, stream, len).await?;
        Ok(())
    }

    async fn presign_put(
        &self,
        _key: &str,
        _content_type: &str,
        _ttl: Duration,
    ) -> StorageResult<String> {
        Err(StorageError::Unsupported(BackendKind::Disk))
    }

    async fn get(&self, key: &str) -> StorageResult<Bytes> {
        let path = self.key_to_path(key)?;
        match fs::read(&path).await {
            Ok(data) => Ok(Bytes::from(data)),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                Err(StorageError::NotFound(key.to_string()))
            }
            Err(err) => Err(StorageError::Io(err)),
        }
    }

    async fn list_by_prefix(&self, prefix: &str) -> StorageResult<Vec<String>> {
        let mut keys = Vec::new();
        let mut dir = fs::read_dir(&self.root).await?;
        while let Some(item) = dir.next_entry().await? {
            let Ok(name) = item.file_name().into_string() else {
                continue;
            };
            if name.starts_with(TMP_PREFIX) || !name.starts_with(prefix) {
                continue;
            }
            if item.file_type().await.map(|t| t.is_file()).unwrap_or(false) {
                keys.push(name);
            }
        }
        keys.sort();
        Ok(keys)
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        let path = self.key_to_path(key)?;
        match fs::remove_file(&path).await {
            Ok(_) => {
                debug!("removed file {}", path.display());
                Ok(())
            }
            Err(err) if err.kind() == ErrorKind::NotFound => {
                Err(StorageError::NotFound(key.to_string()))
            }
            Err(err) => Err(StorageError::Io(err)),
        }
    }

    fn public_url(&self, key: &str) -> String {
        keys::disk_public_url(&self.public_prefix, key)
    }

    fn kind(&self) -> BackendKind {
        BackendKind::Disk
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    async fn adapter(dir: &Path) -> DiskAdapter {
        DiskAdapter::new(dir.join("upload"), "/uploads").await.unwrap()
    }

    #[tokio::test]
    async fn put_get_overwrite_delete() {
        let dir = tempdir().unwrap();
        let disk = adapter(dir.path()).await;

        disk.put("a.mp4", Bytes::from_static(b"one"), "video/mp4")
            .await
            .unwrap();
        disk.put("a.mp4", Bytes::from_static(b"two"), "video/mp4")
            .await
            .unwrap();
        assert_eq!(disk.get("a.mp4").await.unwrap(), Bytes::from_static(b"two"));

        disk.delete("a.mp4").await.unwrap();
        assert!(matches!(
            disk.get("a.mp4").await,
            Err(StorageError::NotFound(_))
        ));
        assert!(matches!(
            disk.delete("a.mp4").await,
            Err(StorageError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn presign_is_unsupported() {
        let dir = tempdir().unwrap();
        let disk = adapter(dir.path()).await;
        let result = disk
            .presign_put("a.mp4", "video/mp4", Duration::from_secs(900))
            .await;
        assert!(matches!(
            result,
            Err(StorageError::Unsupported(BackendKind::Disk))
        ));
    }

    #[tokio::test]
    async fn traversal_keys_rejected() {
        let dir = tempdir().unwrap();
        let disk = adapter(dir.path()).await;
        for key in ["../secret", "/etc/passwd", "a/../../b", "..", "a\\b", ""] {
            assert!(
                matches!(disk.get(key).await, Err(StorageError::InvalidKey(_))),
                "key {:?}",
                key
            );
        }
    }

    #[tokio::test]
    async fn put_stream_enforces_limit_and_cleans_up() {
        let dir = tempdir().unwrap();
        let disk = adapter(dir.path()).await;
        let chunks = vec![
            Ok::<_, io::Error>(Bytes::from_static(b"12345")),
            Ok(Bytes::from_static(b"67890")),
        ];
        let result = disk
            .put_stream("big.mp4", futures::stream::iter(chunks), 8)
            .await;
        assert!(matches!(result, Err(StorageError::TooLarge { limit: 8 })));
        assert!(disk.list_by_prefix("").await.unwrap().is_empty());
        let leftovers = std::fs::read_dir(disk.root()).unwrap().count();
        assert_eq!(leftovers, 0);
    }

    #[tokio::test]
    async fn list_videos_filters_extensions_and_encodes_urls() {
        let dir = tempdir().unwrap();
        let disk = adapter(dir.path()).await;
        for name in ["c.webm", "b.txt", "a.mp4", "d e.OGG", ".mp4"] {
            std::fs::write(disk.root().join(name), b"x").unwrap();
        }
        std::fs::create_dir(disk.root().join("folder.mp4")).unwrap();

        let videos = disk.list_videos().await.unwrap();
        let names: Vec<_> = videos.iter().map(|v| v.name.as_str()).collect();
        assert_eq!(names, vec!["a.mp4", "c.webm", "d e.OGG"]);
        assert_eq!(videos[2].url, "/uploads/d%20e.OGG");
        assert_eq!(videos[0].key, "a.mp4");
    }

    #[tokio::test]
    async fn list_by_prefix_skips_temp_files() {
        let dir = tempdir().unwrap();
        let disk = adapter(dir.path()).await;
        std::fs::write(disk.root().join("x-1.mp4"), b"x").unwrap();
        std::fs::write(disk.root().join("y-1.mp4"), b"x").unwrap();
        std::fs::write(disk.root().join(".tmp-abc"), b"x").unwrap();
        assert_eq!(disk.list_by_prefix("x-").await.unwrap(), vec!["x-1.mp4"]);
        assert_eq!(disk.list_by_prefix("").await.unwrap().len(), 2);
    }
}
