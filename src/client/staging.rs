//! Local staging of videos before they are published.

use crate::client::publish::ClientError;
use crate::client::thumbnail::{CoverArt, Thumbnailer};
use crate::client::transcode::{Transcoder, drive};
use bytes::Bytes;
use std::{
    collections::HashMap,
    path::Path,
    sync::{PoisonError, RwLock},
};
use uuid::Uuid;

pub const MP4_CONTENT_TYPE: &str = "video/mp4";
const FALLBACK_CONTENT_TYPE: &str = "application/octet-stream";

/// A video held locally, possibly already published.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedVideo {
    pub id: String,
    pub name: String,
    pub content_type: String,
    pub bytes: Bytes,
    /// Public URL once the video has been published.
    pub url: Option<String>,
    /// Poster image, when one could be produced.
    pub thumbnail: Option<Bytes>,
}

/// Key-value store of staged videos, keyed by id.
pub trait StagingCache: Send + Sync {
    fn put(&self, video: StagedVideo);
    fn get(&self, id: &str) -> Option<StagedVideo>;
    fn remove(&self, id: &str) -> Option<StagedVideo>;
    fn list(&self) -> Vec<StagedVideo>;
}

/// In-process cache; contents vanish with the process.
#[derive(Default)]
pub struct MemoryStagingCache {
    videos: RwLock<HashMap<String, StagedVideo>>,
}

impl StagingCache for MemoryStagingCache {
    fn put(&self, video: StagedVideo) {
        self.videos
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(video.id.clone(), video);
    }

    fn get(&self, id: &str) -> Option<StagedVideo> {
        self.videos
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
    }

    fn remove(&self, id: &str) -> Option<StagedVideo> {
        self.videos
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id)
    }

    fn list(&self) -> Vec<StagedVideo> {
        let mut videos: Vec<_> = self
            .videos
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        videos.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
        videos
    }
}

/// Staging cache paired with the transcoder used to normalise to MP4.
pub struct StagingArea<C, T> {
    cache: C,
    transcoder: T,
    thumbnailer: Box<dyn Thumbnailer>,
}

impl<C: StagingCache, T: Transcoder> StagingArea<C, T> {
    /// Thumbnails default to embedded cover art.
    pub fn new(cache: C, transcoder: T) -> Self {
        Self {
            cache,
            transcoder,
            thumbnailer: Box::new(CoverArt),
        }
    }

    pub fn with_thumbnailer(mut self, thumbnailer: impl Thumbnailer + 'static) -> Self {
        self.thumbnailer = Box::new(thumbnailer);
        self
    }

    pub fn cache(&self) -> &C {
        &self.cache
    }

    /// Stage in-memory bytes under a fresh id.
    pub fn stage(&self, name: &str, content_type: &str, bytes: Bytes) -> StagedVideo {
        let video = StagedVideo {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            content_type: content_type.to_string(),
            thumbnail: self.thumbnailer.thumbnail(&bytes),
            bytes,
            url: None,
        };
        self.cache.put(video.clone());
        video
    }

    /// Read a local file and stage it. The name defaults to the file name.
    pub async fn stage_file(&self, path: &Path, name: Option<&str>) -> Result<StagedVideo, ClientError> {
        let bytes = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("upload.mp4");
        let name = name.filter(|n| !n.trim().is_empty()).unwrap_or(file_name);
        Ok(self.stage(name, content_type_for(path), Bytes::from(bytes)))
    }

    /// Convert a staged video to MP4 in place.
    ///
    /// On failure the original bytes stay staged and the reason is returned.
    pub fn transcode(&self, id: &str, observer: impl FnMut(u8)) -> Result<StagedVideo, ClientError> {
        let mut video = self
            .cache
            .get(id)
            .ok_or_else(|| ClientError::NotStaged(id.to_string()))?;
        let output =
            drive(self.transcoder.start(video.bytes.clone()), observer).map_err(ClientError::Transcode)?;
        video.thumbnail = self.thumbnailer.thumbnail(&output).or(video.thumbnail);
        video.bytes = output;
        video.content_type = MP4_CONTENT_TYPE.to_string();
        self.cache.put(video.clone());
        Ok(video)
    }

    /// Record the public URL of a published video.
    pub fn mark_published(&self, id: &str, url: &str) -> Result<StagedVideo, ClientError> {
        let mut video = self
            .cache
            .get(id)
            .ok_or_else(|| ClientError::NotStaged(id.to_string()))?;
        video.url = Some(url.to_string());
        self.cache.put(video.clone());
        Ok(video)
    }
}

/// Whether a browser `<video>` element can play this type without conversion.
pub fn is_browser_playable(content_type: &str) -> bool {
    matches!(content_type, "video/mp4" | "video/webm" | "video/ogg")
}

/// Content type from the file extension.
pub fn content_type_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match ext.as_deref() {
        Some("mp4" | "m4v") => MP4_CONTENT_TYPE,
        Some("webm") => "video/webm",
        Some("ogg" | "ogv") => "video/ogg",
        Some("mov") => "video/quicktime",
        Some("mkv") => "video/x-matroska",
        Some("avi") => "video/x-msvideo",
        _ => FALLBACK_CONTENT_TYPE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::thumbnail::test_support::mp4_with_cover;
    use crate::client::transcode::{Passthrough, TranscodeEvent};
    use std::path::PathBuf;

    struct Scripted(Vec<TranscodeEvent>);

    impl Transcoder for Scripted {
        type Job = std::vec::IntoIter<TranscodeEvent>;

        fn start(&self, _input: Bytes) -> Self::Job {
            self.0.clone().into_iter()
        }
    }

    fn area(events: Vec<TranscodeEvent>) -> StagingArea<MemoryStagingCache, Scripted> {
        StagingArea::new(MemoryStagingCache::default(), Scripted(events))
    }

    #[test]
    fn memory_cache_put_get_remove_list() {
        let cache = MemoryStagingCache::default();
        let video = StagedVideo {
            id: "1".into(),
            name: "b.mp4".into(),
            content_type: MP4_CONTENT_TYPE.into(),
            bytes: Bytes::from_static(b"x"),
            url: None,
            thumbnail: None,
        };
        cache.put(video.clone());
        cache.put(StagedVideo {
            id: "2".into(),
            name: "a.mp4".into(),
            ..video.clone()
        });

        assert_eq!(cache.get("1"), Some(video.clone()));
        let names: Vec<_> = cache.list().into_iter().map(|v| v.name).collect();
        assert_eq!(names, vec!["a.mp4", "b.mp4"]);
        assert_eq!(cache.remove("1"), Some(video));
        assert!(cache.get("1").is_none());
        assert_eq!(cache.list().len(), 1);
    }

    #[test]
    fn transcode_replaces_bytes_and_type() {
        let staging = area(vec![
            TranscodeEvent::Progress(0),
            TranscodeEvent::Progress(50),
            TranscodeEvent::Finished(Bytes::from_static(b"mp4")),
        ]);
        let staged = staging.stage("clip.mkv", "video/x-matroska", Bytes::from_static(b"mkv"));

        let mut seen = Vec::new();
        let out = staging.transcode(&staged.id, |p| seen.push(p)).unwrap();
        assert_eq!(out.bytes, Bytes::from_static(b"mp4"));
        assert_eq!(out.content_type, MP4_CONTENT_TYPE);
        assert_eq!(out.name, "clip.mkv");
        assert_eq!(seen, vec![0, 50, 100]);
        assert_eq!(staging.cache().get(&staged.id), Some(out));
    }

    #[test]
    fn failed_transcode_keeps_original() {
        let staging = area(vec![TranscodeEvent::Failed("unsupported codec".into())]);
        let staged = staging.stage("clip.mkv", "video/x-matroska", Bytes::from_static(b"mkv"));

        let err = staging.transcode(&staged.id, |_| {}).unwrap_err();
        assert!(matches!(err, ClientError::Transcode(reason) if reason == "unsupported codec"));
        assert_eq!(staging.cache().get(&staged.id), Some(staged));
    }

    #[test]
    fn unknown_id_is_reported() {
        let staging = area(vec![]);
        assert!(matches!(
            staging.transcode("missing", |_| {}),
            Err(ClientError::NotStaged(_))
        ));
        assert!(matches!(
            staging.mark_published("missing", "/uploads/x"),
            Err(ClientError::NotStaged(_))
        ));
    }

    #[tokio::test]
    async fn stage_file_uses_file_name_and_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Holiday.MOV");
        let mut data = vec![0, 0, 0, 20];
        data.extend_from_slice(b"ftypqt  ");
        tokio::fs::write(&path, &data).await.unwrap();

        let staging = StagingArea::new(MemoryStagingCache::default(), Passthrough);
        let staged = staging.stage_file(&path, None).await.unwrap();
        assert_eq!(staged.name, "Holiday.MOV");
        assert_eq!(staged.content_type, "video/quicktime");
        assert!(!is_browser_playable(&staged.content_type));

        let converted = staging.transcode(&staged.id, |_| {}).unwrap();
        assert_eq!(converted.content_type, MP4_CONTENT_TYPE);

        let published = staging.mark_published(&staged.id, "/uploads/1-Holiday.MOV").unwrap();
        assert_eq!(published.url.as_deref(), Some("/uploads/1-Holiday.MOV"));
    }

    #[test]
    fn content_types_by_extension() {
        assert_eq!(content_type_for(&PathBuf::from("a.webm")), "video/webm");
        assert_eq!(content_type_for(&PathBuf::from("a.M4V")), MP4_CONTENT_TYPE);
        assert_eq!(content_type_for(&PathBuf::from("a")), "application/octet-stream");
    }

    struct FixedPoster(&'static [u8]);

    impl Thumbnailer for FixedPoster {
        fn thumbnail(&self, video: &[u8]) -> Option<Bytes> {
            video.starts_with(b"mp4").then(|| Bytes::from_static(self.0))
        }
    }

    #[test]
    fn staging_extracts_cover_art_thumbnail() {
        let jpeg: &[u8] = &[0xFF, 0xD8, 0xFF, 0xE0, 9, 9];
        let staging = StagingArea::new(MemoryStagingCache::default(), Passthrough);

        let with_cover = staging.stage("a.mp4", MP4_CONTENT_TYPE, Bytes::from(mp4_with_cover(jpeg)));
        assert_eq!(with_cover.thumbnail, Some(Bytes::from_static(jpeg)));
        assert_eq!(staging.cache().get(&with_cover.id).unwrap().thumbnail, with_cover.thumbnail);

        let bare = staging.stage("b.mp4", MP4_CONTENT_TYPE, Bytes::from_static(b"no cover"));
        assert!(bare.thumbnail.is_none());
    }

    #[test]
    fn transcode_refreshes_thumbnail_best_effort() {
        let staging = area(vec![TranscodeEvent::Finished(Bytes::from_static(b"mp4 out"))])
            .with_thumbnailer(FixedPoster(b"poster"));
        let staged = staging.stage("clip.mkv", "video/x-matroska", Bytes::from_static(b"mkv"));
        assert!(staged.thumbnail.is_none());

        let out = staging.transcode(&staged.id, |_| {}).unwrap();
        assert_eq!(out.thumbnail, Some(Bytes::from_static(b"poster")));

        // a failed transcode leaves the staged record, thumbnail included, alone
        let failing = area(vec![TranscodeEvent::Failed("boom".into())])
            .with_thumbnailer(FixedPoster(b"poster"));
        let kept = failing.stage("clip.mp4", MP4_CONTENT_TYPE, Bytes::from_static(b"mp4 in"));
        assert!(failing.transcode(&kept.id, |_| {}).is_err());
        assert_eq!(failing.cache().get(&kept.id).unwrap().thumbnail, kept.thumbnail);
    }
}
