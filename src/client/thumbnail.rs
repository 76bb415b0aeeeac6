//! Poster images for staged videos.
//!
//! Thumbnails are best-effort: a thumbnailer that cannot produce an image
//! returns `None` and staging carries on without one.

use bytes::Bytes;

pub trait Thumbnailer: Send + Sync {
    fn thumbnail(&self, video: &[u8]) -> Option<Bytes>;
}

/// Pulls embedded cover art (`covr` atom) out of MP4/MOV files.
///
/// Only JPEG and PNG payloads are returned.
#[derive(Debug, Default, Clone, Copy)]
pub struct CoverArt;

const JPEG_MAGIC: &[u8] = &[0xFF, 0xD8, 0xFF];
const PNG_MAGIC: &[u8] = b"\x89PNG\r\n\x1a\n";

/// `data` box header: size, type, type indicator, locale.
const DATA_HEADER_LEN: usize = 16;

impl Thumbnailer for CoverArt {
    fn thumbnail(&self, video: &[u8]) -> Option<Bytes> {
        let covr = find(video, b"covr")?;
        // `data` follows `covr` as its first child box
        let data_type = covr + 4 + find(video.get(covr + 4..covr + 4 + 16)?, b"data")?;
        let box_start = data_type.checked_sub(4)?;
        let size_bytes: [u8; 4] = video.get(box_start..data_type)?.try_into().ok()?;
        let size = u32::from_be_bytes(size_bytes) as usize;
        let payload = video.get(box_start + DATA_HEADER_LEN..box_start.checked_add(size)?)?;
        if payload.starts_with(JPEG_MAGIC) || payload.starts_with(PNG_MAGIC) {
            Some(Bytes::copy_from_slice(payload))
        } else {
            None
        }
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}
