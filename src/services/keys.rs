//! Storage key derivation.
//!
//! Every client-supplied name that becomes part of a storage key passes
//! through one of the sanitizers here, so bucket keys, meta keys and disk
//! file names are derived the same way everywhere.

use chrono::Utc;
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};

/// Prefix for raw video objects in bucket mode.
pub const UPLOADS_PREFIX: &str = "uploads/";

/// Prefix for per-entry metadata documents in bucket mode.
pub const META_PREFIX: &str = "meta/";

/// Characters left untouched by `encodeURIComponent`.
const URI_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

/// Replace every character outside `[A-Za-z0-9._-/]` with `_`.
pub fn sanitize_key(input: &str) -> String {
    input
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-' | '/') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Like [`sanitize_key`] but also replaces `/`, yielding a single path
/// component suitable for a file in the upload directory.
pub fn sanitize_filename(input: &str) -> String {
    sanitize_key(input).replace('/', "_")
}

/// `uploads/<epoch-millis>-<sanitized-filename>`
pub fn upload_key(filename: &str) -> String {
    format!(
        "{}{}-{}",
        UPLOADS_PREFIX,
        Utc::now().timestamp_millis(),
        sanitize_key(filename)
    )
}

/// `<epoch-millis>-<sanitized-filename>` for direct disk uploads.
pub fn disk_upload_name(original: &str) -> String {
    format!(
        "{}-{}",
        Utc::now().timestamp_millis(),
        sanitize_filename(original)
    )
}

/// `meta/<sanitized-key>.json`
pub fn meta_key(key: &str) -> String {
    format!("{}{}.json", META_PREFIX, sanitize_key(key))
}

/// Percent-encode with `encodeURIComponent` semantics.
pub fn encode_component(value: &str) -> String {
    utf8_percent_encode(value, URI_COMPONENT).to_string()
}

/// Public playback path for a file served from the upload directory.
pub fn disk_public_url(public_prefix: &str, name: &str) -> String {
    format!(
        "{}/{}",
        public_prefix.trim_end_matches('/'),
        encode_component(name)
    )
}
