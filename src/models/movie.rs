//! Represents a published video and the request/response bodies of the
//! catalog API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single published video in the catalog.
///
/// The `key` identifies the stored bytes (object key in bucket mode, file
/// name in disk mode) and is unique across the catalog.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct MovieEntry {
    /// Storage identifier of the video bytes.
    pub key: String,

    /// Display name shown in the gallery.
    pub name: String,

    /// Publicly resolvable playback URL.
    pub url: String,

    /// When the entry was registered. Entries synthesized from a directory
    /// scan carry the file's modification time when the filesystem reports one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl MovieEntry {
    /// Build a freshly registered entry, defaulting the display name to the
    /// trailing path segment of `key`.
    pub fn register(key: String, name: Option<String>, url: String) -> Self {
        let name = name
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| default_name(&key).to_string());
        Self {
            key,
            name,
            url,
            created_at: Some(Utc::now()),
        }
    }

    /// Whether this entry is addressed by `name`: exact key, exact display
    /// name, or the key's segment after the last `/`.
    pub fn matches(&self, name: &str) -> bool {
        self.key == name || self.name == name || default_name(&self.key) == name
    }
}

/// Trailing segment of a key after its last `/`.
pub fn default_name(key: &str) -> &str {
    key.rsplit('/').next().unwrap_or(key)
}

/// Body of `POST /api/presign`.
#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PresignRequest {
    pub filename: Option<String>,
    pub content_type: Option<String>,
}

/// Response of `POST /api/presign`.
#[derive(Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PresignResponse {
    pub upload_url: String,
    pub public_url: String,
    pub key: String,
}

/// Body of `POST /api/register`.
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct RegisterRequest {
    pub key: Option<String>,
    pub name: Option<String>,
    pub url: Option<String>,
}

/// Response of `POST /api/register`.
#[derive(Debug, Deserialize, Serialize)]
pub struct RegisterResponse {
    pub success: bool,
    #[serde(flatten)]
    pub entry: MovieEntry,
}

/// Response of `POST /api/upload`.
#[derive(Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct UploadResponse {
    pub name: String,
    pub url: String,
}

/// Response of `DELETE /api/movies/{name}`.
#[derive(Debug, Deserialize, Serialize)]
pub struct DeleteResponse {
    pub success: bool,
}
