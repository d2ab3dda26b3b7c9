//! HTTP protocol definitions
//!
//! JSON bodies exchanged with upload clients and the admin console.

use serde::{Deserialize, Serialize};

/// Successful upload
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub success: bool,
    /// Public URL of the stored file
    pub cdn_url: String,
    /// Stored file name
    pub filename: String,
    /// Logical path within the repository
    pub path: String,
}

/// Any failed request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
}

/// Admin listing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileListing {
    pub files: Vec<FileSummary>,
}

/// One file in the admin listing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileSummary {
    pub name: String,
    pub path: String,
    pub size: u64,
    /// Public CDN URL
    pub url: String,
    /// Raw download location in the remote store
    pub download_url: String,
    /// Last commit time (RFC 3339), null when unknown
    pub uploaded_at: Option<String>,
    /// MIME type guessed from the extension
    #[serde(rename = "type")]
    pub kind: String,
    /// Current revision
    pub sha: String,
}

/// Successful delete
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteResponse {
    pub success: bool,
}

/// Service status
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub status: String,
    pub repo: String,
    pub owner: String,
    pub files_in_memory: usize,
    pub cdn_domain: String,
    pub cache_hits: u64,
    pub cache_misses: u64,
    /// Time of the last successful resync (RFC 3339)
    pub last_resync: Option<String>,
}
