//! Remote store adapter
//!
//! The contract between the CDN and its durable backing store: one logical
//! repository addressed by slash-separated paths, where every file carries a
//! revision token that must be presented to overwrite or delete it.

pub mod errors;
pub mod memory;

#[cfg(test)]
pub mod testing;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use sha1::{Digest, Sha1};

pub use errors::StoreError;
pub use memory::MemoryStore;

/// Raw file bytes streamed from the remote store
pub type ContentStream = BoxStream<'static, Result<Bytes, StoreError>>;

/// A file as the remote store describes it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDescriptor {
    /// Logical path, no leading or trailing slash
    pub path: String,
    /// Opaque locator accepted by [`RemoteStore::fetch_content`]
    pub locator: String,
    /// Public raw download link, when the store offers one separate from the locator
    pub download_url: Option<String>,
    /// Size in bytes
    pub size: u64,
    /// Revision token required to overwrite or delete this file
    pub revision: String,
}

/// Durable read/write/delete of file content, keyed by path
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// List the files directly under `prefix` (one level, files only)
    async fn fetch_listing(&self, prefix: &str) -> Result<Vec<FileDescriptor>, StoreError>;

    /// Describe a single file by its exact path
    async fn fetch_file(&self, path: &str) -> Result<FileDescriptor, StoreError>;

    /// Stream the raw bytes behind a locator
    async fn fetch_content(&self, locator: &str) -> Result<ContentStream, StoreError>;

    /// Create or overwrite a file
    ///
    /// `revision` must be the current revision when the path already exists.
    async fn write_file(
        &self,
        path: &str,
        content: Bytes,
        message: &str,
        revision: Option<&str>,
    ) -> Result<FileDescriptor, StoreError>;

    /// Delete a file at its current revision
    async fn delete_file(&self, path: &str, revision: &str, message: &str)
        -> Result<(), StoreError>;

    /// Time of the most recent change to `path`, if the store has any history for it
    async fn last_modified(&self, path: &str) -> Result<Option<DateTime<Utc>>, StoreError>;
}

/// Git blob id of `data`: `sha1("blob <len>\0" ++ data)` as lowercase hex
pub fn blob_revision(data: &[u8]) -> String {
    let mut hasher = Sha1::new();
    hasher.update(format!("blob {}\0", data.len()).as_bytes());
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}
