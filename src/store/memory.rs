//! In-memory remote store
//!
//! Volatile backend for local development. Follows the same revision rules
//! as the GitHub backend: writes to an existing path and deletes must carry
//! the current blob id.

use std::collections::BTreeMap;
use std::sync::RwLock;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::stream;
use tracing::debug;

use super::{blob_revision, ContentStream, FileDescriptor, RemoteStore, StoreError};

const LOCATOR_SCHEME: &str = "memory://";

#[derive(Debug, Clone)]
struct StoredFile {
    data: Bytes,
    revision: String,
    modified: DateTime<Utc>,
}

/// Remote store that keeps every file in process memory
#[derive(Debug, Default)]
pub struct MemoryStore {
    files: RwLock<BTreeMap<String, StoredFile>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a file without revision checks, returning its descriptor
    pub fn insert(&self, path: &str, data: impl Into<Bytes>) -> FileDescriptor {
        let data = data.into();
        let file = StoredFile {
            revision: blob_revision(&data),
            data,
            modified: Utc::now(),
        };
        let desc = describe(path, &file);
        self.files
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(path.to_string(), file);
        desc
    }

    /// Number of files currently stored
    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.files.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn describe(path: &str, file: &StoredFile) -> FileDescriptor {
    FileDescriptor {
        path: path.to_string(),
        locator: format!("{}{}", LOCATOR_SCHEME, path),
        download_url: None,
        size: file.data.len() as u64,
        revision: file.revision.clone(),
    }
}

/// Whether `path` sits directly under `prefix` (no deeper directories)
fn is_direct_child(prefix: &str, path: &str) -> bool {
    let rest = if prefix.is_empty() {
        path
    } else {
        match path.strip_prefix(prefix).and_then(|r| r.strip_prefix('/')) {
            Some(rest) => rest,
            None => return false,
        }
    };
    !rest.is_empty() && !rest.contains('/')
}

#[async_trait]
impl RemoteStore for MemoryStore {
    async fn fetch_listing(&self, prefix: &str) -> Result<Vec<FileDescriptor>, StoreError> {
        let prefix = prefix.trim_matches('/');
        let files = self.files.read().unwrap_or_else(|e| e.into_inner());
        let listing: Vec<FileDescriptor> = files
            .iter()
            .filter(|(path, _)| is_direct_child(prefix, path))
            .map(|(path, file)| describe(path, file))
            .collect();
        debug!(prefix = prefix, count = listing.len(), "Listed memory store");
        Ok(listing)
    }

    async fn fetch_file(&self, path: &str) -> Result<FileDescriptor, StoreError> {
        let files = self.files.read().unwrap_or_else(|e| e.into_inner());
        files
            .get(path)
            .map(|file| describe(path, file))
            .ok_or_else(|| StoreError::NotFound(path.to_string()))
    }

    async fn fetch_content(&self, locator: &str) -> Result<ContentStream, StoreError> {
        let path = locator
            .strip_prefix(LOCATOR_SCHEME)
            .ok_or_else(|| StoreError::NotFound(locator.to_string()))?;
        let data = {
            let files = self.files.read().unwrap_or_else(|e| e.into_inner());
            files
                .get(path)
                .map(|file| file.data.clone())
                .ok_or_else(|| StoreError::NotFound(path.to_string()))?
        };
        Ok(Box::pin(stream::once(async move { Ok(data) })))
    }

    async fn write_file(
        &self,
        path: &str,
        content: Bytes,
        message: &str,
        revision: Option<&str>,
    ) -> Result<FileDescriptor, StoreError> {
        let mut files = self.files.write().unwrap_or_else(|e| e.into_inner());
        let current = files.get(path).map(|f| f.revision.as_str());
        if current != revision {
            return Err(StoreError::RevisionConflict(path.to_string()));
        }

        let file = StoredFile {
            revision: blob_revision(&content),
            data: content,
            modified: Utc::now(),
        };
        let desc = describe(path, &file);
        files.insert(path.to_string(), file);
        debug!(path = path, revision = %desc.revision, message = message, "Wrote file to memory store");
        Ok(desc)
    }

    async fn delete_file(
        &self,
        path: &str,
        revision: &str,
        message: &str,
    ) -> Result<(), StoreError> {
        let mut files = self.files.write().unwrap_or_else(|e| e.into_inner());
        match files.get(path) {
            None => Err(StoreError::NotFound(path.to_string())),
            Some(file) if file.revision != revision => {
                Err(StoreError::RevisionConflict(path.to_string()))
            }
            Some(_) => {
                files.remove(path);
                debug!(path = path, message = message, "Deleted file from memory store");
                Ok(())
            }
        }
    }

    async fn last_modified(&self, path: &str) -> Result<Option<DateTime<Utc>>, StoreError> {
        let files = self.files.read().unwrap_or_else(|e| e.into_inner());
        Ok(files.get(path).map(|file| file.modified))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::TryStreamExt;

    #[test]
    fn test_is_direct_child() {
        assert!(is_direct_child("", "logo.png"));
        assert!(!is_direct_child("", "media/logo.png"));
        assert!(is_direct_child("media", "media/logo.png"));
        assert!(!is_direct_child("media", "media/icons/a.svg"));
        assert!(!is_direct_child("media", "mediakit/logo.png"));
        assert!(!is_direct_child("media", "media"));
    }

    #[tokio::test]
    async fn test_listing_is_single_depth() {
        let store = MemoryStore::new();
        store.insert("readme.txt", "hi");
        store.insert("media/logo.png", "png");
        store.insert("media/icons/a.svg", "svg");

        let root = store.fetch_listing("").await.unwrap();
        assert_eq!(root.len(), 1);
        assert_eq!(root[0].path, "readme.txt");

        let media = store.fetch_listing("/media/").await.unwrap();
        assert_eq!(media.len(), 1);
        assert_eq!(media[0].path, "media/logo.png");
    }

    #[tokio::test]
    async fn test_write_requires_current_revision() {
        let store = MemoryStore::new();
        let first = store
            .write_file("a.txt", Bytes::from_static(b"one"), "create", None)
            .await
            .unwrap();

        // Overwrite without a revision is rejected
        let err = store
            .write_file("a.txt", Bytes::from_static(b"two"), "update", None)
            .await
            .unwrap_err();
        assert_eq!(err, StoreError::RevisionConflict("a.txt".to_string()));

        let second = store
            .write_file("a.txt", Bytes::from_static(b"two"), "update", Some(&first.revision))
            .await
            .unwrap();
        assert_ne!(first.revision, second.revision);

        // The old revision is now stale
        let err = store
            .delete_file("a.txt", &first.revision, "delete")
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::RevisionConflict(_)));

        store.delete_file("a.txt", &second.revision, "delete").await.unwrap();
        assert_eq!(store.len(), 0);
    }

    #[tokio::test]
    async fn test_delete_missing_is_not_found() {
        let store = MemoryStore::new();
        let err = store.delete_file("gone.txt", "abc", "delete").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_fetch_content_streams_bytes() {
        let store = MemoryStore::new();
        let desc = store.insert("media/logo.png", vec![0x89, b'P', b'N', b'G']);

        let chunks: Vec<Bytes> = store
            .fetch_content(&desc.locator)
            .await
            .unwrap()
            .try_collect()
            .await
            .unwrap();
        assert_eq!(chunks.concat(), vec![0x89, b'P', b'N', b'G']);

        assert!(store.fetch_content("memory://nope").await.is_err());
        assert!(store.fetch_content("https://elsewhere/x").await.is_err());
    }
}
