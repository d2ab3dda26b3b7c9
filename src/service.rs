//! CDN operations
//!
//! Glue between requests, the metadata cache and the remote store: uploads
//! write through to the store and then the cache, reads consult the cache
//! and populate it on a miss, deletes remove from both.

use std::sync::Arc;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use tracing::{debug, info, warn};

use crate::cache::{CacheEntry, CdnBase, MetadataCache, ModifiedTimeCache, ResyncOutcome, Resyncer};
use crate::store::{ContentStream, RemoteStore, StoreError};

/// Parallel commit-history lookups during an admin listing
const LISTING_CONCURRENCY: usize = 8;

/// Paths answered by fixed HTTP routes, so a file stored there could never be served
const RESERVED_PATHS: &[&str] = &["upload", "admin/files", "api/status"];

/// Errors from request-scoped operations
#[derive(Debug, thiserror::Error)]
pub enum CdnError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// An upload as received from a client
#[derive(Debug, Clone)]
pub struct UploadRequest {
    /// File name supplied by the client
    pub file_name: String,
    pub data: Bytes,
    /// Replacement base name; the original extension is kept
    pub custom_name: Option<String>,
    /// Destination directory; the catch-all upload directory when absent
    pub path: Option<String>,
}

/// A completed upload
#[derive(Debug, Clone)]
pub struct Uploaded {
    pub cdn_url: String,
    pub filename: String,
    pub path: String,
}

/// A file ready to stream to a client
pub struct ServedFile {
    pub path: String,
    pub size: u64,
    pub revision: String,
    pub body: ContentStream,
}

impl std::fmt::Debug for ServedFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServedFile")
            .field("path", &self.path)
            .field("size", &self.size)
            .field("revision", &self.revision)
            .finish_non_exhaustive()
    }
}

/// One row of the admin listing
#[derive(Debug, Clone)]
pub struct ListedFile {
    pub entry: CacheEntry,
    /// Last commit time, `None` when the lookup failed or there is no history
    pub uploaded_at: Option<DateTime<Utc>>,
}

/// Point-in-time cache figures for the status endpoint
#[derive(Debug, Clone)]
pub struct CacheStatus {
    pub files_in_memory: usize,
    pub hits: u64,
    pub misses: u64,
    pub last_resync: Option<DateTime<Utc>>,
}

/// Upload, serve, list and delete on top of the cache and remote store
pub struct CdnService {
    store: Arc<dyn RemoteStore>,
    cache: Arc<MetadataCache>,
    resyncer: Arc<Resyncer>,
    times: ModifiedTimeCache,
    base: CdnBase,
    /// Catch-all directory for uploads without a path
    upload_dir: String,
}

impl CdnService {
    pub fn new(
        store: Arc<dyn RemoteStore>,
        cache: Arc<MetadataCache>,
        resyncer: Arc<Resyncer>,
        base: CdnBase,
        upload_dir: &str,
    ) -> Self {
        Self {
            store,
            cache,
            resyncer,
            times: ModifiedTimeCache::new(),
            base,
            upload_dir: upload_dir.trim_matches('/').to_string(),
        }
    }

    pub fn cdn_base(&self) -> &CdnBase {
        &self.base
    }

    /// Full resync of the cache from the remote listing
    pub async fn resync(&self) -> ResyncOutcome {
        self.resyncer.resync().await
    }

    /// Commit a file to the remote store and index it
    pub async fn upload(&self, request: UploadRequest) -> Result<Uploaded, CdnError> {
        let dir = sanitize_dir(request.path.as_deref(), &self.upload_dir)?;
        let filename = file_name_for(&request.file_name, request.custom_name.as_deref())?;
        let path = join_path(&dir, &filename);
        if RESERVED_PATHS.contains(&path.as_str()) {
            return Err(CdnError::Validation(format!("path '{}' is reserved", path)));
        }

        let revision = self.current_revision(&path).await?;
        let message = format!("Upload {}", path);

        let desc = match self
            .store
            .write_file(&path, request.data, &message, revision.as_deref())
            .await
        {
            Ok(desc) => desc,
            Err(e @ StoreError::RevisionConflict(_)) => {
                self.refresh_entry(&path).await;
                return Err(e.into());
            }
            Err(e) => return Err(e.into()),
        };

        let entry = CacheEntry::from_descriptor(desc, &self.base);
        let cdn_url = entry.public_url.clone();
        self.cache.put(entry);
        self.times.invalidate(&path);

        info!(path = %path, url = %cdn_url, "Uploaded file");
        Ok(Uploaded {
            cdn_url,
            filename,
            path,
        })
    }

    /// Resolve a request path and open its content stream, populating the
    /// cache from the remote store on a miss
    pub async fn serve(&self, request_path: &str) -> Result<ServedFile, CdnError> {
        let path = normalize_request_path(request_path)
            .ok_or_else(|| StoreError::NotFound(request_path.to_string()))?;

        let entry = match self.cache.get(&path) {
            Some(entry) => entry,
            None => {
                let desc = self.store.fetch_file(&path).await?;
                let entry = CacheEntry::from_descriptor(desc, &self.base);
                debug!(path = %path, "Populated cache from remote store");
                self.cache.put(entry.clone());
                entry
            }
        };

        let body = match self.store.fetch_content(&entry.remote_location).await {
            Ok(body) => body,
            Err(e @ StoreError::NotFound(_)) => {
                // The cached entry outlived the remote file
                self.cache.remove(&path);
                return Err(e.into());
            }
            Err(e) => return Err(e.into()),
        };

        Ok(ServedFile {
            path,
            size: entry.size,
            revision: entry.revision,
            body,
        })
    }

    /// Every cached file with its last commit time. A failed lookup only
    /// blanks that file's time.
    pub async fn list(&self) -> Vec<ListedFile> {
        let entries = self.cache.list();
        stream::iter(entries)
            .map(|entry| async move {
                let uploaded_at = self.modified_time(&entry.path).await;
                ListedFile { entry, uploaded_at }
            })
            .buffered(LISTING_CONCURRENCY)
            .collect()
            .await
    }

    /// Delete a file remotely at its latest known revision, then unindex it
    pub async fn delete(&self, request_path: &str) -> Result<(), CdnError> {
        let path = normalize_request_path(request_path)
            .ok_or_else(|| StoreError::NotFound(request_path.to_string()))?;

        let revision = match self.cache.get(&path) {
            Some(entry) => entry.revision,
            None => self.store.fetch_file(&path).await?.revision,
        };

        let message = format!("Delete {}", path);
        match self.store.delete_file(&path, &revision, &message).await {
            Ok(()) => {
                self.cache.remove(&path);
                self.times.invalidate(&path);
                info!(path = %path, "Deleted file");
                Ok(())
            }
            Err(e @ StoreError::NotFound(_)) => {
                self.cache.remove(&path);
                Err(e.into())
            }
            Err(e @ StoreError::RevisionConflict(_)) => {
                self.refresh_entry(&path).await;
                Err(e.into())
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn cache_status(&self) -> CacheStatus {
        let (hits, misses, _) = self.cache.stats();
        CacheStatus {
            files_in_memory: self.cache.len(),
            hits,
            misses,
            last_resync: self.cache.last_resync(),
        }
    }

    /// Revision to present when writing `path`: cached, else looked up remotely
    async fn current_revision(&self, path: &str) -> Result<Option<String>, CdnError> {
        if let Some(entry) = self.cache.get(path) {
            return Ok(Some(entry.revision));
        }
        match self.store.fetch_file(path).await {
            Ok(desc) => Ok(Some(desc.revision)),
            Err(StoreError::NotFound(_)) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Re-read one path after a revision conflict so a client retry succeeds
    async fn refresh_entry(&self, path: &str) {
        match self.store.fetch_file(path).await {
            Ok(desc) => {
                warn!(path = path, revision = %desc.revision, "Revision conflict, refreshed cache entry");
                self.cache.put(CacheEntry::from_descriptor(desc, &self.base));
            }
            Err(StoreError::NotFound(_)) => {
                warn!(path = path, "Revision conflict, file no longer exists remotely");
                self.cache.remove(path);
            }
            Err(e) => {
                warn!(path = path, error = %e, "Revision conflict, refresh failed");
            }
        }
    }

    async fn modified_time(&self, path: &str) -> Option<DateTime<Utc>> {
        if let Some(time) = self.times.get(path) {
            return Some(time);
        }
        match self.store.last_modified(path).await {
            Ok(Some(time)) => {
                self.times.insert(path, time);
                Some(time)
            }
            Ok(None) => None,
            Err(e) => {
                warn!(path = path, error = %e, "Failed to look up modification time");
                None
            }
        }
    }
}

fn invalid_segment(segment: &str) -> bool {
    segment.is_empty() || segment == "." || segment == ".." || segment.contains('\\')
}

/// Destination directory: surrounding slashes stripped, catch-all when empty
pub fn sanitize_dir(raw: Option<&str>, default_dir: &str) -> Result<String, CdnError> {
    let trimmed = raw.unwrap_or_default().trim().trim_matches('/');
    let dir = if trimmed.is_empty() {
        default_dir.trim_matches('/')
    } else {
        trimmed
    };
    if !dir.is_empty() && dir.split('/').any(invalid_segment) {
        return Err(CdnError::Validation(format!("invalid path '{}'", dir)));
    }
    Ok(dir.to_string())
}

/// Stored file name: the client's base name, or `custom` plus the original extension
pub fn file_name_for(original: &str, custom: Option<&str>) -> Result<String, CdnError> {
    let base = original
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim();
    if invalid_segment(base) {
        return Err(CdnError::Validation("missing file name".to_string()));
    }

    let custom = custom.map(str::trim).filter(|c| !c.is_empty());
    let Some(custom) = custom else {
        return Ok(base.to_string());
    };
    if custom.contains('/') || invalid_segment(custom) {
        return Err(CdnError::Validation(format!("invalid custom name '{}'", custom)));
    }

    let extension = base
        .rsplit_once('.')
        .filter(|(stem, ext)| !stem.is_empty() && !ext.is_empty())
        .map(|(_, ext)| ext);
    match extension {
        Some(ext) if !custom.to_ascii_lowercase().ends_with(&format!(".{}", ext.to_ascii_lowercase())) => {
            Ok(format!("{}.{}", custom, ext))
        }
        _ => Ok(custom.to_string()),
    }
}

fn join_path(dir: &str, name: &str) -> String {
    if dir.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", dir, name)
    }
}

/// Logical path for a request path, `None` if it cannot name a file
fn normalize_request_path(raw: &str) -> Option<String> {
    let path = raw.trim_matches('/');
    if path.is_empty() || path.split('/').any(invalid_segment) {
        return None;
    }
    Some(path.to_string())
}
