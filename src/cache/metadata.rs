//! Metadata Cache Implementation
//!
//! In-memory index from logical path to the remote file's location, public
//! URL, size and revision. The map is copy-on-write: readers clone an `Arc`
//! snapshot and every mutation goes through one write lock, so a resync swap
//! is never observed half-applied.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use tracing::{debug, trace};

use crate::store::FileDescriptor;

/// Builds public URLs from the configured CDN domain
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CdnBase {
    base: String,
}

impl CdnBase {
    /// Accepts `cdn.example.com`, `https://cdn.example.com/` or a URL with a path prefix
    pub fn new(domain: &str) -> Self {
        let trimmed = domain.trim().trim_end_matches('/');
        let base = if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
            trimmed.to_string()
        } else {
            format!("https://{}", trimmed)
        };
        Self { base }
    }

    /// Public URL for a logical path
    pub fn url_for(&self, path: &str) -> String {
        let encoded: Vec<String> = path
            .split('/')
            .map(|s| urlencoding::encode(s).into_owned())
            .collect();
        format!("{}/{}", self.base, encoded.join("/"))
    }

    pub fn as_str(&self) -> &str {
        &self.base
    }
}

/// Cached metadata for one file
#[derive(Clone, Debug)]
pub struct CacheEntry {
    /// Logical path, no leading or trailing slash
    pub path: String,
    /// Locator for fetching raw bytes from the remote store
    pub remote_location: String,
    /// Raw download link shown in the admin listing
    pub download_url: String,
    /// Public URL derived from the path and CDN domain
    pub public_url: String,
    /// Size in bytes (informational)
    pub size: u64,
    /// Latest known revision of the remote file
    pub revision: String,
}

impl CacheEntry {
    pub fn from_descriptor(desc: FileDescriptor, base: &CdnBase) -> Self {
        Self {
            public_url: base.url_for(&desc.path),
            download_url: desc.download_url.unwrap_or_else(|| desc.locator.clone()),
            path: desc.path,
            remote_location: desc.locator,
            size: desc.size,
            revision: desc.revision,
        }
    }

    /// Last component of the path
    pub fn name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(&self.path)
    }
}

/// A mutation recorded while a resync is fetching, replayed onto its result
#[derive(Clone, Debug)]
enum Mutation {
    Put(CacheEntry),
    Remove(String),
}

struct State {
    entries: Arc<HashMap<String, CacheEntry>>,
    /// `Some` while a resync is in flight
    journal: Option<Vec<Mutation>>,
    last_resync: Option<DateTime<Utc>>,
}

/// Path-keyed metadata cache with atomic full replacement
pub struct MetadataCache {
    state: RwLock<State>,
    /// Cache hit counter
    hits: AtomicU64,
    /// Cache miss counter
    misses: AtomicU64,
}

impl MetadataCache {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(State {
                entries: Arc::new(HashMap::new()),
                journal: None,
                last_resync: None,
            }),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    // The state is valid after every statement, so a poisoned lock is safe to reuse
    fn read(&self) -> RwLockReadGuard<'_, State> {
        self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, State> {
        self.state.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Look up a path. Never touches the network.
    pub fn get(&self, path: &str) -> Option<CacheEntry> {
        match self.read().entries.get(path) {
            Some(entry) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                trace!(path = path, "Cache HIT");
                Some(entry.clone())
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                trace!(path = path, "Cache MISS");
                None
            }
        }
    }

    /// Insert or replace the entry for `entry.path`
    pub fn put(&self, entry: CacheEntry) {
        let mut state = self.write();
        if let Some(journal) = state.journal.as_mut() {
            journal.push(Mutation::Put(entry.clone()));
        }
        debug!(path = %entry.path, revision = %entry.revision, "Cached file metadata");
        Arc::make_mut(&mut state.entries).insert(entry.path.clone(), entry);
    }

    /// Drop the entry for a path
    pub fn remove(&self, path: &str) -> Option<CacheEntry> {
        let mut state = self.write();
        if let Some(journal) = state.journal.as_mut() {
            journal.push(Mutation::Remove(path.to_string()));
        }
        let removed = Arc::make_mut(&mut state.entries).remove(path);
        debug!(path = path, existed = removed.is_some(), "Removed file metadata");
        removed
    }

    /// Consistent point-in-time view of the whole map
    pub fn snapshot(&self) -> Arc<HashMap<String, CacheEntry>> {
        Arc::clone(&self.read().entries)
    }

    /// All entries, sorted by path
    pub fn list(&self) -> Vec<CacheEntry> {
        let snapshot = self.snapshot();
        let mut entries: Vec<CacheEntry> = snapshot.values().cloned().collect();
        entries.sort_by(|a, b| a.path.cmp(&b.path));
        entries
    }

    pub fn len(&self) -> usize {
        self.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Start journalling mutations until the returned handle is finished.
    /// Dropping the handle unfinished discards the journal and leaves the
    /// map untouched, so a cancelled or failed resync leaves nothing behind.
    ///
    /// Callers must not overlap resyncs; a new one starts a fresh journal.
    pub fn begin_resync(&self) -> PendingResync<'_> {
        self.write().journal = Some(Vec::new());
        PendingResync {
            cache: self,
            finished: false,
        }
    }

    fn abort_resync(&self) {
        if self.write().journal.take().is_some() {
            debug!("Discarded resync journal");
        }
    }

    fn finish_resync(&self, entries: Vec<CacheEntry>) -> usize {
        let mut map: HashMap<String, CacheEntry> = entries
            .into_iter()
            .map(|entry| (entry.path.clone(), entry))
            .collect();

        let mut state = self.write();
        let journal = state.journal.take().unwrap_or_default();
        let replayed = journal.len();
        for mutation in journal {
            match mutation {
                Mutation::Put(entry) => {
                    map.insert(entry.path.clone(), entry);
                }
                Mutation::Remove(path) => {
                    map.remove(&path);
                }
            }
        }

        let count = map.len();
        state.entries = Arc::new(map);
        state.last_resync = Some(Utc::now());
        debug!(entries = count, replayed = replayed, "Replaced metadata cache");
        count
    }

    /// Replace the whole map in one step
    #[cfg(test)]
    pub fn replace_all(&self, entries: Vec<CacheEntry>) -> usize {
        self.begin_resync().finish(entries)
    }

    /// When the map was last rebuilt from a full listing
    pub fn last_resync(&self) -> Option<DateTime<Utc>> {
        self.read().last_resync
    }

    /// Get cache statistics
    ///
    /// Returns (hits, misses, hit_rate)
    pub fn stats(&self) -> (u64, u64, f64) {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        let hit_rate = if total > 0 {
            (hits as f64 / total as f64) * 100.0
        } else {
            0.0
        };
        (hits, misses, hit_rate)
    }

    /// Log current cache metrics
    pub fn log_metrics(&self) {
        let (hits, misses, hit_rate) = self.stats();
        debug!(
            hits = hits,
            misses = misses,
            hit_rate = format!("{:.1}%", hit_rate),
            entries = self.len(),
            "Cache metrics"
        );
    }
}

/// An in-flight resync started by [`MetadataCache::begin_resync`]
#[must_use = "dropping a pending resync discards it"]
pub struct PendingResync<'a> {
    cache: &'a MetadataCache,
    finished: bool,
}

impl PendingResync<'_> {
    /// Replace the whole map with `entries`, then replay mutations made
    /// since the resync began. Returns the new entry count.
    pub fn finish(mut self, entries: Vec<CacheEntry>) -> usize {
        self.finished = true;
        self.cache.finish_resync(entries)
    }
}

impl Drop for PendingResync<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.cache.abort_resync();
        }
    }
}

impl Default for MetadataCache {
    fn default() -> Self {
        Self::new()
    }
}
