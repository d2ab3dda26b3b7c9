//! Full resync and the periodic refresh task
//!
//! A resync lists every configured directory (one level deep, files only)
//! and swaps the result into the metadata cache. Failures keep the previous
//! map and are only logged.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::metadata::{CacheEntry, CdnBase, MetadataCache};
use crate::store::{FileDescriptor, RemoteStore, StoreError};

/// Result of one resync attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResyncOutcome {
    /// The cache now holds exactly this many entries from the listing
    Replaced(usize),
    /// The listing failed; the previous map is untouched
    Kept,
}

/// Rebuilds the metadata cache from the remote listing
pub struct Resyncer {
    store: Arc<dyn RemoteStore>,
    cache: Arc<MetadataCache>,
    base: CdnBase,
    /// Directories to list, without surrounding slashes ("" is the root)
    sync_paths: Vec<String>,
    /// Serialises resyncs so journals never interleave
    running: Mutex<()>,
}

impl Resyncer {
    pub fn new(
        store: Arc<dyn RemoteStore>,
        cache: Arc<MetadataCache>,
        base: CdnBase,
        sync_paths: Vec<String>,
    ) -> Self {
        let mut paths: Vec<String> = sync_paths
            .iter()
            .map(|p| p.trim_matches('/').to_string())
            .collect();
        paths.sort();
        paths.dedup();
        Self {
            store,
            cache,
            base,
            sync_paths: paths,
            running: Mutex::new(()),
        }
    }

    pub fn sync_paths(&self) -> &[String] {
        &self.sync_paths
    }

    /// Replace the cache with the current remote listing. Never fails.
    ///
    /// Safe to cancel: dropping the future mid-listing leaves the map as it was.
    pub async fn resync(&self) -> ResyncOutcome {
        let _guard = self.running.lock().await;
        let pending = self.cache.begin_resync();

        match self.fetch_all().await {
            Ok(files) => {
                let entries: Vec<CacheEntry> = files
                    .into_values()
                    .map(|desc| CacheEntry::from_descriptor(desc, &self.base))
                    .collect();
                let count = pending.finish(entries);
                info!(files = count, "Resynced metadata cache");
                self.cache.log_metrics();
                ResyncOutcome::Replaced(count)
            }
            Err(e) => {
                drop(pending);
                warn!(error = %e, entries = self.cache.len(), "Resync failed, keeping previous cache");
                ResyncOutcome::Kept
            }
        }
    }

    /// Union of all listings keyed by path
    async fn fetch_all(&self) -> Result<HashMap<String, FileDescriptor>, StoreError> {
        let mut files = HashMap::new();
        for prefix in &self.sync_paths {
            match self.store.fetch_listing(prefix).await {
                Ok(listing) => {
                    debug!(prefix = %prefix, count = listing.len(), "Fetched listing");
                    for desc in listing {
                        files.insert(desc.path.clone(), desc);
                    }
                }
                // A sync directory that does not exist yet is simply empty
                Err(e) if e.is_not_found() => {
                    debug!(prefix = %prefix, "Sync directory does not exist");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(files)
    }
}

/// Background task running [`Resyncer::resync`] on a fixed period
pub struct RefreshTask {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

impl RefreshTask {
    /// Spawn the timer. The first resync runs one `period` from now.
    pub fn start(resyncer: Arc<Resyncer>, period: Duration) -> Self {
        let token = CancellationToken::new();
        let child = token.clone();

        let handle = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            info!(period_secs = period.as_secs(), "Refresh task started");

            loop {
                tokio::select! {
                    _ = child.cancelled() => break,
                    _ = ticker.tick() => {
                        // Cancellation also interrupts an in-flight resync
                        tokio::select! {
                            _ = child.cancelled() => break,
                            _ = resyncer.resync() => {}
                        }
                    }
                }
            }

            info!("Refresh task stopped");
        });

        Self { token, handle }
    }

    #[cfg(test)]
    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }

    /// Cancel the timer and wait for the task to exit
    pub async fn stop(self) {
        self.token.cancel();
        if let Err(e) = self.handle.await {
            warn!(error = %e, "Refresh task ended abnormally");
        }
    }
}
