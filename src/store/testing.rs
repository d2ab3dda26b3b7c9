//! Test doubles wrapping [`MemoryStore`]

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use tokio::sync::Notify;

use super::{ContentStream, FileDescriptor, MemoryStore, RemoteStore, StoreError};

/// A [`MemoryStore`] that can be switched offline, fail history lookups for
/// chosen paths, and hold listings until released
#[derive(Default)]
pub struct FlakyStore {
    pub inner: MemoryStore,
    offline: AtomicBool,
    history_failures: Mutex<HashSet<String>>,
    listing_gate: Mutex<Option<Arc<Notify>>>,
    pub listing_calls: AtomicUsize,
    pub history_calls: AtomicUsize,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn fail_history_for(&self, path: &str) {
        self.history_failures.lock().unwrap().insert(path.to_string());
    }

    /// Make the next listings wait until the returned handle is notified
    pub fn hold_listings(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.listing_gate.lock().unwrap() = Some(Arc::clone(&gate));
        gate
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(StoreError::RemoteUnavailable("store is offline".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteStore for FlakyStore {
    async fn fetch_listing(&self, prefix: &str) -> Result<Vec<FileDescriptor>, StoreError> {
        self.listing_calls.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        let listing = self.inner.fetch_listing(prefix).await?;
        let gate = self.listing_gate.lock().unwrap().take();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        Ok(listing)
    }

    async fn fetch_file(&self, path: &str) -> Result<FileDescriptor, StoreError> {
        self.check()?;
        self.inner.fetch_file(path).await
    }

    async fn fetch_content(&self, locator: &str) -> Result<ContentStream, StoreError> {
        self.check()?;
        self.inner.fetch_content(locator).await
    }

    async fn write_file(
        &self,
        path: &str,
        content: Bytes,
        message: &str,
        revision: Option<&str>,
    ) -> Result<FileDescriptor, StoreError> {
        self.check()?;
        self.inner.write_file(path, content, message, revision).await
    }

    async fn delete_file(
        &self,
        path: &str,
        revision: &str,
        message: &str,
    ) -> Result<(), StoreError> {
        self.check()?;
        self.inner.delete_file(path, revision, message).await
    }

    async fn last_modified(&self, path: &str) -> Result<Option<DateTime<Utc>>, StoreError> {
        self.history_calls.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        let failing = self.history_failures.lock().unwrap().contains(path);
        if failing {
            return Err(StoreError::RemoteUnavailable(format!("no history for {}", path)));
        }
        self.inner.last_modified(path).await
    }
}
