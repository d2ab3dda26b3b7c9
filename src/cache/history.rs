//! Last-modified time cache
//!
//! Admin listings need one commit-history lookup per file. Results are kept
//! for a few minutes with Moka so repeated listings stay cheap.

use std::time::Duration;

use chrono::{DateTime, Utc};
use moka::sync::Cache;
use tracing::trace;

/// Default TTL for cached commit times
const DEFAULT_TTL: Duration = Duration::from_secs(600);

/// Maximum number of paths tracked
const MAX_ENTRIES: u64 = 10_000;

/// Per-path last-modified timestamps with TTL expiry
#[derive(Clone)]
pub struct ModifiedTimeCache {
    times: Cache<String, DateTime<Utc>>,
}

impl ModifiedTimeCache {
    pub fn new() -> Self {
        Self::with_ttl(DEFAULT_TTL)
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        let times = Cache::builder()
            .time_to_live(ttl)
            .max_capacity(MAX_ENTRIES)
            .name("modified_time_cache")
            .build();
        Self { times }
    }

    pub fn get(&self, path: &str) -> Option<DateTime<Utc>> {
        let hit = self.times.get(path);
        trace!(path = path, hit = hit.is_some(), "Modified time lookup");
        hit
    }

    pub fn insert(&self, path: &str, time: DateTime<Utc>) {
        self.times.insert(path.to_string(), time);
    }

    /// Forget a path after it changes remotely
    pub fn invalidate(&self, path: &str) {
        self.times.invalidate(path);
    }
}

impl Default for ModifiedTimeCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_get_invalidate() {
        let cache = ModifiedTimeCache::new();
        let now = Utc::now();

        assert!(cache.get("a.txt").is_none());
        cache.insert("a.txt", now);
        assert_eq!(cache.get("a.txt"), Some(now));

        cache.invalidate("a.txt");
        assert!(cache.get("a.txt").is_none());
    }

    #[test]
    fn test_entries_expire() {
        let cache = ModifiedTimeCache::with_ttl(Duration::from_millis(20));
        cache.insert("a.txt", Utc::now());
        std::thread::sleep(Duration::from_millis(60));
        assert!(cache.get("a.txt").is_none());
    }
}
