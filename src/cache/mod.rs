//! Metadata caching layer
//!
//! The path index consulted on every request, the periodic resync that
//! rebuilds it from the remote listing, and a TTL cache of commit times for
//! the admin listing.

pub mod history;
pub mod metadata;
pub mod sync;

pub use history::ModifiedTimeCache;
pub use metadata::{CacheEntry, CdnBase, MetadataCache};
pub use sync::{RefreshTask, ResyncOutcome, Resyncer};
