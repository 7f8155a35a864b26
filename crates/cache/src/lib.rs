//! In-memory caches for zimr.
//!
//! Two independent caches live here:
//! - [`ArchiveCache`]: the bounded set of open archives, with single-flight
//!   opening and lease-aware LRU eviction.
//! - [`SearchCache`]: merged search result pages keyed by [`SearchKey`].
//!
//! Neither cache calls into the other, and neither holds its lock across an
//! `.await`.

mod archive;
mod search;
mod stats;

pub use crate::archive::{ArchiveCache, ArchiveLease};
pub use crate::search::{SearchCache, SearchKey, normalize_query};
pub use crate::stats::{ArchiveCacheStats, SearchCacheStats};
