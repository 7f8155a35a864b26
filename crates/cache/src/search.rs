//! Memoization of merged search results.

use crate::stats::SearchCacheStats;
use lru::LruCache;
use parking_lot::Mutex;
use std::fmt;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;
use zimr_archive::ArchiveId;

/// Identity of a search request: the same key always means the same merged
/// page.
///
/// Query text is normalized (trimmed, inner whitespace collapsed, lower-cased)
/// and the archive set is sorted and de-duplicated, so trivially different
/// spellings of the same request share an entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SearchKey {
    query: String,
    archives: Vec<ArchiveId>,
    max_results: usize,
    start_offset: usize,
}

impl SearchKey {
    pub fn new(
        query: &str,
        archives: impl IntoIterator<Item = ArchiveId>,
        max_results: usize,
        start_offset: usize,
    ) -> Self {
        let mut archives: Vec<_> = archives.into_iter().collect();
        archives.sort();
        archives.dedup();
        Self {
            query: normalize_query(query),
            archives,
            max_results,
            start_offset,
        }
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn archives(&self) -> &[ArchiveId] {
        &self.archives
    }
}

/// Trim, collapse runs of whitespace to a single space, lower-case.
///
/// ```
/// use zimr_cache::normalize_query;
/// assert_eq!(normalize_query("  Solar \t SYSTEM\n"), "solar system");
/// ```
pub fn normalize_query(query: &str) -> String {
    query.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}

/// Bounded LRU of search results, keyed by [`SearchKey`].
///
/// Values are shared (`Arc`) so a hit never copies the page.
pub struct SearchCache<V> {
    entries: Mutex<LruCache<SearchKey, Arc<V>>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl<V> fmt::Debug for SearchCache<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let entries = self.entries.lock();
        f.debug_struct("SearchCache")
            .field("len", &entries.len())
            .field("capacity", &entries.cap())
            .finish()
    }
}

impl<V> SearchCache<V> {
    /// A `capacity` of zero is treated as one.
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(LruCache::new(NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN))),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Look up a page, marking it most recently used.
    pub fn get(&self, key: &SearchKey) -> Option<Arc<V>> {
        let found = self.entries.lock().get(key).cloned();
        match &found {
            Some(_) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                debug!(query = key.query(), archives = key.archives().len(), "search cache hit");
            },
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
            },
        }
        found
    }

    /// Store a page, evicting the least recently used one if full. Returns
    /// the shared value.
    pub fn insert(&self, key: SearchKey, value: V) -> Arc<V> {
        let value = Arc::new(value);
        // `push` hands back whatever it displaced: the old value for this
        // key, or the least recently used entry.
        if let Some((old, _)) = self.entries.lock().push(key, Arc::clone(&value)) {
            debug!(query = old.query(), "search cache displaced entry");
        }
        value
    }

    pub fn contains(&self, key: &SearchKey) -> bool {
        self.entries.lock().contains(key)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) -> usize {
        let mut entries = self.entries.lock();
        let cleared = entries.len();
        entries.clear();
        cleared
    }

    pub fn stats(&self) -> SearchCacheStats {
        let (entries, capacity) = {
            let entries = self.entries.lock();
            (entries.len(), entries.cap().get())
        };
        SearchCacheStats {
            capacity,
            entries,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}
