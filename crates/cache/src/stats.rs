/// Point-in-time counters for the archive cache.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ArchiveCacheStats {
    pub capacity: usize,
    /// Archives currently open.
    pub resident: usize,
    /// Resident archives with at least one outstanding lease.
    pub leased: usize,
    pub hits: u64,
    pub misses: u64,
    /// Successful opens. Callers sharing a single-flight open count once.
    pub opens: u64,
    pub open_failures: u64,
    pub evictions: u64,
}

/// Point-in-time counters for the search cache.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct SearchCacheStats {
    pub capacity: usize,
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
}

impl SearchCacheStats {
    /// Fraction of lookups answered from the cache, `0.0` before any lookup.
    pub fn hit_rate(&self) -> f64 {
        let lookups = self.hits + self.misses;
        match lookups {
            0 => 0.0,
            n => self.hits as f64 / n as f64,
        }
    }
}
