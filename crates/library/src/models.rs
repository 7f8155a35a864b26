use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use time::OffsetDateTime;
use zimr_archive::{ArchiveId, ArchiveMetadata, SearchHit};
use zimr_cache::{ArchiveCacheStats, SearchCacheStats};
use zimr_content::ProcessedContent;

/// Page size used when a caller doesn't pick one.
pub const DEFAULT_MAX_RESULTS: usize = 20;

/// A full-text search request.
///
/// ```
/// use zimr_library::SearchQuery;
///
/// let query = SearchQuery::new("solar system")
///     .in_archives(["wiki.zim", "science.zim"])
///     .with_max_results(5)
///     .starting_at(10);
/// assert_eq!(query.archives.len(), 2);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct SearchQuery {
    pub text: String,
    /// Archives to search. Empty means every discoverable archive.
    pub archives: Vec<ArchiveId>,
    pub max_results: usize,
    pub start_offset: usize,
}

impl SearchQuery {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            archives: Vec::new(),
            max_results: DEFAULT_MAX_RESULTS,
            start_offset: 0,
        }
    }

    pub fn in_archives<I>(mut self, archives: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<ArchiveId>,
    {
        self.archives = archives.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_max_results(mut self, max_results: usize) -> Self {
        self.max_results = max_results;
        self
    }

    pub fn starting_at(mut self, start_offset: usize) -> Self {
        self.start_offset = start_offset;
        self
    }
}

/// One window of ranked hits.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct SearchResultPage {
    /// Best first: score descending, then archive id, then entry path.
    pub hits: Vec<SearchHit>,
    /// Sum of the indices' match estimates; may exceed what can be paged.
    pub total_estimated_matches: u64,
    /// Some archive ran out of time (or was cancelled) before it was done,
    /// so hits may be missing.
    pub truncated: bool,
    /// There are more hits beyond this window.
    pub has_more: bool,
}

/// Why one archive contributed nothing to a fan-out.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ArchiveFailure {
    pub archive_id: ArchiveId,
    pub reason: String,
}

impl ArchiveFailure {
    pub fn new(archive_id: ArchiveId, reason: impl ToString) -> Self {
        Self {
            archive_id,
            reason: reason.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct SearchOutcome {
    pub page: Arc<SearchResultPage>,
    /// Archives that could not be searched. Always empty for cached pages.
    pub failures: Vec<ArchiveFailure>,
    /// Answered from the search cache.
    pub cached: bool,
}

/// A processed entry, as returned by [`Library::read`](crate::Library::read).
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct EntryContent {
    pub archive_id: ArchiveId,
    pub requested_path: String,
    /// Where the content actually came from (differs after a redirect).
    pub resolved_path: String,
    pub redirected: bool,
    pub title: String,
    pub mime_type: String,
    pub content: ProcessedContent,
    pub elapsed: Duration,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct RandomEntry {
    pub archive_id: ArchiveId,
    pub path: String,
    pub title: String,
    /// Only present when content was asked for.
    pub content: Option<ProcessedContent>,
}

#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct RandomSelection {
    pub entries: Vec<RandomEntry>,
    pub failures: Vec<ArchiveFailure>,
}

/// One discoverable archive. Building a listing never opens anything, so
/// `metadata` is only filled in for archives that are already open.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ArchiveSummary {
    pub id: ArchiveId,
    pub path: PathBuf,
    pub size_bytes: u64,
    pub size_formatted: String,
    pub modified: OffsetDateTime,
    pub resident: bool,
    /// Over the configured size limit; opening it will fail.
    pub too_large: bool,
    pub metadata: Option<ArchiveMetadata>,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct MetadataReport {
    pub metadata: ArchiveMetadata,
    /// The archive was already open before this call.
    pub was_resident: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct LibraryStats {
    pub archives: ArchiveCacheStats,
    pub searches: SearchCacheStats,
}

/// What [`Library::clear_caches`](crate::Library::clear_caches) dropped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ClearedCaches {
    pub archives: usize,
    pub searches: usize,
}
