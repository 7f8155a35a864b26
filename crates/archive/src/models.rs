//! Archive models.
//!
//! These types describe archives (as files on disk and as opened, decoded
//! archives), the entries inside them, and the hits produced by full-text
//! search.

use derive_more::Display;
use std::cmp::Ordering;
use std::path::PathBuf;
use time::OffsetDateTime;

/// Stable identifier for an archive: its path relative to the archive root,
/// e.g. `wikipedia_en_all_nopic.zim`.
///
/// Identifiers are ordered lexicographically, which is what breaks ties when
/// merging search results from several archives.
#[derive(Debug, Display, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize), serde(transparent))]
pub struct ArchiveId(String);
impl ArchiveId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}
impl From<&str> for ArchiveId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}
impl From<String> for ArchiveId {
    fn from(id: String) -> Self {
        Self(id)
    }
}
impl AsRef<str> for ArchiveId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// An archive file as reported by [`Discovery`](crate::Discovery), before it
/// has been opened.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ArchiveFile {
    pub id: ArchiveId,
    /// Location handed to the decoder. For [`DirectoryDiscovery`](crate::DirectoryDiscovery)
    /// this is the absolute path of the file.
    pub path: PathBuf,
    /// File size in bytes
    pub size: u64,
    /// Last modified timestamp
    pub modified: OffsetDateTime,
}
impl ArchiveFile {
    pub fn new(id: impl Into<ArchiveId>, path: impl Into<PathBuf>, size: u64, modified: OffsetDateTime) -> Self {
        Self {
            id: id.into(),
            path: path.into(),
            size,
            modified,
        }
    }
}

/// Immutable snapshot of an archive's header and metadata, captured when the
/// archive is opened.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ArchiveMetadata {
    pub id: ArchiveId,
    pub title: String,
    pub description: Option<String>,
    /// ISO 639-3 language code(s), as stored in the archive (e.g. `eng`).
    pub language: Option<String>,
    pub creator: Option<String>,
    /// Publication date as written by the archive's creator (usually `YYYY-MM-DD`).
    pub date: Option<String>,
    /// Total number of entries, including redirects and metadata entries.
    /// Valid entry indices are `0..entry_count`.
    pub entry_count: u64,
    /// Number of user-facing articles.
    pub article_count: u64,
    /// Number of media (image, audio, video) entries.
    pub media_count: u64,
    pub file_size_bytes: u64,
    /// Path of the designated main (home) page, when the archive has one.
    pub main_entry_path: Option<String>,
    pub has_fulltext_index: bool,
    pub has_title_index: bool,
    pub uuid: Option<String>,
    pub last_modified: Option<OffsetDateTime>,
}
impl ArchiveMetadata {
    /// Minimal metadata; everything optional left unset.
    pub fn new(id: impl Into<ArchiveId>, title: impl Into<String>, entry_count: u64) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            description: None,
            language: None,
            creator: None,
            date: None,
            entry_count,
            article_count: entry_count,
            media_count: 0,
            file_size_bytes: 0,
            main_entry_path: None,
            has_fulltext_index: true,
            has_title_index: true,
            uuid: None,
            last_modified: None,
        }
    }

    /// Human-readable archive size (e.g. `1.5 GB`).
    pub fn size_formatted(&self) -> String {
        format_file_size(self.file_size_bytes)
    }
}

/// Formats a byte count using binary multiples and one decimal place.
///
/// # Examples
///
/// ```
/// use zimr_archive::format_file_size;
/// assert_eq!(format_file_size(512), "512.0 B");
/// assert_eq!(format_file_size(1536), "1.5 KB");
/// assert_eq!(format_file_size(3 * 1024 * 1024 * 1024), "3.0 GB");
/// ```
pub fn format_file_size(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    // Precision loss is fine, this is for display only.
    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    format!("{size:.1} {}", UNITS[unit])
}

/// Lightweight description of an entry, as returned when enumerating entries
/// by index (random selection) without reading their content.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct EntryInfo {
    pub path: String,
    pub title: String,
    /// Empty for redirects.
    pub mime_type: String,
    pub is_redirect: bool,
}
impl EntryInfo {
    /// Whether the entry is an actual piece of content a reader would want:
    /// not a redirect, and not one of the archive's internal bookkeeping
    /// entries (metadata, indices, counters).
    pub fn is_content(&self) -> bool {
        if self.is_redirect || self.mime_type.is_empty() {
            return false;
        }
        !(self.path.starts_with("M/")
            || self.path.starts_with("X/")
            || self.path.starts_with("-/")
            || self.mime_type.starts_with("application/octet-stream+xapian"))
    }
}

/// The decoded payload of a single entry. Transient: this is never cached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryPayload {
    pub archive_id: ArchiveId,
    pub entry_path: String,
    pub title: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
    pub is_redirect: bool,
    /// Path the redirect points at (always `Some` when `is_redirect`).
    pub redirect_target: Option<String>,
}
impl EntryPayload {
    pub fn new(
        archive_id: impl Into<ArchiveId>,
        entry_path: impl Into<String>,
        mime_type: impl Into<String>,
        bytes: impl Into<Vec<u8>>,
    ) -> Self {
        let entry_path = entry_path.into();
        Self {
            archive_id: archive_id.into(),
            title: entry_path.clone(),
            entry_path,
            mime_type: mime_type.into(),
            bytes: bytes.into(),
            is_redirect: false,
            redirect_target: None,
        }
    }

    pub fn redirect(archive_id: impl Into<ArchiveId>, entry_path: impl Into<String>, target: impl Into<String>) -> Self {
        let mut payload = Self::new(archive_id, entry_path, "", Vec::new());
        payload.is_redirect = true;
        payload.redirect_target = Some(target.into());
        payload
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }
}

/// A ranked match produced by a single archive's full-text index. The
/// archive is implied; see [`SearchHit`] for the archive-qualified form.
#[derive(Debug, Clone, PartialEq)]
pub struct ArchiveHit {
    pub path: String,
    pub title: String,
    pub score: f64,
    pub snippet: Option<String>,
}

/// A search match, qualified with the archive it came from.
///
/// The [`Ord`] implementation is the global result order: score descending,
/// then archive identifier ascending, then entry path ascending. Scores are
/// compared with [`f64::total_cmp`] so the order is total even for `NaN`.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct SearchHit {
    pub archive_id: ArchiveId,
    pub entry_path: String,
    pub title: String,
    pub score: f64,
    pub snippet: Option<String>,
}
impl SearchHit {
    pub fn from_archive_hit(archive_id: ArchiveId, hit: ArchiveHit) -> Self {
        Self {
            archive_id,
            entry_path: hit.path,
            title: hit.title,
            score: hit.score,
            snippet: hit.snippet,
        }
    }
}
impl Ord for SearchHit {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .score
            .total_cmp(&self.score)
            .then_with(|| self.archive_id.cmp(&other.archive_id))
            .then_with(|| self.entry_path.cmp(&other.entry_path))
    }
}
impl PartialOrd for SearchHit {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl PartialEq for SearchHit {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}
impl Eq for SearchHit {}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn hit(archive: &str, path: &str, score: f64) -> SearchHit {
        SearchHit {
            archive_id: ArchiveId::new(archive),
            entry_path: path.to_string(),
            title: path.to_string(),
            score,
            snippet: None,
        }
    }

    #[test]
    fn test_hit_order_score_first() {
        let mut hits = vec![hit("a.zim", "A/Low", 0.2), hit("b.zim", "A/High", 0.9), hit("a.zim", "A/Mid", 0.5)];
        hits.sort();
        let paths: Vec<_> = hits.iter().map(|h| h.entry_path.as_str()).collect();
        assert_eq!(paths, vec!["A/High", "A/Mid", "A/Low"]);
    }

    #[test]
    fn test_hit_order_ties() {
        let mut hits = vec![hit("b.zim", "A/Same", 0.5), hit("a.zim", "B/Same", 0.5), hit("a.zim", "A/Same", 0.5)];
        hits.sort();
        let keys: Vec<_> = hits.iter().map(|h| (h.archive_id.as_str(), h.entry_path.as_str())).collect();
        assert_eq!(keys, vec![("a.zim", "A/Same"), ("a.zim", "B/Same"), ("b.zim", "A/Same")]);
    }

    #[test]
    fn test_hit_order_nan_is_total() {
        let mut hits = vec![hit("a.zim", "A/Nan", f64::NAN), hit("a.zim", "A/One", 1.0)];
        hits.sort();
        assert_eq!(hits.len(), 2);
        assert!(hits[0] != hits[1]);
    }

    #[rstest]
    #[case(0, "0.0 B")]
    #[case(1023, "1023.0 B")]
    #[case(1024, "1.0 KB")]
    #[case(5 * 1024 * 1024 + 512 * 1024, "5.5 MB")]
    #[case(2 * 1024u64.pow(4), "2.0 TB")]
    #[case(3 * 1024u64.pow(5), "3072.0 TB")]
    fn test_format_file_size(#[case] bytes: u64, #[case] expected: &str) {
        assert_eq!(format_file_size(bytes), expected);
    }

    #[rstest]
    #[case("A/Article", "text/html", false, true)]
    #[case("A/Redirect", "", true, false)]
    #[case("M/Title", "text/plain", false, false)]
    #[case("X/fulltext/xapian", "application/octet-stream+xapian", false, false)]
    #[case("I/logo.png", "image/png", false, true)]
    fn test_entry_is_content(#[case] path: &str, #[case] mime: &str, #[case] redirect: bool, #[case] expected: bool) {
        let info = EntryInfo {
            path: path.to_string(),
            title: String::new(),
            mime_type: mime.to_string(),
            is_redirect: redirect,
        };
        assert_eq!(info.is_content(), expected);
    }
}
