//! Decoder traits.
//!
//! The low-level archive format is somebody else's problem: this module only
//! defines the seam. An [`ArchiveDecoder`] turns an [`ArchiveFile`] into an
//! open [`Archive`], and an open archive answers lookups, index enumeration
//! and full-text search. Closing an archive is dropping it.

#[cfg(any(test, feature = "mock"))]
mod mock;

#[cfg(any(test, feature = "mock"))]
pub use self::mock::{MockArchive, MockCounters, MockDecoder};
use crate::error::Result;
use crate::models::{ArchiveFile, ArchiveHit, ArchiveMetadata, EntryInfo, EntryPayload};
use async_trait::async_trait;
use futures::Stream;
use std::pin::Pin;

/// Ranked hits, best first, as produced by an archive's full-text index.
pub type ArchiveHitStream<'a> = Pin<Box<dyn Stream<Item = Result<ArchiveHit>> + Send + 'a>>;

/// The answer to a full-text query against one archive.
///
/// Hits are pulled lazily: a caller that stops polling (because it has
/// enough hits, or ran out of time) simply drops the stream.
pub struct HitStream<'a> {
    /// The index's estimate of how many entries match in total, which may be
    /// (much) larger than the number of hits the stream will yield.
    pub estimated_matches: u64,
    pub hits: ArchiveHitStream<'a>,
}
impl<'a> HitStream<'a> {
    pub fn new(estimated_matches: u64, hits: ArchiveHitStream<'a>) -> Self {
        Self { estimated_matches, hits }
    }

    pub fn empty() -> Self {
        Self::new(0, Box::pin(futures::stream::empty()))
    }
}

/// Opens archives.
///
/// # Examples
///
/// ```
/// use zimr_archive::{Archive, ArchiveDecoder, ArchiveFile, error::Result};
///
/// async fn title_of(decoder: &dyn ArchiveDecoder, file: &ArchiveFile) -> Result<String> {
///     let archive = decoder.open(file).await?;
///     Ok(archive.metadata().title.clone())
///     // `archive` is dropped (and closed) here.
/// }
/// ```
#[async_trait]
pub trait ArchiveDecoder: Send + Sync {
    /// Name of the decoder (for logging only).
    fn name(&self) -> &str;

    /// Open an archive file, reading its header and metadata.
    ///
    /// Returns [`Corrupt`](crate::error::ErrorKind::Corrupt) if the file
    /// can't be decoded, and [`NotFound`](crate::error::ErrorKind::NotFound)
    /// if it vanished between discovery and opening.
    async fn open(&self, file: &ArchiveFile) -> Result<Box<dyn Archive>>;
}

/// An open archive.
///
/// Implementations must be safe to share between tasks: the archive cache
/// hands out concurrent leases on the same open archive.
#[async_trait]
pub trait Archive: Send + Sync {
    /// Metadata captured when the archive was opened.
    fn metadata(&self) -> &ArchiveMetadata;

    /// Read the entry at `path`.
    ///
    /// Redirect entries are returned as-is (with
    /// [`is_redirect`](EntryPayload::is_redirect) set); following them is
    /// the caller's decision. Returns
    /// [`EntryNotFound`](crate::error::ErrorKind::EntryNotFound) when no
    /// entry exists at `path`.
    async fn lookup(&self, path: &str) -> Result<EntryPayload>;

    /// Describe the entry at `index` (`0..entry_count`), or `None` if the
    /// index is out of range.
    async fn entry_at(&self, index: u64) -> Result<Option<EntryInfo>>;

    /// Pick a random content entry using the decoder's own facility, if it
    /// has one.
    async fn random_path(&self) -> Result<Option<String>> {
        Ok(None)
    }

    /// Run a full-text query, returning at most `limit` ranked hits.
    async fn search<'a>(&'a self, text: &'a str, limit: usize) -> Result<HitStream<'a>>;
}
