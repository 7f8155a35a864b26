//! Archive Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.
//!
//! Every variant is `Clone` so an open failure can be handed to every caller
//! that was waiting on the same single-flight open.

use crate::models::ArchiveId;
use derive_more::{Display, Error};
use std::path::PathBuf;

/// An archive error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for archive operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
/// Open failures ([`NotFound`](Self::NotFound), [`TooLarge`](Self::TooLarge),
/// [`Corrupt`](Self::Corrupt)) are scoped to a single archive; callers
/// fanning out across many archives should report them and carry on.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// No archive with this identifier is known (or its file disappeared).
    #[display("archive not found: {_0}")]
    NotFound(#[error(not(source))] ArchiveId),
    /// The archive file exceeds the configured size limit and was not opened.
    #[display("archive {id} is {size} bytes, over the {limit} byte limit")]
    TooLarge {
        /// Archive that was rejected.
        id: ArchiveId,
        /// Size of the file on disk.
        size: u64,
        /// Configured limit.
        limit: u64,
    },
    /// The decoder could not make sense of the archive.
    #[display("corrupt or unreadable archive {_0}: {_1}")]
    Corrupt(#[error(not(source))] ArchiveId, #[error(not(source))] String),
    /// No entry exists at the requested path.
    #[display("entry not found in {_0}: {_1}")]
    EntryNotFound(#[error(not(source))] ArchiveId, #[error(not(source))] String),
    /// Path contains invalid characters or escapes the archive root.
    #[display("invalid path: {}", _0.display())]
    InvalidPath(#[error(not(source))] PathBuf),
    /// Underlying I/O error (message only, `std::io::Error` is not `Clone`).
    #[display("I/O error on {}: {_1}", _0.display())]
    Io(#[error(not(source))] PathBuf, #[error(not(source))] String),
    /// The archive cache has been shut down and hands out no more archives.
    #[display("archive cache is shut down")]
    Closed,
    /// Decoder-specific failure that doesn't fit anywhere else.
    #[display("decoder error: {_0}")]
    Decoder(#[error(not(source))] String),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Io(..) | Self::Decoder(_))
    }

    /// Returns `true` for failures that mean "this archive could not be
    /// opened", as opposed to failures of an operation on an open archive.
    pub fn is_open_failure(&self) -> bool {
        matches!(self, Self::NotFound(_) | Self::TooLarge { .. } | Self::Corrupt(..) | Self::Io(..))
    }

    pub(crate) fn io(path: impl Into<PathBuf>, err: &std::io::Error) -> Self {
        Self::Io(path.into(), err.to_string())
    }
}
