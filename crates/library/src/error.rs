//! Library Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.
//!
//! Failures scoped to one archive during a fan-out (search, random
//! selection) are not errors: they are collected as [`ArchiveFailure`]s next
//! to the partial result. Only requests that can't produce anything at all
//! end up here.

use crate::models::ArchiveFailure;
use derive_more::{Display, Error};
use zimr_archive::ArchiveId;
use zimr_archive::error::{Error as ArchiveError, ErrorKind as ArchiveErrorKind};

/// A library error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for library operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error, Clone, PartialEq)]
pub enum ErrorKind {
    /// The request itself is malformed (blank query, out-of-range count...).
    #[display("invalid request: {_0}")]
    InvalidRequest(#[error(not(source))] String),
    /// Opening or reading an archive failed.
    #[display("{_0}")]
    Archive(ArchiveErrorKind),
    /// A redirect pointed at another redirect (or nowhere).
    #[display("unresolved redirect in {archive}: {path} -> {target}")]
    UnresolvedRedirect {
        archive: ArchiveId,
        path: String,
        target: String,
    },
    /// The archive doesn't designate a main entry.
    #[display("archive {_0} has no main entry")]
    NoMainEntry(#[error(not(source))] ArchiveId),
    /// None of the targeted archives could be used. Carries the reason for
    /// each one (empty when there was nothing to target).
    #[display("no resolvable archives ({} failed)", _0.len())]
    NoResolvableArchives(#[error(not(source))] Vec<ArchiveFailure>),
    /// Listing the archive directory failed.
    #[display("archive discovery failed")]
    Discovery,
}

impl ErrorKind {
    /// Convert an archive error into a library error, keeping the archive
    /// crate's `Exn` frame as a child in the error tree.
    #[track_caller]
    pub fn archive(err: ArchiveError) -> Error {
        let inner = (*err).clone();
        err.raise(ErrorKind::Archive(inner))
    }

    pub(crate) fn invalid(reason: impl Into<String>) -> Self {
        Self::InvalidRequest(reason.into())
    }

    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Archive(kind) => kind.is_retryable(),
            Self::NoResolvableArchives(failures) => !failures.is_empty(),
            Self::Discovery => true,
            _ => false,
        }
    }
}
