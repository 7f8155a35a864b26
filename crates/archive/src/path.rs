//! Archive path validation.
//!
//! Archive identifiers double as paths relative to the archive directory, so
//! anything a caller hands us has to be checked before it gets anywhere near
//! the filesystem.

use crate::error::{ErrorKind, Result};
use crate::models::ArchiveId;
use std::path::{Component, Path, PathBuf};

/// File extension of archives picked up by directory discovery.
pub const ARCHIVE_EXTENSION: &str = "zim";

/// Validates a path relative to the archive root, returning its normalized
/// form. Rejects anything that would leave the root (`..` past the top,
/// absolute prefixes) and null bytes.
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use zimr_archive::validate_path;
/// assert!(validate_path("wikipedia_en_all.zim").is_ok());
/// assert!(validate_path("sub/dir/../gutenberg.zim").is_ok());
/// assert!(validate_path("../outside.zim").is_err());
/// assert!(validate_path("a\0b.zim").is_err());
/// assert_eq!(validate_path("./sub//x.zim").unwrap(), Path::new("sub/x.zim"));
/// ```
pub fn validate(path: impl AsRef<Path>) -> Result<PathBuf> {
    let mut components = Vec::new();
    for component in path.as_ref().components() {
        match component {
            Component::Normal(s) => {
                // Null bytes pass through Path::components() on Unix but cause
                // truncation in C-based syscalls.
                if s.as_encoded_bytes().contains(&0) {
                    exn::bail!(ErrorKind::InvalidPath(path.as_ref().to_path_buf()));
                }
                components.push(s)
            },
            Component::CurDir | Component::RootDir => {},
            Component::Prefix(_) => exn::bail!(ErrorKind::InvalidPath(path.as_ref().to_path_buf())),
            Component::ParentDir => {
                if components.pop().is_none() {
                    exn::bail!(ErrorKind::InvalidPath(path.as_ref().to_path_buf()));
                }
            },
        }
    }
    match components.is_empty() {
        true => exn::bail!(ErrorKind::InvalidPath(path.as_ref().to_path_buf())),
        false => Ok(components.into_iter().collect()),
    }
}

/// Builds the [`ArchiveId`] for a path relative to the archive root.
///
/// Separators are always `/`, whatever the platform, so identifiers are
/// stable across machines sharing the same archive directory.
pub fn archive_id(relative: impl AsRef<Path>) -> Result<ArchiveId> {
    let validated = validate(relative.as_ref())?;
    let mut parts = Vec::new();
    for component in validated.components() {
        match component.as_os_str().to_str() {
            Some(part) => parts.push(part),
            None => exn::bail!(ErrorKind::InvalidPath(validated.clone())),
        }
    }
    Ok(ArchiveId::new(parts.join("/")))
}

/// Whether a path looks like an archive file (by extension, case-insensitive).
pub fn is_archive(path: impl AsRef<Path>) -> bool {
    path.as_ref()
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case(ARCHIVE_EXTENSION))
}
