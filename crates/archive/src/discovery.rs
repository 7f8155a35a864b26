//! Archive discovery.
//!
//! Discovery answers "which archives exist, and where?". It knows nothing
//! about the archive format; [`DirectoryDiscovery`] just walks a directory
//! tree looking for `*.zim` files.

use crate::error::{ErrorKind, Result};
use crate::models::{ArchiveFile, ArchiveId};
use crate::path::{archive_id, is_archive, validate as validate_path};
use async_stream::stream;
use async_trait::async_trait;
use futures::{Stream, TryStreamExt};
use std::fs::Metadata;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use tokio::fs::{self, DirEntry};
use tracing::{debug, warn};

pub type ArchiveFileStream<'a> = Pin<Box<dyn Stream<Item = Result<ArchiveFile>> + Send + 'a>>;

enum WalkEntry {
    File(ArchiveFile),
    Descend(PathBuf),
    Skip,
}

/// Lists the archives available to the library.
#[async_trait]
pub trait Discovery: Send + Sync {
    /// Name of the discovery source (for logging only).
    fn name(&self) -> &str;

    /// Stream every archive as it is found, in no particular order.
    fn list_stream<'a>(&'a self) -> ArchiveFileStream<'a>;

    /// Every archive, sorted by identifier.
    ///
    /// Default implementation collects [`list_stream()`](Self::list_stream)
    /// and sorts the result.
    async fn list(&self) -> Result<Vec<ArchiveFile>> {
        let mut files: Vec<ArchiveFile> = self.list_stream().try_collect().await?;
        files.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(files)
    }

    /// Find a single archive by identifier, or `None` if it doesn't exist.
    async fn locate(&self, id: &ArchiveId) -> Result<Option<ArchiveFile>>;
}

/// Discovers archive files under a directory on the local filesystem,
/// recursively.
///
/// # Examples
///
/// ```no_run
/// use zimr_archive::{Discovery, DirectoryDiscovery};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let discovery = DirectoryDiscovery::new("/srv/zim")?;
/// for file in discovery.list().await? {
///     println!("{}: {} bytes", file.id, file.size);
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct DirectoryDiscovery {
    root: PathBuf,
}

impl DirectoryDiscovery {
    /// Create a discovery rooted at `root`, which must be an existing
    /// directory. Relative roots are resolved against the current working
    /// directory once, here.
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref();
        let root = std::path::absolute(root).map_err(|e| ErrorKind::io(root, &e))?;
        if !root.is_dir() {
            exn::bail!(ErrorKind::InvalidPath(root));
        }
        debug!(root = %root.display(), "archive directory");
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn archive_file(&self, id: ArchiveId, absolute: PathBuf, metadata: &Metadata) -> Result<ArchiveFile> {
        let modified = metadata.modified().map_err(|e| ErrorKind::io(&absolute, &e))?.into();
        Ok(ArchiveFile::new(id, absolute, metadata.len(), modified))
    }

    /// Pulled out of the stream loop, where `?` isn't available.
    async fn process_entry(&self, entry: DirEntry) -> Result<WalkEntry> {
        let path = entry.path();
        let metadata = fs::metadata(&path).await.map_err(|e| ErrorKind::io(&path, &e))?;
        if metadata.is_dir() {
            return Ok(WalkEntry::Descend(path));
        }
        if !metadata.is_file() || !is_archive(&path) {
            return Ok(WalkEntry::Skip);
        }
        let relative = path
            .strip_prefix(&self.root)
            .map_err(|_| exn::Exn::from(ErrorKind::InvalidPath(path.clone())))?;
        let id = archive_id(relative)?;
        Ok(WalkEntry::File(self.archive_file(id, path, &metadata)?))
    }
}

#[async_trait]
impl Discovery for DirectoryDiscovery {
    fn name(&self) -> &str {
        "directory"
    }

    fn list_stream<'a>(&'a self) -> ArchiveFileStream<'a> {
        let mut stack = vec![self.root.clone()];
        Box::pin(stream! {
            'dirs: while let Some(current) = stack.pop() {
                let mut entries = match fs::read_dir(&current).await {
                    Ok(entries) => entries,
                    Err(err) if err.kind() == std::io::ErrorKind::NotFound => continue,
                    Err(err) => {
                        warn!(directory = %current.display(), error = %err, "unreadable directory");
                        yield Err(exn::Exn::from(ErrorKind::io(&current, &err)));
                        continue 'dirs;
                    }
                };
                'entries: loop {
                    let entry = match entries.next_entry().await {
                        Ok(Some(entry)) => entry,
                        Ok(None) => break 'entries,
                        Err(e) => { yield Err(exn::Exn::from(ErrorKind::io(&current, &e))); continue 'entries; },
                    };
                    match self.process_entry(entry).await {
                        Ok(WalkEntry::File(f)) => yield Ok(f),
                        Ok(WalkEntry::Descend(d)) => stack.push(d),
                        Ok(WalkEntry::Skip) => {},
                        Err(e) => yield Err(e),
                    };
                }
            }
        })
    }

    async fn locate(&self, id: &ArchiveId) -> Result<Option<ArchiveFile>> {
        let relative = validate_path(id.as_str())?;
        if !is_archive(&relative) {
            return Ok(None);
        }
        let absolute = self.root.join(relative);
        match fs::metadata(&absolute).await {
            Ok(metadata) if metadata.is_file() => Ok(Some(self.archive_file(id.clone(), absolute, &metadata)?)),
            Ok(_) => Ok(None),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => exn::bail!(ErrorKind::io(&absolute, &e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::{create_dir_all, write};

    fn populated() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        create_dir_all(dir.path().join("nested/deeper")).unwrap();
        write(dir.path().join("top.zim"), b"1234").unwrap();
        write(dir.path().join("nested/deeper/inner.ZIM"), b"12").unwrap();
        write(dir.path().join("nested/readme.txt"), b"not an archive").unwrap();
        dir
    }

    #[test]
    fn test_new_requires_directory() {
        let dir = populated();
        assert!(DirectoryDiscovery::new(dir.path()).is_ok());
        let err = DirectoryDiscovery::new(dir.path().join("top.zim")).unwrap_err();
        assert!(matches!(&*err, ErrorKind::InvalidPath(_)));
        assert!(DirectoryDiscovery::new(dir.path().join("missing")).is_err());
    }

    #[tokio::test]
    async fn test_list_is_recursive_and_sorted() {
        let dir = populated();
        let discovery = DirectoryDiscovery::new(dir.path()).unwrap();
        let files = discovery.list().await.unwrap();
        let ids: Vec<_> = files.iter().map(|f| f.id.as_str()).collect();
        assert_eq!(ids, vec!["nested/deeper/inner.ZIM", "top.zim"]);
        assert_eq!(files[1].size, 4);
        assert!(files[1].path.is_absolute());
    }

    #[tokio::test]
    async fn test_locate() {
        let dir = populated();
        let discovery = DirectoryDiscovery::new(dir.path()).unwrap();
        let found = discovery.locate(&ArchiveId::new("top.zim")).await.unwrap().unwrap();
        assert_eq!(found.size, 4);
        assert!(discovery.locate(&ArchiveId::new("absent.zim")).await.unwrap().is_none());
        // Exists, but isn't an archive
        assert!(discovery.locate(&ArchiveId::new("nested/readme.txt")).await.unwrap().is_none());
        // Directories aren't archives, whatever they're called
        create_dir_all(dir.path().join("dir.zim")).unwrap();
        assert!(discovery.locate(&ArchiveId::new("dir.zim")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_locate_rejects_traversal() {
        let dir = populated();
        let discovery = DirectoryDiscovery::new(dir.path().join("nested")).unwrap();
        let err = discovery.locate(&ArchiveId::new("../top.zim")).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::InvalidPath(_)));
    }
}
