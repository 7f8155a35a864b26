use crate::error::{ErrorKind, Result};
use crate::models::{ArchiveSummary, MetadataReport};
use exn::ResultExt;
use zimr_archive::{ArchiveId, DiscoveryHandle, format_file_size};
use zimr_cache::ArchiveCache;

/// Every discoverable archive, sorted by id. Never opens anything.
pub(crate) async fn list_archives(
    discovery: &DiscoveryHandle,
    archives: &ArchiveCache,
    max_file_size: u64,
) -> Result<Vec<ArchiveSummary>> {
    let files = discovery.list().await.or_raise(|| ErrorKind::Discovery)?;
    Ok(files
        .into_iter()
        .map(|file| ArchiveSummary {
            resident: archives.is_resident(&file.id),
            metadata: archives.peek(&file.id),
            too_large: file.size > max_file_size,
            size_formatted: format_file_size(file.size),
            size_bytes: file.size,
            modified: file.modified,
            path: file.path,
            id: file.id,
        })
        .collect())
}

/// Full metadata for one archive, opening it through the cache if needed.
pub(crate) async fn metadata(archives: &ArchiveCache, id: &ArchiveId) -> Result<MetadataReport> {
    let was_resident = archives.is_resident(id);
    let lease = archives.acquire(id).await.map_err(ErrorKind::archive)?;
    Ok(MetadataReport {
        metadata: lease.metadata().clone(),
        was_resident,
    })
}
