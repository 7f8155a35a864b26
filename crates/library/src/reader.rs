use crate::error::{ErrorKind, Result};
use crate::models::EntryContent;
use std::time::Instant;
use tracing::debug;
use zimr_archive::{Archive, EntryPayload};
use zimr_content::{OutputOptions, Processor};

/// How many redirects are followed before giving up.
pub const REDIRECT_HOP_LIMIT: usize = 1;

/// Look up `path`, following at most [`REDIRECT_HOP_LIMIT`] redirects.
/// Returns the payload and whether a redirect was followed.
///
/// # Errors
/// [`UnresolvedRedirect`](ErrorKind::UnresolvedRedirect) if the chain is
/// longer than the hop limit or a redirect has no target; archive errors
/// (such as a missing entry) otherwise.
pub(crate) async fn resolve(archive: &dyn Archive, path: &str) -> Result<(EntryPayload, bool)> {
    let mut entry = archive.lookup(path).await.map_err(ErrorKind::archive)?;
    let mut hops = 0;
    while entry.is_redirect {
        let target = entry.redirect_target.clone().unwrap_or_default();
        if hops == REDIRECT_HOP_LIMIT || target.is_empty() {
            exn::bail!(ErrorKind::UnresolvedRedirect {
                archive: archive.metadata().id.clone(),
                path: entry.entry_path,
                target,
            });
        }
        debug!(from = %entry.entry_path, to = %target, "following redirect");
        hops += 1;
        entry = archive.lookup(&target).await.map_err(ErrorKind::archive)?;
    }
    Ok((entry, hops > 0))
}

/// Resolve and process one entry of an already-leased archive.
pub(crate) async fn read_entry(
    archive: &dyn Archive,
    processor: &Processor,
    path: &str,
    options: OutputOptions,
) -> Result<EntryContent> {
    let started = Instant::now();
    let (entry, redirected) = resolve(archive, path).await?;
    let resolved_path = entry.entry_path.clone();
    let title = entry.title.clone();
    let mime_type = entry.mime_type.clone();
    let content = processor.process(entry, options);
    Ok(EntryContent {
        archive_id: archive.metadata().id.clone(),
        requested_path: path.to_string(),
        resolved_path,
        redirected,
        title,
        mime_type,
        content,
        elapsed: started.elapsed(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use zimr_archive::error::ErrorKind as ArchiveErrorKind;
    use zimr_archive::{ArchiveDecoder, ArchiveId, Discovery, MockArchive, MockDecoder};

    async fn archive() -> Box<dyn Archive> {
        let decoder = MockDecoder::with_archives([MockArchive::new("wiki.zim", "Wiki")
            .with_titled_entry("A/Earth", "Earth", "text/html", "<p>Third planet.</p>")
            .with_redirect("A/Terra", "A/Earth")
            .with_redirect("A/World", "A/Terra")
            .with_redirect("A/Nowhere", "")]);
        let file = decoder.locate(&ArchiveId::new("wiki.zim")).await.unwrap().unwrap();
        decoder.open(&file).await.unwrap()
    }

    #[tokio::test]
    async fn test_direct_entry() {
        let archive = archive().await;
        let (entry, redirected) = resolve(&*archive, "A/Earth").await.unwrap();
        assert_eq!(entry.title, "Earth");
        assert!(!redirected);
    }

    #[tokio::test]
    async fn test_single_hop_is_followed() {
        let archive = archive().await;
        let (entry, redirected) = resolve(&*archive, "A/Terra").await.unwrap();
        assert_eq!(entry.entry_path, "A/Earth");
        assert!(redirected);
    }

    #[tokio::test]
    async fn test_second_hop_is_unresolved() {
        let archive = archive().await;
        let err = resolve(&*archive, "A/World").await.unwrap_err();
        assert_eq!(
            *err,
            ErrorKind::UnresolvedRedirect {
                archive: ArchiveId::new("wiki.zim"),
                path: "A/Terra".to_string(),
                target: "A/Earth".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn test_redirect_without_target() {
        let archive = archive().await;
        let err = resolve(&*archive, "A/Nowhere").await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::UnresolvedRedirect { target, .. } if target.is_empty()));
    }

    #[tokio::test]
    async fn test_missing_entry() {
        let archive = archive().await;
        let err = resolve(&*archive, "A/Pluto").await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::Archive(ArchiveErrorKind::EntryNotFound(_, path)) if path == "A/Pluto"));
    }

    #[tokio::test]
    async fn test_read_entry_reports_resolution() {
        let archive = archive().await;
        let content = read_entry(&*archive, &Processor::default(), "A/Terra", OutputOptions::default()).await.unwrap();
        assert_eq!(content.requested_path, "A/Terra");
        assert_eq!(content.resolved_path, "A/Earth");
        assert!(content.redirected);
        assert!(content.content.text().unwrap().contains("Third planet"));
    }
}
