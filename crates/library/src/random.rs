//! Uniformly random content entries.
//!
//! Entries are drawn by rejection sampling: pick an index in
//! `[0, entry_count)`, keep it if it's a content entry (not a redirect, not
//! metadata or an index), otherwise try again, up to [`RANDOM_RETRY_CEILING`]
//! times. If every attempt misses, the decoder's own random facility gets a
//! final go.

use crate::error::{ErrorKind, Result};
use crate::models::{ArchiveFailure, RandomEntry, RandomSelection};
use crate::reader::read_entry;
use rand::Rng;
use rand::seq::SliceRandom;
use std::collections::HashSet;
use tracing::{debug, warn};
use zimr_archive::{Archive, ArchiveId, EntryInfo};
use zimr_cache::ArchiveCache;
use zimr_content::{OutputOptions, Processor};

/// Attempts per draw before falling back to the decoder.
pub const RANDOM_RETRY_CEILING: usize = 16;
/// Largest number of entries one call may ask for.
pub const MAX_RANDOM_COUNT: usize = 50;

pub(crate) fn validate_count(count: usize) -> Result<()> {
    if count == 0 || count > MAX_RANDOM_COUNT {
        exn::bail!(ErrorKind::invalid(format!("count must be between 1 and {MAX_RANDOM_COUNT}, got {count}")));
    }
    Ok(())
}

/// Spread `count` draws round-robin over `archives`, in order. Returns
/// `(archive, draws)` pairs, skipping archives that get none.
pub(crate) fn plan(archives: Vec<ArchiveId>, count: usize) -> Vec<(ArchiveId, usize)> {
    let n = archives.len();
    if n == 0 {
        return Vec::new();
    }
    archives
        .into_iter()
        .enumerate()
        .map(|(i, id)| (id, count / n + usize::from(i < count % n)))
        .filter(|(_, draws)| *draws > 0)
        .collect()
}

/// Shuffle the archive list and keep at most `count` of them.
pub(crate) fn shuffled(mut archives: Vec<ArchiveId>, count: usize) -> Vec<ArchiveId> {
    archives.shuffle(&mut rand::thread_rng());
    archives.truncate(count);
    archives
}

fn random_index(entry_count: u64) -> u64 {
    rand::thread_rng().gen_range(0..entry_count)
}

/// Draw up to `draws` distinct content entries from each planned archive.
pub(crate) async fn select(
    archives: &ArchiveCache,
    processor: &Processor,
    plan: Vec<(ArchiveId, usize)>,
    options: Option<OutputOptions>,
) -> Result<RandomSelection> {
    let mut selection = RandomSelection::default();
    let mut opened = 0;
    for (id, draws) in plan {
        let lease = match archives.acquire(&id).await {
            Ok(lease) => lease,
            Err(err) => {
                warn!(archive = %id, error = %*err, "skipping archive for random selection");
                selection.failures.push(ArchiveFailure::new(id, &*err));
                continue;
            },
        };
        opened += 1;

        let mut taken = HashSet::new();
        for _ in 0..draws {
            let entry = match draw(&*lease, &taken).await {
                Ok(Some(entry)) => entry,
                Ok(None) => {
                    selection.failures.push(ArchiveFailure::new(
                        id.clone(),
                        format!("no content entry found after {RANDOM_RETRY_CEILING} attempts"),
                    ));
                    break;
                },
                Err(err) => {
                    warn!(archive = %id, error = %*err, "random draw failed");
                    selection.failures.push(ArchiveFailure::new(id.clone(), &*err));
                    break;
                },
            };
            taken.insert(entry.path.clone());
            let content = match options {
                Some(options) => match read_entry(&*lease, processor, &entry.path, options).await {
                    Ok(read) => Some(read.content),
                    Err(err) => {
                        selection.failures.push(ArchiveFailure::new(id.clone(), &*err));
                        continue;
                    },
                },
                None => None,
            };
            selection.entries.push(RandomEntry {
                archive_id: id.clone(),
                path: entry.path,
                title: entry.title,
                content,
            });
        }
    }
    if opened == 0 {
        exn::bail!(ErrorKind::NoResolvableArchives(selection.failures));
    }
    Ok(selection)
}

/// One rejection-sampled draw. `None` if nothing acceptable turned up.
async fn draw(archive: &dyn Archive, taken: &HashSet<String>) -> Result<Option<EntryInfo>> {
    let entry_count = archive.metadata().entry_count;
    let acceptable = |info: &EntryInfo| info.is_content() && !taken.contains(&info.path);
    if entry_count > 0 {
        for attempt in 1..=RANDOM_RETRY_CEILING {
            let index = random_index(entry_count);
            let info = archive.entry_at(index).await.map_err(ErrorKind::archive)?;
            match info {
                Some(info) if acceptable(&info) => return Ok(Some(info)),
                _ => debug!(index, attempt, "rejected random index"),
            }
        }
    }

    let Some(path) = archive.random_path().await.map_err(ErrorKind::archive)? else {
        return Ok(None);
    };
    let entry = archive.lookup(&path).await.map_err(ErrorKind::archive)?;
    let info = EntryInfo {
        path: entry.entry_path,
        title: entry.title,
        mime_type: entry.mime_type,
        is_redirect: entry.is_redirect,
    };
    Ok(acceptable(&info).then_some(info))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn ids(names: &[&str]) -> Vec<ArchiveId> {
        names.iter().map(|name| ArchiveId::new(*name)).collect()
    }

    #[rstest]
    #[case(&["a", "b", "c"], 7, &[("a", 3), ("b", 2), ("c", 2)])]
    #[case(&["a", "b", "c"], 2, &[("a", 1), ("b", 1)])]
    #[case(&["a"], 5, &[("a", 5)])]
    fn test_plan_is_round_robin(#[case] archives: &[&str], #[case] count: usize, #[case] expected: &[(&str, usize)]) {
        let expected: Vec<_> = expected.iter().map(|(id, n)| (ArchiveId::new(*id), *n)).collect();
        assert_eq!(plan(ids(archives), count), expected);
    }

    #[rstest]
    #[case(0, false)]
    #[case(1, true)]
    #[case(50, true)]
    #[case(51, false)]
    fn test_validate_count(#[case] count: usize, #[case] ok: bool) {
        assert_eq!(validate_count(count).is_ok(), ok);
    }

    #[test]
    fn test_shuffled_keeps_a_subset() {
        let all = ids(&["a", "b", "c", "d"]);
        let picked = shuffled(all.clone(), 2);
        assert_eq!(picked.len(), 2);
        assert!(picked.iter().all(|id| all.contains(id)));
    }
}
