//! Fan-out search across archives.
//!
//! Each targeted archive is searched by its own spawned task, at most
//! `concurrency` at a time; the rest wait in FIFO order. Every task is
//! awaited before merging, so the merged order never depends on which
//! archive answered first.

mod executor;

pub use self::executor::search_archive;
use crate::error::{ErrorKind, Result};
use crate::models::{ArchiveFailure, SearchOutcome, SearchQuery, SearchResultPage};
use exn::ResultExt;
use futures::stream::FuturesUnordered;
use futures::{FutureExt, StreamExt};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, instrument, warn};
use zimr_archive::{ArchiveId, DiscoveryHandle, SearchHit};
use zimr_cache::{ArchiveCache, SearchCache, SearchKey};

/// Longest accepted query, in characters.
pub const MAX_QUERY_CHARS: usize = 1000;

type ArchiveOutcome = (ArchiveId, std::result::Result<SearchResultPage, String>);

/// Runs searches through the search cache, fanning out on a miss.
pub(crate) struct Orchestrator {
    pub(crate) archives: ArchiveCache,
    pub(crate) discovery: DiscoveryHandle,
    pub(crate) cache: SearchCache<SearchResultPage>,
    pub(crate) timeout: Duration,
    pub(crate) concurrency: usize,
    pub(crate) max_results: usize,
}

impl Orchestrator {
    #[instrument(skip_all, fields(query = %query.text, max_results = query.max_results, start_offset = query.start_offset))]
    pub(crate) async fn search(&self, query: SearchQuery) -> Result<SearchOutcome> {
        self.validate(&query)?;
        let targets = self.targets(&query.archives).await?;
        if targets.is_empty() {
            exn::bail!(ErrorKind::NoResolvableArchives(Vec::new()));
        }

        let key = SearchKey::new(&query.text, targets.iter().cloned(), query.max_results, query.start_offset);
        if let Some(page) = self.cache.get(&key) {
            return Ok(SearchOutcome {
                page,
                failures: Vec::new(),
                cached: true,
            });
        }

        // The decoder sees exactly the text the cache entry is keyed on.
        let text: Arc<str> = Arc::from(key.query());
        let wanted = query.start_offset.saturating_add(query.max_results);
        let (pages, failures) = self.fan_out(targets, text, wanted).await;
        if pages.is_empty() {
            exn::bail!(ErrorKind::NoResolvableArchives(failures));
        }

        let page = merge(pages, query.start_offset, query.max_results);
        info!(
            hits = page.hits.len(),
            failed = failures.len(),
            truncated = page.truncated,
            has_more = page.has_more,
            "search complete"
        );
        let page = match page.truncated || !failures.is_empty() {
            // Incomplete answers are not memoized; the next call gets another go.
            true => Arc::new(page),
            false => self.cache.insert(key, page),
        };
        Ok(SearchOutcome {
            page,
            failures,
            cached: false,
        })
    }

    fn validate(&self, query: &SearchQuery) -> Result<()> {
        let text = query.text.trim();
        if text.is_empty() {
            exn::bail!(ErrorKind::invalid("query must not be blank"));
        }
        if text.chars().count() > MAX_QUERY_CHARS {
            exn::bail!(ErrorKind::invalid(format!("query is longer than {MAX_QUERY_CHARS} characters")));
        }
        if query.max_results == 0 || query.max_results > self.max_results {
            exn::bail!(ErrorKind::invalid(format!(
                "max_results must be between 1 and {}, got {}",
                self.max_results, query.max_results
            )));
        }
        Ok(())
    }

    /// The explicit list (sorted, de-duplicated), or every discoverable
    /// archive.
    async fn targets(&self, requested: &[ArchiveId]) -> Result<Vec<ArchiveId>> {
        let mut targets = match requested.is_empty() {
            true => {
                let files = self.discovery.list().await.or_raise(|| ErrorKind::Discovery)?;
                files.into_iter().map(|file| file.id).collect()
            },
            false => requested.to_vec(),
        };
        targets.sort();
        targets.dedup();
        Ok(targets)
    }

    async fn fan_out(
        &self,
        targets: Vec<ArchiveId>,
        text: Arc<str>,
        wanted: usize,
    ) -> (Vec<SearchResultPage>, Vec<ArchiveFailure>) {
        // Dropping this future (caller gave up) cancels every task still
        // running; the guard also fires on the way out, after all of them
        // have finished.
        let cancel = CancellationToken::new();
        let _guard = cancel.clone().drop_guard();

        let mut queued = targets;
        let mut running = FuturesUnordered::new();
        let first = self.concurrency.max(1).min(queued.len());
        running.extend(queued.drain(..first).map(|id| self.spawn(id, Arc::clone(&text), wanted, cancel.child_token())));

        let mut pages = Vec::new();
        let mut failures = Vec::new();
        while let Some((id, outcome)) = running.next().await {
            match outcome {
                Ok(page) => pages.push(page),
                Err(reason) => {
                    warn!(archive = %id, %reason, "archive search failed");
                    failures.push(ArchiveFailure::new(id, reason));
                },
            }
            // Pop-n-push, but FIFO instead of LIFO.
            if !queued.is_empty() {
                let id = queued.remove(0);
                running.push(self.spawn(id, Arc::clone(&text), wanted, cancel.child_token()));
            }
        }
        failures.sort_by(|a, b| a.archive_id.cmp(&b.archive_id));
        (pages, failures)
    }

    /// Search one archive on its own task. The archive id travels outside
    /// the task, so a task that panics is still reported against it.
    fn spawn(
        &self,
        id: ArchiveId,
        text: Arc<str>,
        wanted: usize,
        cancel: CancellationToken,
    ) -> impl Future<Output = ArchiveOutcome> + Send + use<> {
        let archives = self.archives.clone();
        let timeout = self.timeout;
        let task_id = id.clone();
        let handle = tokio::spawn(
            async move {
                let outcome = match archives.acquire(&task_id).await {
                    Ok(lease) => search_archive(&*lease, &text, wanted, 0, timeout, &cancel)
                        .await
                        .map_err(|err| (*err).to_string()),
                    Err(err) => Err((*err).to_string()),
                };
                debug!(archive = %task_id, ok = outcome.is_ok(), "archive search task done");
                outcome
            }
            .in_current_span(),
        );
        handle.map(move |joined| match joined {
            Ok(outcome) => (id, outcome),
            Err(err) => (id, Err(format!("search task failed: {err}"))),
        })
    }
}

/// Merge per-archive pages into one global ranking and cut the requested
/// window out of it. Identical (archive, path) pairs keep their best hit.
pub(crate) fn merge(pages: Vec<SearchResultPage>, start_offset: usize, max_results: usize) -> SearchResultPage {
    let truncated = pages.iter().any(|page| page.truncated);
    let total_estimated_matches = pages.iter().map(|page| page.total_estimated_matches).sum::<u64>();
    let mut hits: Vec<SearchHit> = pages.into_iter().flat_map(|page| page.hits).collect();
    hits.sort();
    let mut seen = HashSet::new();
    hits.retain(|hit| seen.insert((hit.archive_id.clone(), hit.entry_path.clone())));

    let end = start_offset.saturating_add(max_results);
    let has_more = hits.len() > end || total_estimated_matches > end as u64;
    let hits = hits.into_iter().skip(start_offset).take(max_results).collect();
    SearchResultPage {
        hits,
        total_estimated_matches,
        truncated,
        has_more,
    }
}
