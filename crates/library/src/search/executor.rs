//! Best-effort search of a single open archive.

use crate::models::SearchResultPage;
use futures::StreamExt;
use std::time::Duration;
use tokio::time::{Instant, timeout_at};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};
use zimr_archive::error::Result;
use zimr_archive::{Archive, HitStream, SearchHit};

enum Next<T> {
    Item(T),
    OutOfTime,
}

/// Run `text` against one archive and return the `[offset, offset + limit)`
/// window of its ranking.
///
/// The archive is asked for `offset + limit` hits. Hits are consumed until
/// the stream ends, enough have been collected, `timeout` elapses or
/// `cancel` fires; in the last two cases whatever was collected so far is
/// returned with `truncated` set.
///
/// # Errors
/// Only decoder failures (starting the query or reading a hit).
#[instrument(skip_all, fields(archive = %archive.metadata().id, limit = limit, offset = offset))]
pub async fn search_archive(
    archive: &dyn Archive,
    text: &str,
    limit: usize,
    offset: usize,
    timeout: Duration,
    cancel: &CancellationToken,
) -> Result<SearchResultPage> {
    let deadline = Instant::now() + timeout;
    let wanted = offset.saturating_add(limit);
    let id = &archive.metadata().id;

    let HitStream {
        estimated_matches,
        hits: mut stream,
    } = match next(deadline, cancel, archive.search(text, wanted)).await {
        Next::Item(stream) => stream?,
        Next::OutOfTime => {
            debug!("out of time before the query started");
            return Ok(window(Vec::new(), 0, offset, limit, true));
        },
    };

    let mut hits = Vec::new();
    let mut truncated = false;
    while hits.len() < wanted {
        match next(deadline, cancel, stream.next()).await {
            Next::Item(Some(hit)) => hits.push(SearchHit::from_archive_hit(id.clone(), hit?)),
            Next::Item(None) => break,
            Next::OutOfTime => {
                truncated = true;
                break;
            },
        }
    }
    debug!(collected = hits.len(), estimated_matches, truncated, "archive search finished");
    Ok(window(hits, estimated_matches, offset, limit, truncated))
}

/// Await `future` unless the deadline passes or the token is cancelled
/// first.
async fn next<F: Future>(deadline: Instant, cancel: &CancellationToken, future: F) -> Next<F::Output> {
    tokio::select! {
        biased;
        () = cancel.cancelled() => Next::OutOfTime,
        result = timeout_at(deadline, future) => match result {
            Ok(output) => Next::Item(output),
            Err(_elapsed) => Next::OutOfTime,
        },
    }
}

fn window(mut hits: Vec<SearchHit>, estimated_matches: u64, offset: usize, limit: usize, truncated: bool) -> SearchResultPage {
    hits.sort();
    let collected = hits.len();
    let hits: Vec<_> = hits.into_iter().skip(offset).take(limit).collect();
    let end = offset.saturating_add(limit);
    SearchResultPage {
        hits,
        total_estimated_matches: estimated_matches.max(collected as u64),
        truncated,
        has_more: collected > end || estimated_matches > end as u64,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use zimr_archive::{ArchiveDecoder, Discovery, MockArchive, MockDecoder};

    async fn open(archive: MockArchive) -> Box<dyn Archive> {
        let id = archive.id().clone();
        let decoder = MockDecoder::with_archives([archive]);
        let file = decoder.locate(&id).await.unwrap().unwrap();
        decoder.open(&file).await.unwrap()
    }

    fn planets() -> MockArchive {
        MockArchive::new("space.zim", "Space").with_hits(
            "planet",
            [("A/Mercury", 0.9), ("A/Venus", 0.8), ("A/Earth", 0.7), ("A/Mars", 0.6), ("A/Jupiter", 0.5)],
        )
    }

    fn paths(page: &SearchResultPage) -> Vec<&str> {
        page.hits.iter().map(|hit| hit.entry_path.as_str()).collect()
    }

    #[tokio::test]
    async fn test_window() {
        let archive = open(planets()).await;
        let page = search_archive(&*archive, "planet", 2, 1, Duration::from_secs(5), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(paths(&page), ["A/Venus", "A/Earth"]);
        assert_eq!(page.total_estimated_matches, 5);
        assert!(page.has_more);
        assert!(!page.truncated);
    }

    #[tokio::test]
    async fn test_window_past_the_end() {
        let archive = open(planets()).await;
        let page = search_archive(&*archive, "planet", 10, 10, Duration::from_secs(5), &CancellationToken::new())
            .await
            .unwrap();
        assert!(page.hits.is_empty());
        assert!(!page.has_more);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_keeps_partial_hits() {
        let archive = open(planets().with_hit_delay(Duration::from_millis(100))).await;
        // Enough time for two hits, not three.
        let page = search_archive(&*archive, "planet", 5, 0, Duration::from_millis(250), &CancellationToken::new())
            .await
            .unwrap();
        assert!(page.truncated);
        assert_eq!(paths(&page), ["A/Mercury", "A/Venus"]);
    }

    #[tokio::test]
    async fn test_cancelled_returns_truncated() {
        let archive = open(planets()).await;
        let cancel = CancellationToken::new();
        cancel.cancel();
        let page = search_archive(&*archive, "planet", 5, 0, Duration::from_secs(5), &cancel).await.unwrap();
        assert!(page.truncated);
        assert!(page.hits.is_empty());
    }
}
