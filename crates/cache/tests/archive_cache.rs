use std::sync::Arc;
use std::time::Duration;
use zimr_archive::error::ErrorKind;
use zimr_archive::{ArchiveId, MockArchive, MockDecoder};
use zimr_cache::ArchiveCache;

fn decoder(ids: &[&str]) -> Arc<MockDecoder> {
    Arc::new(MockDecoder::with_archives(
        ids.iter().map(|id| MockArchive::new(*id, id.to_uppercase()).with_entry("A/Main", "text/html", "<p>hi</p>")),
    ))
}

fn cache(capacity: usize, decoder: &Arc<MockDecoder>) -> ArchiveCache {
    ArchiveCache::new(capacity, u64::MAX, decoder.clone(), decoder.clone())
}

fn id(id: &str) -> ArchiveId {
    ArchiveId::new(id)
}

async fn touch(cache: &ArchiveCache, archive: &str) {
    drop(cache.acquire(&id(archive)).await.unwrap());
}

#[tokio::test]
async fn evicts_least_recently_used() {
    let decoder = decoder(&["a.zim", "b.zim", "c.zim"]);
    let cache = cache(2, &decoder);

    touch(&cache, "a.zim").await;
    touch(&cache, "b.zim").await;
    touch(&cache, "c.zim").await;
    assert_eq!(cache.resident(), vec![id("c.zim"), id("b.zim")]);

    // "a" comes back (re-opened), and "b" is now the oldest.
    touch(&cache, "a.zim").await;
    assert_eq!(cache.resident(), vec![id("a.zim"), id("c.zim")]);

    let counters = decoder.counters();
    assert_eq!(counters.opens(), 4);
    assert_eq!(counters.closes(), 2);
    assert_eq!(counters.open_now(), 2);
    assert_eq!(cache.stats().evictions, 2);
}

#[tokio::test]
async fn hits_refresh_recency() {
    let decoder = decoder(&["a.zim", "b.zim", "c.zim"]);
    let cache = cache(2, &decoder);

    touch(&cache, "a.zim").await;
    touch(&cache, "b.zim").await;
    touch(&cache, "a.zim").await;
    touch(&cache, "c.zim").await;

    assert!(cache.is_resident(&id("a.zim")));
    assert!(!cache.is_resident(&id("b.zim")));
    assert_eq!(decoder.counters().opens(), 3);
    let stats = cache.stats();
    assert_eq!((stats.hits, stats.misses), (1, 3));
}

#[tokio::test]
async fn leased_archives_are_never_evicted() {
    let decoder = decoder(&["a.zim", "b.zim", "c.zim"]);
    let cache = cache(1, &decoder);

    let a = cache.acquire(&id("a.zim")).await.unwrap();
    let b = cache.acquire(&id("b.zim")).await.unwrap();
    // Both leased: over capacity rather than closing something in use.
    assert_eq!(cache.stats().resident, 2);
    assert_eq!(decoder.counters().closes(), 0);

    touch(&cache, "c.zim").await;
    // "c" was the only unleased archive, so it's the one that went.
    assert!(!cache.is_resident(&id("c.zim")));
    assert!(cache.is_resident(&id("a.zim")));
    assert!(cache.is_resident(&id("b.zim")));
    assert_eq!(a.metadata().title, "A.ZIM");

    drop(a);
    // Releasing "a" shrinks the cache back to capacity.
    assert_eq!(cache.resident(), vec![id("b.zim")]);
    assert_eq!(decoder.counters().open_now(), 1);
    assert_eq!(b.lookup("A/Main").await.unwrap().mime_type, "text/html");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_acquires_share_one_open() {
    let decoder = Arc::new(
        MockDecoder::with_archives([MockArchive::new("slow.zim", "Slow")]).with_open_delay(Duration::from_millis(50)),
    );
    let cache = cache(2, &decoder);

    let tasks: Vec<_> = (0..16)
        .map(|_| {
            let cache = cache.clone();
            tokio::spawn(async move { cache.acquire(&id("slow.zim")).await.map(|lease| lease.id().clone()) })
        })
        .collect();
    for task in futures::future::join_all(tasks).await {
        assert_eq!(task.unwrap().unwrap(), id("slow.zim"));
    }
    assert_eq!(decoder.counters().opens(), 1);
    assert_eq!(cache.stats().opens, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn capacity_holds_under_concurrency() {
    let ids: Vec<String> = (0..8).map(|i| format!("{i}.zim")).collect();
    let refs: Vec<&str> = ids.iter().map(String::as_str).collect();
    let decoder = decoder(&refs);
    let cache = cache(3, &decoder);

    let tasks: Vec<_> = ids
        .iter()
        .cycle()
        .take(40)
        .cloned()
        .map(|archive| {
            let cache = cache.clone();
            tokio::spawn(async move {
                let lease = cache.acquire(&id(&archive)).await.unwrap();
                tokio::time::sleep(Duration::from_millis(1)).await;
                drop(lease);
            })
        })
        .collect();
    for task in futures::future::join_all(tasks).await {
        task.unwrap();
    }
    // Everything released: back within capacity, and nothing open that
    // the cache doesn't know about.
    assert!(cache.stats().resident <= 3);
    assert_eq!(decoder.counters().open_now(), cache.stats().resident);
}

#[tokio::test]
async fn oversized_archives_are_rejected_before_opening() {
    let decoder = Arc::new(MockDecoder::with_archives([MockArchive::new("huge.zim", "Huge").with_file_size(4096)]));
    let cache = ArchiveCache::new(2, 1024, decoder.clone(), decoder.clone());

    let err = cache.acquire(&id("huge.zim")).await.unwrap_err();
    assert_eq!(
        *err,
        ErrorKind::TooLarge {
            id: id("huge.zim"),
            size: 4096,
            limit: 1024
        }
    );
    assert_eq!(decoder.counters().opens(), 0);
}

#[tokio::test]
async fn unknown_archive_is_not_found() {
    let decoder = decoder(&["a.zim"]);
    let cache = cache(2, &decoder);
    let err = cache.acquire(&id("missing.zim")).await.unwrap_err();
    assert!(matches!(&*err, ErrorKind::NotFound(missing) if missing == &id("missing.zim")));
}

#[tokio::test]
async fn open_failures_are_not_cached() {
    let decoder = Arc::new(MockDecoder::with_archives([MockArchive::new("bad.zim", "Bad").corrupt()]));
    let cache = cache(2, &decoder);

    for _ in 0..2 {
        let err = cache.acquire(&id("bad.zim")).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::Corrupt(..)));
    }
    let stats = cache.stats();
    assert_eq!(stats.open_failures, 2);
    assert_eq!(stats.resident, 0);
}

#[tokio::test]
async fn peek_does_not_open() {
    let decoder = decoder(&["a.zim"]);
    let cache = cache(2, &decoder);
    assert!(cache.peek(&id("a.zim")).is_none());
    assert_eq!(decoder.counters().opens(), 0);
    touch(&cache, "a.zim").await;
    assert_eq!(cache.peek(&id("a.zim")).unwrap().title, "A.ZIM");
}

#[tokio::test]
async fn clear_keeps_leased_archives() {
    let decoder = decoder(&["a.zim", "b.zim"]);
    let cache = cache(2, &decoder);
    let a = cache.acquire(&id("a.zim")).await.unwrap();
    touch(&cache, "b.zim").await;

    assert_eq!(cache.clear(), 1);
    assert_eq!(cache.resident(), vec![id("a.zim")]);
    assert_eq!(decoder.counters().open_now(), 1);
    drop(a);
}

#[tokio::test]
async fn shutdown_closes_everything() {
    let decoder = decoder(&["a.zim", "b.zim"]);
    let cache = cache(2, &decoder);
    let a = cache.acquire(&id("a.zim")).await.unwrap();
    touch(&cache, "b.zim").await;

    assert_eq!(cache.shutdown(), 2);
    assert!(cache.resident().is_empty());
    // "a" is still leased, so it stays open until the lease goes.
    assert_eq!(decoder.counters().open_now(), 1);
    drop(a);
    assert_eq!(decoder.counters().open_now(), 0);
}

#[tokio::test]
async fn shutdown_refuses_further_acquires() {
    let decoder = decoder(&["a.zim"]);
    let cache = cache(2, &decoder);
    let a = cache.acquire(&id("a.zim")).await.unwrap();

    cache.shutdown();
    assert!(cache.is_closed());
    let err = cache.acquire(&id("a.zim")).await.unwrap_err();
    assert_eq!(*err, ErrorKind::Closed);
    // Never a second handle next to the one still leased.
    assert_eq!(decoder.counters().opens(), 1);
    assert_eq!(decoder.counters().open_now(), 1);

    drop(a);
    assert_eq!(decoder.counters().open_now(), 0);
}
