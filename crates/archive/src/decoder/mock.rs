//! In-memory decoder for testing.

use super::{Archive, ArchiveDecoder, HitStream};
use crate::discovery::{ArchiveFileStream, Discovery};
use crate::error::{ErrorKind, Result};
use crate::models::{ArchiveFile, ArchiveHit, ArchiveId, ArchiveMetadata, EntryInfo, EntryPayload};
use async_stream::stream;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use time::OffsetDateTime;

/// Definition of one in-memory archive, built up with `with_*` methods and
/// handed to [`MockDecoder::with_archives`].
#[derive(Debug, Clone)]
pub struct MockArchive {
    metadata: ArchiveMetadata,
    entries: Vec<EntryPayload>,
    hits: HashMap<String, Vec<ArchiveHit>>,
    hit_delay: Option<Duration>,
    corrupt: bool,
    search_panics: bool,
}

impl MockArchive {
    pub fn new(id: impl Into<ArchiveId>, title: impl Into<String>) -> Self {
        let mut metadata = ArchiveMetadata::new(id, title, 0);
        metadata.file_size_bytes = 1024;
        Self {
            metadata,
            entries: Vec::new(),
            hits: HashMap::new(),
            hit_delay: None,
            corrupt: false,
            search_panics: false,
        }
    }

    /// Add an entry whose title is its path.
    pub fn with_entry(self, path: impl Into<String>, mime_type: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        let path = path.into();
        let title = path.clone();
        self.with_titled_entry(path, title, mime_type, bytes)
    }

    pub fn with_titled_entry(
        mut self,
        path: impl Into<String>,
        title: impl Into<String>,
        mime_type: impl Into<String>,
        bytes: impl Into<Vec<u8>>,
    ) -> Self {
        let payload = EntryPayload::new(self.metadata.id.clone(), path, mime_type, bytes).with_title(title);
        self.push(payload);
        self
    }

    pub fn with_redirect(mut self, path: impl Into<String>, target: impl Into<String>) -> Self {
        let payload = EntryPayload::redirect(self.metadata.id.clone(), path, target);
        self.push(payload);
        self
    }

    pub fn with_main_entry(mut self, path: impl Into<String>) -> Self {
        self.metadata.main_entry_path = Some(path.into());
        self
    }

    /// Fix the results of a query. Like a real query parser, configured
    /// queries are matched case-sensitively (after trimming). Unconfigured
    /// queries fall back to a naive, case-insensitive substring match over
    /// text entries.
    pub fn with_hits<'a>(mut self, query: &str, hits: impl IntoIterator<Item = (&'a str, f64)>) -> Self {
        let hits = hits
            .into_iter()
            .map(|(path, score)| ArchiveHit {
                path: path.to_string(),
                title: self.title_of(path),
                score,
                snippet: None,
            })
            .collect();
        self.hits.insert(Self::query_key(query), hits);
        self
    }

    /// Sleep before yielding each search hit.
    pub fn with_hit_delay(mut self, delay: Duration) -> Self {
        self.hit_delay = Some(delay);
        self
    }

    pub fn with_file_size(mut self, bytes: u64) -> Self {
        self.metadata.file_size_bytes = bytes;
        self
    }

    pub fn with_metadata(mut self, update: impl FnOnce(&mut ArchiveMetadata)) -> Self {
        update(&mut self.metadata);
        self
    }

    /// Opening this archive fails with [`ErrorKind::Corrupt`].
    pub fn corrupt(mut self) -> Self {
        self.corrupt = true;
        self
    }

    /// Searching this archive panics, as a buggy native decoder might.
    pub fn panicking_search(mut self) -> Self {
        self.search_panics = true;
        self
    }

    pub fn id(&self) -> &ArchiveId {
        &self.metadata.id
    }

    fn push(&mut self, payload: EntryPayload) {
        if self.entries.iter().any(|e| e.entry_path == payload.entry_path) {
            // The panic here is DELIBERATE. If test setup is wrong, then
            // the test should not pass.
            panic!("MockArchive: duplicate entry {}", payload.entry_path);
        }
        self.entries.push(payload);
        self.metadata.entry_count = self.entries.len() as u64;
        self.metadata.article_count = self.entries.iter().filter(|e| e.mime_type.starts_with("text/html")).count() as u64;
        self.metadata.media_count = self.entries.iter().filter(|e| e.mime_type.starts_with("image/")).count() as u64;
    }

    fn title_of(&self, path: &str) -> String {
        self.entries
            .iter()
            .find(|e| e.entry_path == path)
            .map(|e| e.title.clone())
            .unwrap_or_else(|| path.to_string())
    }

    fn query_key(query: &str) -> String {
        query.trim().to_string()
    }

    fn naive_hits(&self, query: &str) -> Vec<ArchiveHit> {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return Vec::new();
        }
        let mut hits: Vec<ArchiveHit> = self
            .entries
            .iter()
            .filter(|e| !e.is_redirect && e.mime_type.starts_with("text/"))
            .filter_map(|e| {
                let haystack = String::from_utf8_lossy(&e.bytes).to_lowercase();
                let occurrences = haystack.matches(needle.as_str()).count();
                (occurrences > 0).then(|| ArchiveHit {
                    path: e.entry_path.clone(),
                    title: e.title.clone(),
                    score: occurrences as f64,
                    snippet: None,
                })
            })
            .collect();
        hits.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.path.cmp(&b.path)));
        hits
    }
}

/// Call counters shared by a [`MockDecoder`] and every archive it opens.
#[derive(Debug, Default)]
pub struct MockCounters {
    opens: AtomicUsize,
    closes: AtomicUsize,
    searches: AtomicUsize,
    searching: AtomicUsize,
    peak_searches: AtomicUsize,
    lookups: AtomicUsize,
}

impl MockCounters {
    /// Number of successful `open` calls.
    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    /// Number of opened archives that have since been dropped.
    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    /// Archives currently open.
    pub fn open_now(&self) -> usize {
        self.opens().saturating_sub(self.closes())
    }

    /// Number of full-text queries executed, across all archives.
    pub fn searches(&self) -> usize {
        self.searches.load(Ordering::SeqCst)
    }

    /// Most hit streams ever being consumed at the same time.
    pub fn peak_searches(&self) -> usize {
        self.peak_searches.load(Ordering::SeqCst)
    }

    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

/// Marks one hit stream as being consumed, until dropped.
struct Searching(Arc<MockCounters>);

impl Searching {
    fn enter(counters: Arc<MockCounters>) -> Self {
        let now = counters.searching.fetch_add(1, Ordering::SeqCst) + 1;
        counters.peak_searches.fetch_max(now, Ordering::SeqCst);
        Self(counters)
    }
}

impl Drop for Searching {
    fn drop(&mut self) {
        self.0.searching.fetch_sub(1, Ordering::SeqCst);
    }
}

/// In-memory decoder (and discovery) for testing.
///
/// Archives are defined up front with [`MockArchive`]; the same value serves
/// as both the [`Discovery`] collaborator and the [`ArchiveDecoder`], so a
/// test only has to build one thing. [`MockCounters`] record how many times
/// archives were opened, closed and searched.
///
/// # Examples
///
/// ```
/// use zimr_archive::{Archive, ArchiveDecoder, Discovery, MockArchive, MockDecoder};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let decoder = MockDecoder::with_archives([
///     MockArchive::new("wiki.zim", "Wiki").with_entry("A/Home", "text/html", "<h1>Hi</h1>"),
/// ]);
/// let file = decoder.locate(&"wiki.zim".into()).await?.unwrap();
/// let archive = decoder.open(&file).await?;
/// assert_eq!(archive.metadata().entry_count, 1);
/// assert_eq!(decoder.counters().open_now(), 1);
/// drop(archive);
/// assert_eq!(decoder.counters().open_now(), 0);
/// # Ok(())
/// # }
/// ```
pub struct MockDecoder {
    archives: HashMap<ArchiveId, Arc<MockArchive>>,
    counters: Arc<MockCounters>,
    open_delay: Option<Duration>,
    discovered_at: OffsetDateTime,
}

impl MockDecoder {
    /// Panics if two archives share an identifier.
    pub fn with_archives(archives: impl IntoIterator<Item = MockArchive>) -> Self {
        let mut map = HashMap::new();
        for archive in archives {
            let id = archive.id().clone();
            if map.insert(id.clone(), Arc::new(archive)).is_some() {
                panic!("MockDecoder::with_archives: duplicate archive {id}");
            }
        }
        Self {
            archives: map,
            counters: Arc::new(MockCounters::default()),
            open_delay: None,
            discovered_at: OffsetDateTime::now_utc(),
        }
    }

    /// Sleep inside every `open` call (to widen race windows in tests).
    pub fn with_open_delay(mut self, delay: Duration) -> Self {
        self.open_delay = Some(delay);
        self
    }

    pub fn counters(&self) -> Arc<MockCounters> {
        Arc::clone(&self.counters)
    }

    fn file_for(&self, archive: &MockArchive) -> ArchiveFile {
        let id = archive.id().clone();
        ArchiveFile::new(
            id.clone(),
            PathBuf::from(id.as_str()),
            archive.metadata.file_size_bytes,
            self.discovered_at,
        )
    }
}

impl Default for MockDecoder {
    fn default() -> Self {
        Self::with_archives([])
    }
}

#[async_trait]
impl ArchiveDecoder for MockDecoder {
    fn name(&self) -> &str {
        "mock"
    }

    async fn open(&self, file: &ArchiveFile) -> Result<Box<dyn Archive>> {
        if let Some(delay) = self.open_delay {
            tokio::time::sleep(delay).await;
        }
        let Some(data) = self.archives.get(&file.id) else {
            exn::bail!(ErrorKind::NotFound(file.id.clone()));
        };
        if data.corrupt {
            exn::bail!(ErrorKind::Corrupt(file.id.clone(), "bad magic number".to_string()));
        }
        self.counters.opens.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(OpenMockArchive {
            data: Arc::clone(data),
            counters: Arc::clone(&self.counters),
        }))
    }
}

#[async_trait]
impl Discovery for MockDecoder {
    fn name(&self) -> &str {
        "mock"
    }

    fn list_stream<'a>(&'a self) -> ArchiveFileStream<'a> {
        let files: Vec<_> = self.archives.values().map(|a| Ok(self.file_for(a))).collect();
        Box::pin(futures::stream::iter(files))
    }

    async fn locate(&self, id: &ArchiveId) -> Result<Option<ArchiveFile>> {
        Ok(self.archives.get(id).map(|a| self.file_for(a)))
    }
}

struct OpenMockArchive {
    data: Arc<MockArchive>,
    counters: Arc<MockCounters>,
}

impl Drop for OpenMockArchive {
    fn drop(&mut self) {
        self.counters.closes.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl Archive for OpenMockArchive {
    fn metadata(&self) -> &ArchiveMetadata {
        &self.data.metadata
    }

    async fn lookup(&self, path: &str) -> Result<EntryPayload> {
        self.counters.lookups.fetch_add(1, Ordering::SeqCst);
        self.data
            .entries
            .iter()
            .find(|e| e.entry_path == path)
            .cloned()
            .ok_or_else(|| exn::Exn::from(ErrorKind::EntryNotFound(self.data.metadata.id.clone(), path.to_string())))
    }

    async fn entry_at(&self, index: u64) -> Result<Option<EntryInfo>> {
        let entry = usize::try_from(index).ok().and_then(|i| self.data.entries.get(i));
        Ok(entry.map(|e| EntryInfo {
            path: e.entry_path.clone(),
            title: e.title.clone(),
            mime_type: e.mime_type.clone(),
            is_redirect: e.is_redirect,
        }))
    }

    async fn search<'a>(&'a self, text: &'a str, limit: usize) -> Result<HitStream<'a>> {
        self.counters.searches.fetch_add(1, Ordering::SeqCst);
        if self.data.search_panics {
            panic!("MockArchive: search of {} panicked", self.data.metadata.id);
        }
        let all = match self.data.hits.get(&MockArchive::query_key(text)) {
            Some(hits) => hits.clone(),
            None => self.data.naive_hits(text),
        };
        let estimated = all.len() as u64;
        let delay = self.data.hit_delay;
        let counters = Arc::clone(&self.counters);
        let hits = stream! {
            let _searching = Searching::enter(counters);
            for hit in all.into_iter().take(limit) {
                if let Some(delay) = delay {
                    tokio::time::sleep(delay).await;
                }
                yield Ok(hit);
            }
        };
        Ok(HitStream::new(estimated, Box::pin(hits)))
    }
}
