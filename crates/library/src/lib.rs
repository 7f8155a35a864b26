//! Query and read access to a directory of ZIM archives.
//!
//! [`Library`] is the process-wide state: build one at startup, share it by
//! reference (or `Arc`), and call [`Library::shutdown`] on the way out. Every
//! operation reaches archives only through its [`ArchiveCache`], so at most
//! `archives.cache_capacity` archives are open at any time (plus any that
//! are still leased), and every payload goes through the same
//! [`Processor`].
//!
//! ```
//! use std::sync::Arc;
//! use zimr_config::Config;
//! use zimr_library::{Library, SearchQuery};
//! use zimr_archive::{MockArchive, MockDecoder};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let decoder = Arc::new(MockDecoder::with_archives([
//!     MockArchive::new("wiki.zim", "Wiki").with_entry("A/Sun", "text/html", "<p>The sun is a star.</p>"),
//! ]));
//! let library = Library::new(Config::default(), decoder.clone(), decoder);
//!
//! let outcome = library.search(SearchQuery::new("star")).await?;
//! assert_eq!(outcome.page.hits[0].entry_path, "A/Sun");
//!
//! let entry = library.read(&"wiki.zim".into(), "A/Sun", library.default_options()).await?;
//! assert!(entry.content.text().unwrap().contains("star"));
//! # Ok(())
//! # }
//! ```

pub mod error;
mod listing;
mod models;
mod random;
mod reader;
mod search;

pub use crate::models::{
    ArchiveFailure, ArchiveSummary, ClearedCaches, DEFAULT_MAX_RESULTS, EntryContent, LibraryStats, MetadataReport,
    RandomEntry, RandomSelection, SearchOutcome, SearchQuery, SearchResultPage,
};
pub use crate::random::{MAX_RANDOM_COUNT, RANDOM_RETRY_CEILING};
pub use crate::reader::REDIRECT_HOP_LIMIT;
pub use crate::search::{MAX_QUERY_CHARS, search_archive};
use crate::error::{ErrorKind, Result};
use crate::search::Orchestrator;
use exn::ResultExt;
use std::sync::Arc;
use tracing::{info, instrument};
use zimr_archive::{ArchiveId, DecoderHandle, DirectoryDiscovery, DiscoveryHandle};
use zimr_cache::{ArchiveCache, SearchCache};
use zimr_config::Config;
use zimr_content::{OutputOptions, Processor};

pub struct Library {
    config: Config,
    discovery: DiscoveryHandle,
    archives: ArchiveCache,
    search: Orchestrator,
    processor: Processor,
}

impl std::fmt::Debug for Library {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Library")
            .field("discovery", &self.discovery.name())
            .field("archives", &self.archives)
            .field("search_cache", &self.search.cache)
            .field("processor", &self.processor)
            .finish()
    }
}

impl Library {
    /// Wire up a library from an already validated configuration.
    pub fn new(config: Config, discovery: DiscoveryHandle, decoder: DecoderHandle) -> Self {
        let archives = ArchiveCache::new(
            config.archives.cache_capacity,
            config.archives.max_file_size,
            Arc::clone(&discovery),
            decoder,
        );
        let search = Orchestrator {
            archives: archives.clone(),
            discovery: Arc::clone(&discovery),
            cache: SearchCache::new(config.search.cache_capacity),
            timeout: config.search.timeout(),
            concurrency: config.search.concurrency(),
            max_results: config.search.max_results,
        };
        let processor = Processor::new(config.content.max_chars);
        info!(
            discovery = discovery.name(),
            archive_capacity = config.archives.cache_capacity,
            search_capacity = config.search.cache_capacity,
            concurrency = search.concurrency,
            "library ready"
        );
        Self {
            config,
            discovery,
            archives,
            search,
            processor,
        }
    }

    /// Discover archives under the configured `archive_directory`.
    ///
    /// # Errors
    /// If the directory doesn't exist or isn't a directory.
    pub fn open_directory(config: Config, decoder: DecoderHandle) -> Result<Self> {
        let discovery = DirectoryDiscovery::new(&config.archive_directory).or_raise(|| ErrorKind::Discovery)?;
        Ok(Self::new(config, Arc::new(discovery), decoder))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Output options matching the configured `content.default_mode`.
    pub fn default_options(&self) -> OutputOptions {
        self.config.content.default_mode.into()
    }

    /// Full-text search across the query's archives (or all of them).
    ///
    /// Archives that fail are listed in [`SearchOutcome::failures`]; the
    /// call itself fails only if the query is invalid or no archive at all
    /// could be searched.
    pub async fn search(&self, query: SearchQuery) -> Result<SearchOutcome> {
        self.search.search(query).await
    }

    /// Read and process one entry, following at most one redirect.
    #[instrument(skip_all, fields(archive = %archive, path = path))]
    pub async fn read(&self, archive: &ArchiveId, path: &str, options: OutputOptions) -> Result<EntryContent> {
        let lease = self.archives.acquire(archive).await.map_err(ErrorKind::archive)?;
        reader::read_entry(&*lease, &self.processor, path, options).await
    }

    /// Read the archive's designated main entry.
    #[instrument(skip_all, fields(archive = %archive))]
    pub async fn read_main(&self, archive: &ArchiveId, options: OutputOptions) -> Result<EntryContent> {
        let lease = self.archives.acquire(archive).await.map_err(ErrorKind::archive)?;
        let Some(path) = lease.metadata().main_entry_path.clone() else {
            exn::bail!(ErrorKind::NoMainEntry(archive.clone()));
        };
        reader::read_entry(&*lease, &self.processor, &path, options).await
    }

    /// Draw `count` random content entries.
    ///
    /// With no archives given, a random subset of (at most `count`)
    /// discoverable archives is used. Draws are spread round-robin over the
    /// archives; content is only read and processed when `options` is given.
    #[instrument(skip_all, fields(archives = archives.len(), count = count))]
    pub async fn random_entries(
        &self,
        archives: Vec<ArchiveId>,
        count: usize,
        options: Option<OutputOptions>,
    ) -> Result<RandomSelection> {
        random::validate_count(count)?;
        let archives = match archives.is_empty() {
            true => {
                let files = self.discovery.list().await.or_raise(|| ErrorKind::Discovery)?;
                random::shuffled(files.into_iter().map(|file| file.id).collect(), count)
            },
            false => {
                let mut unique = Vec::with_capacity(archives.len());
                for id in archives {
                    if !unique.contains(&id) {
                        unique.push(id);
                    }
                }
                unique
            },
        };
        let plan = random::plan(archives, count);
        random::select(&self.archives, &self.processor, plan, options).await
    }

    /// Every discoverable archive. Only archives that are already open
    /// carry metadata; listing never opens anything.
    pub async fn list_archives(&self) -> Result<Vec<ArchiveSummary>> {
        listing::list_archives(&self.discovery, &self.archives, self.config.archives.max_file_size).await
    }

    #[instrument(skip_all, fields(archive = %archive))]
    pub async fn metadata(&self, archive: &ArchiveId) -> Result<MetadataReport> {
        listing::metadata(&self.archives, archive).await
    }

    pub fn stats(&self) -> LibraryStats {
        LibraryStats {
            archives: self.archives.stats(),
            searches: self.search.cache.stats(),
        }
    }

    /// Forget every cached search and close every archive not currently in
    /// use.
    pub fn clear_caches(&self) -> ClearedCaches {
        let cleared = ClearedCaches {
            searches: self.search.cache.clear(),
            archives: self.archives.clear(),
        };
        info!(archives = cleared.archives, searches = cleared.searches, "caches cleared");
        cleared
    }

    /// Drop every resident archive and cached search. Archives still leased
    /// by in-flight calls close as soon as those calls finish, and any later
    /// call that needs an archive fails with
    /// [`Closed`](zimr_archive::error::ErrorKind::Closed). Returns the number
    /// of archives that were resident.
    pub fn shutdown(&self) -> usize {
        self.search.cache.clear();
        self.archives.shutdown()
    }
}
