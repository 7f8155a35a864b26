//! Bounded cache of open archives.
//!
//! Opening an archive means reading its header, directory pointers and
//! (lazily) its indices, which is far too slow to do per request. The cache
//! keeps at most `capacity` archives open, closing the least recently used
//! one when a new archive has to be opened.
//!
//! Rules:
//! - At most one open handle per archive. Concurrent [`acquire`](ArchiveCache::acquire)
//!   calls for an archive that isn't open yet share a single open.
//! - An archive is never closed while a caller holds an [`ArchiveLease`] on
//!   it. If every surplus archive is leased, the cache goes over capacity and
//!   shrinks back as leases are released.
//! - Open failures are reported to every waiting caller and never cached.
//! - The internal lock is never held while opening or closing an archive.
//! - After [`shutdown`](ArchiveCache::shutdown) every acquire fails with
//!   [`Closed`](ErrorKind::Closed).

use crate::stats::ArchiveCacheStats;
use lru::LruCache;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::num::NonZeroUsize;
use std::ops::Deref;
use std::sync::{Arc, Weak};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Instant;
use tokio::sync::OnceCell;
use tracing::{debug, info, instrument, warn};
use zimr_archive::error::{ErrorKind, Result};
use zimr_archive::{Archive, ArchiveId, ArchiveMetadata, DecoderHandle, DiscoveryHandle};

type OpenOutcome = std::result::Result<Arc<Slot>, ErrorKind>;

struct Slot {
    archive: Box<dyn Archive>,
    /// Outstanding leases. Only modified while holding the state lock.
    borrows: AtomicUsize,
    opened_at: Instant,
}

struct State {
    /// Unbounded as far as `lru` is concerned; capacity is enforced by
    /// `ArchiveCache::evict` so that leased archives can be skipped.
    resident: LruCache<ArchiveId, Arc<Slot>>,
    inflight: HashMap<ArchiveId, Arc<OnceCell<OpenOutcome>>>,
    /// Archives dropped from `resident` while something else (a waiter's
    /// in-flight cell) still holds them open. Reinstated rather than opened
    /// again.
    draining: HashMap<ArchiveId, Weak<Slot>>,
    closed: bool,
}

#[derive(Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    opens: AtomicU64,
    open_failures: AtomicU64,
    evictions: AtomicU64,
}

struct Inner {
    capacity: NonZeroUsize,
    max_file_size: u64,
    discovery: DiscoveryHandle,
    decoder: DecoderHandle,
    state: Mutex<State>,
    counters: Counters,
}

/// Shared, cloneable handle to the archive cache. Clones share the same
/// resident set.
#[derive(Clone)]
pub struct ArchiveCache {
    inner: Arc<Inner>,
}

impl fmt::Debug for ArchiveCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArchiveCache")
            .field("capacity", &self.inner.capacity)
            .field("max_file_size", &self.inner.max_file_size)
            .field("resident", &self.inner.state.lock().resident.len())
            .finish()
    }
}

impl ArchiveCache {
    /// Create an empty cache. A `capacity` of zero is treated as one.
    pub fn new(capacity: usize, max_file_size: u64, discovery: DiscoveryHandle, decoder: DecoderHandle) -> Self {
        Self {
            inner: Arc::new(Inner {
                capacity: NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN),
                max_file_size,
                discovery,
                decoder,
                state: Mutex::new(State {
                    resident: LruCache::unbounded(),
                    inflight: HashMap::new(),
                    draining: HashMap::new(),
                    closed: false,
                }),
                counters: Counters::default(),
            }),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.inner.state.lock().closed
    }

    pub fn capacity(&self) -> usize {
        self.inner.capacity.get()
    }

    /// Lease an open archive, opening it first if necessary.
    ///
    /// # Errors
    /// - [`NotFound`](ErrorKind::NotFound) if discovery doesn't know the archive,
    /// - [`TooLarge`](ErrorKind::TooLarge) if the file exceeds the size limit,
    /// - [`Closed`](ErrorKind::Closed) once the cache has been shut down,
    /// - whatever the decoder raised if opening failed.
    #[instrument(skip_all, fields(archive = %id))]
    pub async fn acquire(&self, id: &ArchiveId) -> Result<ArchiveLease> {
        let cell = {
            let mut state = self.inner.state.lock();
            if state.closed {
                exn::bail!(ErrorKind::Closed);
            }
            if let Some(slot) = state.resident.get(id) {
                self.inner.counters.hits.fetch_add(1, Ordering::Relaxed);
                debug!("archive cache hit");
                return Ok(self.lease(Arc::clone(slot)));
            }
            if let Some(slot) = state.draining.remove(id).and_then(|weak| weak.upgrade()) {
                self.inner.counters.hits.fetch_add(1, Ordering::Relaxed);
                debug!("archive still open elsewhere, reinstating");
                let (lease, evicted) = self.install(&mut state, id, slot);
                drop(state);
                drop(evicted);
                return Ok(lease);
            }
            self.inner.counters.misses.fetch_add(1, Ordering::Relaxed);
            Arc::clone(state.inflight.entry(id.clone()).or_default())
        };

        let slot = match cell.get_or_init(|| self.open(id)).await {
            Ok(slot) => Arc::clone(slot),
            Err(kind) => exn::bail!(kind.clone()),
        };
        drop(cell);

        let (lease, evicted) = {
            let mut state = self.inner.state.lock();
            if state.closed {
                exn::bail!(ErrorKind::Closed);
            }
            match state.resident.get(id).map(Arc::clone) {
                Some(resident) => (self.lease(resident), Vec::new()),
                // Evicted between being opened and this caller getting the
                // lock back. It is still open (we hold it), so put it back.
                None => self.install(&mut state, id, slot),
            }
        };
        drop(evicted);
        Ok(lease)
    }

    /// Make `slot` resident again and lease it. The evicted slots are
    /// returned so the caller can drop them after releasing the lock.
    fn install(&self, state: &mut State, id: &ArchiveId, slot: Arc<Slot>) -> (ArchiveLease, Vec<Arc<Slot>>) {
        state.draining.remove(id);
        state.resident.put(id.clone(), Arc::clone(&slot));
        let lease = self.lease(slot);
        let evicted = self.evict(state, None);
        (lease, evicted)
    }

    /// Runs at most once per in-flight cell. Registers the opened archive as
    /// resident (or clears the in-flight marker on failure) before returning.
    async fn open(&self, id: &ArchiveId) -> OpenOutcome {
        let opened = self.open_inner(id).await.map(|archive| {
            Arc::new(Slot {
                archive,
                borrows: AtomicUsize::new(0),
                opened_at: Instant::now(),
            })
        });

        let mut discarded = Vec::new();
        let outcome = {
            let mut state = self.inner.state.lock();
            state.inflight.remove(id);
            match opened {
                Ok(slot) if state.closed => {
                    discarded.push(slot);
                    Err(ErrorKind::Closed)
                },
                Ok(slot) => {
                    self.inner.counters.opens.fetch_add(1, Ordering::Relaxed);
                    state.resident.put(id.clone(), Arc::clone(&slot));
                    discarded = self.evict(&mut state, Some(id));
                    Ok(slot)
                },
                Err(err) => {
                    self.inner.counters.open_failures.fetch_add(1, Ordering::Relaxed);
                    Err((*err).clone())
                },
            }
        };
        // Closed here, outside the lock.
        drop(discarded);

        if let Err(kind) = &outcome {
            warn!(archive = %id, error = %kind, "failed to open archive");
        }
        outcome
    }

    async fn open_inner(&self, id: &ArchiveId) -> Result<Box<dyn Archive>> {
        let file = self
            .inner
            .discovery
            .locate(id)
            .await?
            .ok_or_else(|| exn::Exn::from(ErrorKind::NotFound(id.clone())))?;
        if file.size > self.inner.max_file_size {
            exn::bail!(ErrorKind::TooLarge {
                id: id.clone(),
                size: file.size,
                limit: self.inner.max_file_size,
            });
        }
        let started = Instant::now();
        let archive = self.inner.decoder.open(&file).await?;
        info!(
            archive = %id,
            decoder = self.inner.decoder.name(),
            entries = archive.metadata().entry_count,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "opened archive"
        );
        Ok(archive)
    }

    /// Must be called with the state lock held.
    fn lease(&self, slot: Arc<Slot>) -> ArchiveLease {
        slot.borrows.fetch_add(1, Ordering::SeqCst);
        ArchiveLease {
            slot,
            cache: self.clone(),
        }
    }

    /// Evict least-recently-used, unleased archives until the cache is back
    /// within capacity. `keep` is exempt (it was just opened and its waiters
    /// haven't had a chance to lease it yet).
    ///
    /// The evicted slots are returned so the caller can drop them after
    /// releasing the lock.
    fn evict(&self, state: &mut State, keep: Option<&ArchiveId>) -> Vec<Arc<Slot>> {
        let mut evicted = Vec::new();
        while state.resident.len() > self.inner.capacity.get() {
            // `iter()` runs most- to least-recently used.
            let victim = state
                .resident
                .iter()
                .rev()
                .find(|(id, slot)| slot.borrows.load(Ordering::SeqCst) == 0 && Some(*id) != keep)
                .map(|(id, _)| id.clone());
            let Some(victim) = victim else {
                debug!(resident = state.resident.len(), "every surplus archive is leased, over capacity for now");
                break;
            };
            if let Some(slot) = state.resident.pop(&victim) {
                debug!(archive = %victim, open_for_ms = slot.opened_at.elapsed().as_millis() as u64, "evicting archive");
                self.inner.counters.evictions.fetch_add(1, Ordering::Relaxed);
                Self::retire(state, victim, &slot);
                evicted.push(slot);
            }
        }
        evicted
    }

    /// Remember a slot leaving `resident` if anything besides the caller
    /// still holds it, so it isn't opened a second time meanwhile.
    fn retire(state: &mut State, id: ArchiveId, slot: &Arc<Slot>) {
        state.draining.retain(|_, weak| weak.strong_count() > 0);
        if Arc::strong_count(slot) > 1 {
            state.draining.insert(id, Arc::downgrade(slot));
        }
    }

    fn release(&self, slot: &Slot) {
        let evicted = {
            let mut state = self.inner.state.lock();
            slot.borrows.fetch_sub(1, Ordering::SeqCst);
            self.evict(&mut state, None)
        };
        drop(evicted);
    }

    /// Metadata of a resident archive, without opening it or touching its
    /// recency.
    pub fn peek(&self, id: &ArchiveId) -> Option<ArchiveMetadata> {
        self.inner.state.lock().resident.peek(id).map(|slot| slot.archive.metadata().clone())
    }

    pub fn is_resident(&self, id: &ArchiveId) -> bool {
        self.inner.state.lock().resident.contains(id)
    }

    /// Resident archives, most recently used first.
    pub fn resident(&self) -> Vec<ArchiveId> {
        self.inner.state.lock().resident.iter().map(|(id, _)| id.clone()).collect()
    }

    /// Close every archive that isn't currently leased. Returns how many
    /// were closed.
    pub fn clear(&self) -> usize {
        let evicted: Vec<_> = {
            let mut state = self.inner.state.lock();
            let idle: Vec<_> = state
                .resident
                .iter()
                .filter(|(_, slot)| slot.borrows.load(Ordering::SeqCst) == 0)
                .map(|(id, _)| id.clone())
                .collect();
            let mut evicted = Vec::with_capacity(idle.len());
            for id in idle {
                if let Some(slot) = state.resident.pop(&id) {
                    Self::retire(&mut state, id, &slot);
                    evicted.push(slot);
                }
            }
            evicted
        };
        info!(closed = evicted.len(), "cleared archive cache");
        evicted.len()
    }

    /// Drop every resident archive, leased or not, and refuse any further
    /// [`acquire`](Self::acquire). Leased archives are closed when their last
    /// lease is released. Returns how many archives were resident.
    pub fn shutdown(&self) -> usize {
        let drained: Vec<_> = {
            let mut state = self.inner.state.lock();
            state.closed = true;
            state.draining.clear();
            std::iter::from_fn(|| state.resident.pop_lru()).collect()
        };
        let leased = drained.iter().filter(|(_, slot)| slot.borrows.load(Ordering::SeqCst) > 0).count();
        info!(closed = drained.len(), leased, "archive cache shut down");
        drained.len()
    }

    pub fn stats(&self) -> ArchiveCacheStats {
        let (resident, leased) = {
            let state = self.inner.state.lock();
            let leased = state.resident.iter().filter(|(_, slot)| slot.borrows.load(Ordering::SeqCst) > 0).count();
            (state.resident.len(), leased)
        };
        let counters = &self.inner.counters;
        ArchiveCacheStats {
            capacity: self.capacity(),
            resident,
            leased,
            hits: counters.hits.load(Ordering::Relaxed),
            misses: counters.misses.load(Ordering::Relaxed),
            opens: counters.opens.load(Ordering::Relaxed),
            open_failures: counters.open_failures.load(Ordering::Relaxed),
            evictions: counters.evictions.load(Ordering::Relaxed),
        }
    }
}

/// Scoped access to an open archive. Dereferences to [`Archive`].
///
/// The archive stays open at least as long as the lease; dropping the lease
/// makes it eligible for eviction again.
pub struct ArchiveLease {
    slot: Arc<Slot>,
    cache: ArchiveCache,
}

impl ArchiveLease {
    pub fn id(&self) -> &ArchiveId {
        &self.slot.archive.metadata().id
    }
}

impl Deref for ArchiveLease {
    type Target = dyn Archive;

    fn deref(&self) -> &Self::Target {
        self.slot.archive.as_ref()
    }
}

impl Drop for ArchiveLease {
    fn drop(&mut self) {
        self.cache.release(&self.slot);
    }
}

impl fmt::Debug for ArchiveLease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArchiveLease").field("archive", self.id()).finish()
    }
}
