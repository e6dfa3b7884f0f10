//! Creation, sharing and deferred closing of index readers.
//!
//! Each index caches one reader/searcher pair shared by all concurrent
//! searches. When a writer changes the index, the cached pair is discarded:
//! it moves to a discard list together with the reader counter that was live
//! at that moment, and the handle starts over with a fresh counter. A periodic
//! [`ReaderLifecycleManager::sweep`] closes discarded readers once they are old
//! enough and their counter has drained to zero.
//!
//! Lock order is always the handle's reader cache first, then the discard list.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::engine::{ReaderMode, ReaderRef, SearcherRef};
use crate::error::{PhalanxError, Result};
use crate::index::IndexHandle;
use crate::index::handle::ReaderCache;
use crate::reader::{ReaderCounter, ReaderGuard};
use crate::trace::{TraceOp, trace_op};

/// A reader removed from the cache but not yet known to be unreferenced.
#[derive(Debug)]
pub struct DiscardedReader {
    pub discard_time: Instant,
    pub reader_count: ReaderCounter,
    pub reader: ReaderRef,
    pub index_type: String,
}

/// A counted use of an index's shared searcher and reader.
///
/// The use is released when the lease is dropped.
#[derive(Debug)]
pub struct ReaderLease {
    searcher: SearcherRef,
    guard: ReaderGuard,
}

impl ReaderLease {
    pub fn reader(&self) -> &ReaderRef {
        self.searcher.reader()
    }

    pub fn searcher(&self) -> &SearcherRef {
        &self.searcher
    }

    /// The counter this lease is registered with.
    pub fn counter(&self) -> &ReaderCounter {
        self.guard.counter()
    }
}

#[derive(Debug)]
pub struct ReaderLifecycleManager {
    min_close_delay: Duration,
    discarded: Mutex<Vec<DiscardedReader>>,
}

impl ReaderLifecycleManager {
    pub fn new(min_close_delay: Duration) -> Self {
        Self {
            min_close_delay,
            discarded: Mutex::new(Vec::new()),
        }
    }

    pub fn min_close_delay(&self) -> Duration {
        self.min_close_delay
    }

    /// The cached reader, opened on first use.
    pub fn get_shared_reader(&self, handle: &IndexHandle) -> Result<ReaderRef> {
        let mut cache = handle.cache();
        self.cached_reader(handle, &mut cache)
    }

    /// A new, uncached reader allowed to delete documents.
    pub fn get_exclusive_reader(&self, handle: &IndexHandle) -> Result<ReaderRef> {
        let reader = handle
            .directory()
            .open_reader(ReaderMode::ReadWrite)
            .map_err(|e| PhalanxError::index_operation(handle.index_type(), "IndexReader", e))?;
        trace_op!(
            TraceOp::Connection,
            "exclusive reader {} opened for [{}]",
            reader.id(),
            handle.index_type()
        );
        Ok(reader)
    }

    /// The cached searcher over the cached reader.
    pub fn get_searcher(&self, handle: &IndexHandle) -> Result<SearcherRef> {
        let mut cache = handle.cache();
        self.cached_searcher(handle, &mut cache)
    }

    /// Register a use of the shared searcher.
    ///
    /// The counter is incremented while the cache lock is held, so the reader
    /// cannot be discarded between lookup and registration.
    pub fn lease(&self, handle: &IndexHandle) -> Result<ReaderLease> {
        let mut cache = handle.cache();
        let searcher = self.cached_searcher(handle, &mut cache)?;
        let guard = cache.reader_count.acquire();
        Ok(ReaderLease { searcher, guard })
    }

    fn cached_reader(&self, handle: &IndexHandle, cache: &mut ReaderCache) -> Result<ReaderRef> {
        if let Some(reader) = &cache.reader {
            return Ok(Arc::clone(reader));
        }
        let reader = handle
            .directory()
            .open_reader(ReaderMode::ReadOnly)
            .map_err(|e| PhalanxError::index_operation(handle.index_type(), "IndexReader", e))?;
        trace_op!(
            TraceOp::Connection,
            "shared reader {} cached for [{}]",
            reader.id(),
            handle.index_type()
        );
        cache.reader = Some(Arc::clone(&reader));
        Ok(reader)
    }

    fn cached_searcher(
        &self,
        handle: &IndexHandle,
        cache: &mut ReaderCache,
    ) -> Result<SearcherRef> {
        if let Some(searcher) = &cache.searcher {
            return Ok(Arc::clone(searcher));
        }
        let reader = self.cached_reader(handle, cache)?;
        let searcher = handle
            .directory()
            .new_searcher(reader)
            .map_err(|e| PhalanxError::index_operation(handle.index_type(), "IndexSearcher", e))?;
        cache.searcher = Some(Arc::clone(&searcher));
        Ok(searcher)
    }

    /// Move the cached reader to the discard list.
    pub fn discard(&self, handle: &IndexHandle) {
        let mut cache = handle.cache();
        self.discard_locked(handle.index_type(), &mut cache);
    }

    /// Like [`discard`](Self::discard), with the cache lock already held.
    pub(crate) fn discard_locked(&self, index_type: &str, cache: &mut ReaderCache) {
        cache.searcher = None;
        let Some(reader) = cache.reader.take() else {
            return;
        };
        let reader_count = std::mem::take(&mut cache.reader_count);
        trace_op!(
            TraceOp::Connection,
            "reader {} of [{}] discarded with {} live uses",
            reader.id(),
            index_type,
            reader_count.get()
        );
        self.discarded.lock().push(DiscardedReader {
            discard_time: Instant::now(),
            reader_count,
            reader,
            index_type: index_type.to_string(),
        });
    }

    /// Close discarded readers that are old enough and no longer used.
    /// Returns how many entries were removed.
    pub fn sweep(&self) -> usize {
        let mut discarded = self.discarded.lock();
        let before = discarded.len();
        let min_close_delay = self.min_close_delay;
        discarded.retain(|entry| {
            if entry.discard_time.elapsed() > min_close_delay && entry.reader_count.get() == 0 {
                close_reader(entry);
                false
            } else {
                true
            }
        });
        let removed = before - discarded.len();
        if removed > 0 {
            log::debug!(
                "Closed {removed} discarded readers, {} pending",
                discarded.len()
            );
        }
        removed
    }

    /// Close every discarded reader of `index_type` whose counter is zero,
    /// regardless of age.
    pub fn close_idle(&self, index_type: &str) -> usize {
        let mut discarded = self.discarded.lock();
        let before = discarded.len();
        discarded.retain(|entry| {
            if entry.index_type == index_type && entry.reader_count.get() == 0 {
                close_reader(entry);
                false
            } else {
                true
            }
        });
        before - discarded.len()
    }

    /// Discard the cached readers of every handle and close whatever is idle.
    /// Readers still in use are left for their last user to drop.
    pub fn close_all(&self, handles: &[Arc<IndexHandle>]) {
        for handle in handles {
            self.discard(handle);
        }
        let mut discarded = self.discarded.lock();
        for entry in discarded.drain(..) {
            if entry.reader_count.get() == 0 {
                close_reader(&entry);
            } else {
                log::warn!(
                    "Reader {} of [{}] still has {} uses at shutdown",
                    entry.reader.id(),
                    entry.index_type,
                    entry.reader_count.get()
                );
            }
        }
    }

    pub fn discarded_count(&self) -> usize {
        self.discarded.lock().len()
    }
}

fn close_reader(entry: &DiscardedReader) {
    match entry.reader.close() {
        Ok(()) => trace_op!(
            TraceOp::Connection,
            "discarded reader {} of [{}] closed",
            entry.reader.id(),
            entry.index_type
        ),
        Err(e) if e.is_already_closed() => {}
        Err(e) => log::error!(
            "Failed to close discarded reader of [{}]: {e}",
            entry.index_type
        ),
    }
}
