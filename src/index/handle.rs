//! Per-index state.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use parking_lot::{Mutex, MutexGuard};
use uuid::Uuid;

use crate::config::IndexConfig;
use crate::engine::analyzer::Analyzer;
use crate::engine::{DirectoryRef, ReaderRef, SearcherRef};
use crate::plugin::IndexPlugin;
use crate::reader::ReaderCounter;

/// The cached reader/searcher pair and the counter of its in-flight users.
///
/// Guarded by [`IndexHandle::cache`], the directory-scoped lock. The reader
/// and searcher are replaced as a unit, never mutated in place.
#[derive(Debug, Default)]
pub struct ReaderCache {
    pub reader: Option<ReaderRef>,
    pub searcher: Option<SearcherRef>,
    pub reader_count: ReaderCounter,
}

/// State of one named index.
pub struct IndexHandle {
    index_type: String,
    directory: DirectoryRef,
    plugin: Arc<dyn IndexPlugin>,
    config: IndexConfig,
    analyzer: Arc<dyn Analyzer>,
    cache: Mutex<ReaderCache>,
    query_count: AtomicU64,
    update_count: AtomicU32,
    write_lock: Mutex<()>,
}

impl IndexHandle {
    pub fn new(
        index_type: impl Into<String>,
        directory: DirectoryRef,
        plugin: Arc<dyn IndexPlugin>,
        config: IndexConfig,
        analyzer: Arc<dyn Analyzer>,
    ) -> Self {
        Self {
            index_type: index_type.into(),
            directory,
            plugin,
            config,
            analyzer,
            cache: Mutex::new(ReaderCache::default()),
            query_count: AtomicU64::new(0),
            update_count: AtomicU32::new(0),
            write_lock: Mutex::new(()),
        }
    }

    pub fn index_type(&self) -> &str {
        &self.index_type
    }

    pub fn directory(&self) -> &DirectoryRef {
        &self.directory
    }

    pub fn plugin(&self) -> &Arc<dyn IndexPlugin> {
        &self.plugin
    }

    pub fn config(&self) -> IndexConfig {
        self.config
    }

    pub fn analyzer(&self) -> &Arc<dyn Analyzer> {
        &self.analyzer
    }

    /// Lock the reader cache.
    pub(crate) fn cache(&self) -> MutexGuard<'_, ReaderCache> {
        self.cache.lock()
    }

    /// Acquire the per-index write lock, blocking until it is free.
    pub(crate) fn lock_writes(&self) -> MutexGuard<'_, ()> {
        self.write_lock.lock()
    }

    pub fn write_lock_available(&self) -> bool {
        !self.write_lock.is_locked()
    }

    /// In-flight users of the currently cached reader.
    pub fn live_reader_count(&self) -> usize {
        self.cache.lock().reader_count.get()
    }

    /// Identity of the cached reader, if one is cached.
    pub fn cached_reader_id(&self) -> Option<Uuid> {
        self.cache.lock().reader.as_ref().map(|r| r.id())
    }

    pub fn query_count(&self) -> u64 {
        self.query_count.load(Ordering::SeqCst)
    }

    pub(crate) fn record_query(&self) -> u64 {
        self.query_count.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Writer sessions since the last optimize.
    pub fn update_count(&self) -> u32 {
        self.update_count.load(Ordering::SeqCst)
    }

    pub(crate) fn record_update(&self) -> u32 {
        self.update_count.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub(crate) fn reset_update_count(&self) {
        self.update_count.store(0, Ordering::SeqCst);
    }
}

impl fmt::Debug for IndexHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IndexHandle")
            .field("index_type", &self.index_type)
            .field("directory", &self.directory.location())
            .field("plugin", &self.plugin)
            .field("config", &self.config)
            .field("query_count", &self.query_count())
            .field("update_count", &self.update_count())
            .finish()
    }
}
