//! The index service facade.
//!
//! [`IndexService`] wires the registry, reader lifecycle, writer coordination,
//! update queue, search coordination and event bus together and exposes the
//! operations callers use.
//!
//! # Examples
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use phalanx::config::ServiceConfig;
//! use phalanx::engine::file::FileEngine;
//! use phalanx::plugin::IndexPlugin;
//! use phalanx::plugin::json::{JsonDocumentPlugin, JsonObjectStore};
//! use phalanx::service::IndexService;
//! use serde_json::json;
//!
//! # fn main() -> phalanx::error::Result<()> {
//! let store = Arc::new(JsonObjectStore::new());
//! let plugin: Arc<dyn IndexPlugin> =
//!     Arc::new(JsonDocumentPlugin::new("notes", Arc::clone(&store)));
//! let service = IndexService::initialize(
//!     ServiceConfig::new("/tmp/phalanx"),
//!     Arc::new(FileEngine::new()),
//!     vec![plugin],
//! )?;
//!
//! service.index_object("notes", json!({"id": "1", "title": "hello world"}))?;
//! let page = service.search("notes", "hello", 10, 0, 1)?;
//! println!("{} matches", page.total_matches);
//! service.finish();
//! # Ok(())
//! # }
//! ```

use std::collections::BTreeSet;
use std::fmt::Write as _;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::config::{IndexConfig, ServiceConfig};
use crate::engine::query::{Query, QueryParser};
use crate::engine::searcher::Hits;
use crate::engine::{IndexEngine, IndexReader, IndexSearcher, IndexWriter};
use crate::error::{PhalanxError, Result};
use crate::events::{IndexEventBus, IndexListener};
use crate::index::{IndexHandle, IndexRegistry};
use crate::item::{IndexItem, ObjectId};
use crate::plugin::{FindContext, IndexPlugin, ReindexContext, SearchCriteria, SearchResults};
use crate::queue::{Operation, StatusCallback, UpdateCommand, UpdateQueue};
use crate::reader::ReaderLifecycleManager;
use crate::search::coordinator::query_event;
use crate::search::{
    PagedResults, SearchCoordinator, SearchMode, SearchResultHandler, result_window,
};
use crate::util::timer::PeriodicTask;
use crate::writer::{OptimizeOutcome, OptimizePolicy, WriterCoordinator};

/// Where a write request is processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutionMode {
    /// Handed to the update queue and applied with the next buffer flush.
    Buffered,
    /// Applied on the calling thread before the call returns.
    Immediate,
}

/// Point-in-time state of one index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexStatus {
    pub index_type: String,
    pub directory: PathBuf,
    pub plugin: String,
    pub config: IndexConfig,
    pub cached_reader: Option<Uuid>,
    pub live_reads: usize,
    pub update_count: u32,
    pub query_count: u64,
    pub buffered_updates: usize,
    pub write_lock_available: bool,
}

/// Point-in-time state of the whole service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceStatus {
    pub base_directory: PathBuf,
    pub queue_active: bool,
    pub discarded_readers: usize,
    pub indexes: Vec<IndexStatus>,
}

#[derive(Debug)]
pub struct IndexService {
    config: ServiceConfig,
    engine: Arc<dyn IndexEngine>,
    registry: Arc<IndexRegistry>,
    readers: Arc<ReaderLifecycleManager>,
    writers: Arc<WriterCoordinator>,
    events: Arc<IndexEventBus>,
    queue: Arc<UpdateQueue>,
    searches: SearchCoordinator,
    timers: Mutex<Vec<PeriodicTask>>,
    /// Set once by [`finish`](IndexService::finish). Write submissions hold
    /// the read side so shutdown waits for in-flight submissions. Reads are
    /// recursive: listeners may submit again while `finish` waits.
    finished: RwLock<bool>,
}

impl IndexService {
    /// Open every plugin's index, reindexing those that do not exist yet, and
    /// start the background machinery.
    ///
    /// Index initialization failures abort startup when
    /// `throw_on_init_failure` is set; otherwise they are logged and the index
    /// is left out.
    pub fn initialize(
        config: ServiceConfig,
        engine: Arc<dyn IndexEngine>,
        plugins: Vec<Arc<dyn IndexPlugin>>,
    ) -> Result<Self> {
        config.validate()?;
        log::info!(
            "Initializing index service at {} with {} engine",
            config.base_directory.display(),
            engine.name()
        );
        if let Err(e) = fs::create_dir_all(&config.base_directory) {
            let error = PhalanxError::config(format!(
                "unable to create base directory {}: {e}",
                config.base_directory.display()
            ));
            if config.throw_on_init_failure {
                return Err(error);
            }
            log::error!("{error}");
        }

        let registry = Arc::new(IndexRegistry::new());
        let readers = Arc::new(ReaderLifecycleManager::new(
            config.discarded_reader_min_close_delay,
        ));
        let writers = Arc::new(WriterCoordinator::new(Arc::clone(&readers), &config));
        let events = Arc::new(IndexEventBus::new());

        for plugin in plugins {
            let index_type = plugin.index_type().to_string();
            let opened = open_index(&config, engine.as_ref(), &events, plugin)
                .map(|handle| registry.register(handle))
                .and_then(|handle| reindex_if_missing(&handle, &writers));
            if let Err(e) = opened {
                if config.throw_on_init_failure {
                    return Err(e);
                }
                log::error!("Unable to initialize index [{index_type}]: {e}");
            }
        }

        let queue = Arc::new(UpdateQueue::new(
            Arc::clone(&registry),
            Arc::clone(&writers),
            Arc::clone(&events),
            &config,
        )?);
        if config.queue_enabled() {
            queue.start()?;
        }
        let searches = SearchCoordinator::new(
            Arc::clone(&registry),
            Arc::clone(&readers),
            Arc::clone(&events),
            Some(Arc::clone(&queue)),
        );

        let mut timers = Vec::new();
        if !config.update_buffer_flush.is_zero() && config.update_buffer_size > 1 {
            let flush_queue = Arc::clone(&queue);
            timers.push(PeriodicTask::start(
                "phalanx-buffer-flush",
                config.update_buffer_flush,
                move || {
                    if let Err(e) = flush_queue.flush_all() {
                        log::error!("Scheduled update buffer flush failed: {e}");
                    }
                },
            )?);
        }
        let sweep_readers = Arc::clone(&readers);
        timers.push(PeriodicTask::start(
            "phalanx-reader-sweep",
            config.discarded_reader_sweep_interval,
            move || {
                sweep_readers.sweep();
            },
        )?);

        log::info!("Index service ready with indexes {:?}", registry.index_types());
        Ok(Self {
            config,
            engine,
            registry,
            readers,
            writers,
            events,
            queue,
            searches,
            timers: Mutex::new(timers),
            finished: RwLock::new(false),
        })
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub fn engine(&self) -> &Arc<dyn IndexEngine> {
        &self.engine
    }

    pub fn registry(&self) -> &Arc<IndexRegistry> {
        &self.registry
    }

    pub fn readers(&self) -> &Arc<ReaderLifecycleManager> {
        &self.readers
    }

    pub fn events(&self) -> &Arc<IndexEventBus> {
        &self.events
    }

    /// Mode used by the write operations without an explicit mode.
    pub fn default_mode(&self) -> ExecutionMode {
        if self.config.update_buffer_size > 1 {
            ExecutionMode::Buffered
        } else {
            ExecutionMode::Immediate
        }
    }

    pub fn index_object(&self, index_type: &str, object: Value) -> Result<()> {
        self.index_object_with(index_type, object, self.default_mode())
    }

    pub fn index_object_with(
        &self,
        index_type: &str,
        object: Value,
        mode: ExecutionMode,
    ) -> Result<()> {
        self.submit(UpdateCommand::update(index_type, IndexItem::Object(object)), mode)
    }

    pub fn index_object_by_id(&self, index_type: &str, id: impl Into<ObjectId>) -> Result<()> {
        self.index_object_by_id_with(index_type, id, self.default_mode())
    }

    pub fn index_object_by_id_with(
        &self,
        index_type: &str,
        id: impl Into<ObjectId>,
        mode: ExecutionMode,
    ) -> Result<()> {
        self.submit(UpdateCommand::update(index_type, IndexItem::Id(id.into())), mode)
    }

    pub fn delete_object_by_id(&self, index_type: &str, id: impl Into<ObjectId>) -> Result<()> {
        self.delete_object_by_id_with(index_type, id, self.default_mode())
    }

    pub fn delete_object_by_id_with(
        &self,
        index_type: &str,
        id: impl Into<ObjectId>,
        mode: ExecutionMode,
    ) -> Result<()> {
        self.submit(UpdateCommand::delete(index_type, IndexItem::Id(id.into())), mode)
    }

    /// Delete the document of `object`, resolving its id through the plugin.
    pub fn delete_object(&self, index_type: &str, object: Value) -> Result<()> {
        self.delete_object_with(index_type, object, self.default_mode())
    }

    pub fn delete_object_with(
        &self,
        index_type: &str,
        object: Value,
        mode: ExecutionMode,
    ) -> Result<()> {
        self.submit(UpdateCommand::delete(index_type, IndexItem::Object(object)), mode)
    }

    fn submit(&self, command: UpdateCommand, mode: ExecutionMode) -> Result<()> {
        let finished = self.finished.read_recursive();
        if *finished {
            log::warn!("Index service finished, ignoring {command}");
            return Ok(());
        }
        self.registry.get(&command.index_type)?;
        match mode {
            ExecutionMode::Buffered if self.queue.is_active() => self.queue.enqueue(command),
            _ => self.queue.handle_now(command).map(|_| ()),
        }
    }

    /// Rebuild the index of `index_type` through its plugin.
    ///
    /// With an active queue the rebuild runs on the callback executor and the
    /// returned callback completes later; otherwise it has already completed.
    pub fn reindex(&self, index_type: &str) -> Result<Arc<StatusCallback>> {
        let finished = self.finished.read_recursive();
        if *finished {
            return Err(PhalanxError::ServiceStopped(format!(
                "cannot reindex [{index_type}]"
            )));
        }
        let handle = self.registry.get(index_type)?;
        let writers = Arc::clone(&self.writers);
        let (command, callback) = UpdateCommand::with_job(
            index_type,
            Operation::Reindex,
            Box::new(move || run_reindex(&handle, &writers).map(Some)),
        );
        if self.queue.is_active() {
            self.queue.enqueue(command)?;
        } else {
            self.queue.handle_now(command)?;
        }
        Ok(callback)
    }

    /// Search through the index's plugin.
    ///
    /// A count-only request with a native query only counts hits.
    pub fn find(&self, index_type: &str, criteria: &SearchCriteria) -> Result<SearchResults> {
        let handle = self.registry.get(index_type)?;
        let parser = self.parser_for(&handle);
        if criteria.count_only
            && let Some(query) = handle.plugin().native_query(criteria, &parser)?
        {
            let total_matches = self.count(index_type, &query)?;
            return Ok(SearchResults {
                total_matches,
                matches: Vec::new(),
            });
        }
        let results = self.do_index_searcher_op(index_type, |searcher| {
            let ctx = FindContext {
                searcher,
                parser: &parser,
            };
            handle.plugin().find(criteria, &ctx)
        })?;
        self.events.publish(&query_event(index_type, &criteria.query));
        Ok(results)
    }

    /// Number of documents matching `query`.
    pub fn count(&self, index_type: &str, query: &Query) -> Result<usize> {
        self.searches
            .execute_now(index_type, query, SearchMode::Asynchronous, |_, _, _, hits| {
                Ok(hits.len())
            })
    }

    /// One page of rows for `query`. A `max_results` of zero means no limit,
    /// a `page_size` of zero returns every row up to the limit.
    pub fn search(
        &self,
        index_type: &str,
        query: &str,
        max_results: usize,
        page_size: usize,
        page: usize,
    ) -> Result<PagedResults> {
        let query = self.parse_query(index_type, query)?;
        self.searches
            .execute_now(index_type, &query, SearchMode::Asynchronous, |_, _, _, hits| {
                let window = result_window(hits.len(), max_results, page_size, page);
                Ok(PagedResults::from_hits(hits, window))
            })
    }

    /// Stream every match of `query` to `handler` until it asks to stop.
    pub fn search_with_handler(
        &self,
        index_type: &str,
        query: &str,
        handler: &mut dyn SearchResultHandler,
    ) -> Result<()> {
        let query = self.parse_query(index_type, query)?;
        self.searches
            .execute_now(index_type, &query, SearchMode::Asynchronous, |_, _, _, hits| {
                handler.set_total_matches(hits.len());
                for hit in hits.iter() {
                    if !handler.process_match(&hit.document) {
                        break;
                    }
                }
                Ok(())
            })
    }

    /// Distinct terms indexed in `field`.
    pub fn field_terms(&self, index_type: &str, field: &str) -> Result<BTreeSet<String>> {
        self.do_index_searcher_op(index_type, |searcher| {
            Ok(searcher.reader().terms(field)?.into_iter().collect())
        })
    }

    /// Parse `text` with the index's analyzer against the default field.
    pub fn parse_query(&self, index_type: &str, text: &str) -> Result<Query> {
        let handle = self.registry.get(index_type)?;
        self.parser_for(&handle).parse(text)
    }

    fn parser_for(&self, handle: &IndexHandle) -> QueryParser {
        QueryParser::new(
            self.config.default_field.clone(),
            Arc::clone(handle.analyzer()),
        )
    }

    /// Run `op` with an exclusive writer. `optimize_on_finish` selects the
    /// batch writer settings and optimizes before the writer is closed.
    pub fn do_index_writer_op<R>(
        &self,
        index_type: &str,
        create: bool,
        optimize_on_finish: bool,
        op: impl FnOnce(&mut dyn IndexWriter) -> Result<R>,
    ) -> Result<R> {
        let handle = self.registry.get(index_type)?;
        self.writers
            .with_exclusive_write(&handle, create, self.write_policy(optimize_on_finish), op)
    }

    /// Run `op` with an exclusive reader that may delete documents.
    pub fn do_index_reader_op<R>(
        &self,
        index_type: &str,
        op: impl FnOnce(&dyn IndexReader) -> Result<R>,
    ) -> Result<R> {
        let handle = self.registry.get(index_type)?;
        self.writers.with_exclusive_read(&handle, op)
    }

    /// An exclusive reader pass and then a writer pass without releasing the
    /// index's write lock in between.
    pub fn do_index_update_op<R>(
        &self,
        index_type: &str,
        reader_op: impl FnOnce(&dyn IndexReader) -> Result<()>,
        create: bool,
        writer_op: impl FnOnce(&mut dyn IndexWriter) -> Result<R>,
    ) -> Result<R> {
        let handle = self.registry.get(index_type)?;
        self.writers.with_exclusive_read_then_write(
            &handle,
            reader_op,
            create,
            self.write_policy(false),
            writer_op,
        )
    }

    /// Run `op` against the shared searcher.
    pub fn do_index_searcher_op<R>(
        &self,
        index_type: &str,
        op: impl FnOnce(&dyn IndexSearcher) -> Result<R>,
    ) -> Result<R> {
        let handle = self.registry.get(index_type)?;
        let lease = self.readers.lease(&handle)?;
        handle.record_query();
        op(lease.searcher().as_ref()).map_err(|e| match e {
            PhalanxError::Search { .. } => e,
            other => PhalanxError::search(index_type, other),
        })
    }

    /// Run `query` and hand the hits to `op`. See [`SearchCoordinator::execute`].
    pub fn do_index_query_op<R, F>(
        &self,
        index_type: &str,
        query: Query,
        mode: SearchMode,
        op: F,
    ) -> Result<R>
    where
        R: Send + 'static,
        F: FnOnce(&IndexHandle, &dyn IndexSearcher, &Query, &Hits) -> Result<R> + Send + 'static,
    {
        self.searches.execute(index_type, query, mode, op)
    }

    fn write_policy(&self, optimize_on_finish: bool) -> OptimizePolicy {
        if optimize_on_finish {
            OptimizePolicy::batch()
        } else {
            OptimizePolicy::interactive(self.config.optimize_trigger_count)
        }
    }

    /// Optimize `index_type` now, once no searches are running on it.
    pub fn optimize(&self, index_type: &str) -> Result<OptimizeOutcome> {
        let handle = self.registry.get(index_type)?;
        self.writers
            .with_exclusive_write(&handle, false, OptimizePolicy::none(), |writer| {
                let outcome = self.writers.optimize(&handle, writer)?;
                if outcome == OptimizeOutcome::Optimized {
                    handle.reset_update_count();
                }
                Ok(outcome)
            })
    }

    pub fn add_event_listener(&self, listener: Arc<dyn IndexListener>) {
        self.events.add_listener(listener);
    }

    pub fn remove_event_listener(&self, listener: &Arc<dyn IndexListener>) -> bool {
        self.events.remove_listener(listener)
    }

    /// Apply everything buffered for `index_type`.
    pub fn flush(&self, index_type: &str) -> Result<()> {
        self.registry.get(index_type)?;
        self.queue.flush(index_type)
    }

    pub fn flush_all(&self) -> Result<()> {
        self.queue.flush_all()
    }

    pub fn status(&self) -> ServiceStatus {
        let indexes = self
            .registry
            .handles()
            .iter()
            .map(|handle| IndexStatus {
                index_type: handle.index_type().to_string(),
                directory: handle.directory().location().to_path_buf(),
                plugin: handle.plugin().name().to_string(),
                config: handle.config(),
                cached_reader: handle.cached_reader_id(),
                live_reads: handle.live_reader_count(),
                update_count: handle.update_count(),
                query_count: handle.query_count(),
                buffered_updates: self.queue.buffered(handle.index_type()),
                write_lock_available: handle.write_lock_available(),
            })
            .collect();
        ServiceStatus {
            base_directory: self.config.base_directory.clone(),
            queue_active: self.queue.is_active(),
            discarded_readers: self.readers.discarded_count(),
            indexes,
        }
    }

    /// Human readable form of [`status`](Self::status).
    pub fn status_description(&self) -> String {
        let status = self.status();
        let mut out = String::new();
        let _ = writeln!(out, "Index service at {}", status.base_directory.display());
        let _ = writeln!(
            out,
            "Update queue: {}",
            if status.queue_active { "active" } else { "inactive" }
        );
        let _ = writeln!(out, "Discarded readers: {}", status.discarded_readers);
        for index in &status.indexes {
            let _ = writeln!(out, "Index [{}]", index.index_type);
            let _ = writeln!(out, "  directory: {}", index.directory.display());
            let _ = writeln!(out, "  plugin: {}", index.plugin);
            let _ = writeln!(
                out,
                "  min merge docs: {}, merge factor: {}",
                index.config.min_merge_docs, index.config.merge_factor
            );
            match index.cached_reader {
                Some(id) => {
                    let _ = writeln!(out, "  cached reader: {id}");
                }
                None => {
                    let _ = writeln!(out, "  cached reader: none");
                }
            }
            let _ = writeln!(out, "  live read operations: {}", index.live_reads);
            let _ = writeln!(out, "  updates since optimize: {}", index.update_count);
            let _ = writeln!(out, "  queries: {}", index.query_count);
            let _ = writeln!(out, "  buffered updates: {}", index.buffered_updates);
            let _ = writeln!(
                out,
                "  write lock: {}",
                if index.write_lock_available { "available" } else { "held" }
            );
        }
        out
    }

    pub fn is_finished(&self) -> bool {
        *self.finished.read_recursive()
    }

    /// Stop timers, drain and stop the update queue, then close readers.
    /// Safe to call more than once; problems are logged.
    pub fn finish(&self) {
        {
            let mut finished = self.finished.write();
            if *finished {
                return;
            }
            *finished = true;
        }
        log::info!("Shutting down index service");
        for mut timer in self.timers.lock().drain(..) {
            timer.stop();
        }
        self.queue.stop();
        self.readers.close_all(&self.registry.handles());
        log::info!("Index service shut down");
    }
}

impl Drop for IndexService {
    fn drop(&mut self) {
        self.finish();
    }
}

fn open_index(
    config: &ServiceConfig,
    engine: &dyn IndexEngine,
    events: &Arc<IndexEventBus>,
    plugin: Arc<dyn IndexPlugin>,
) -> Result<IndexHandle> {
    let index_type = plugin.index_type().to_string();
    let analyzer = plugin
        .analyzer()
        .ok_or_else(|| PhalanxError::config(format!("no analyzer for index [{index_type}]")))?;
    let index_config = plugin.init(events)?;
    index_config.validate()?;

    let path = config.base_directory.join(&index_type);
    fs::create_dir_all(&path)?;
    let directory = engine.open_directory(&path)?;
    log::debug!(
        "Opened index [{index_type}] at {} with {index_config:?}",
        path.display()
    );
    Ok(IndexHandle::new(
        index_type,
        directory,
        plugin,
        index_config,
        analyzer,
    ))
}

fn reindex_if_missing(handle: &Arc<IndexHandle>, writers: &WriterCoordinator) -> Result<()> {
    if handle.directory().index_exists()? {
        return Ok(());
    }
    log::info!("Index [{}] does not exist, creating", handle.index_type());
    run_reindex(handle, writers).map(|_| ())
}

fn run_reindex(
    handle: &IndexHandle,
    writers: &WriterCoordinator,
) -> Result<crate::plugin::IndexResults> {
    let ctx = ReindexContext::new(handle, writers);
    let results = handle.plugin().reindex(&ctx)?;
    log::info!(
        "Reindexed [{}]: {} processed, {} indexed",
        handle.index_type(),
        results.num_processed,
        results.num_indexed
    );
    for (id, error) in &results.errors {
        log::warn!("Error reindexing {id} of [{}]: {error}", handle.index_type());
    }
    Ok(results)
}
