//! Search execution, optionally ordered behind buffered writes.

use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;

use crate::engine::IndexSearcher;
use crate::engine::query::Query;
use crate::engine::searcher::Hits;
use crate::error::{PhalanxError, Result};
use crate::events::{IndexEvent, IndexEventBus, IndexEventKind};
use crate::index::{IndexHandle, IndexRegistry};
use crate::queue::{Operation, UpdateCommand, UpdateQueue};
use crate::reader::ReaderLifecycleManager;
use crate::item::IndexItem;
use crate::trace::{TraceOp, trace_op};

/// Ordering of a search relative to queued writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchMode {
    /// Run behind everything already submitted to the update queue.
    Synchronous,
    /// Run now on the calling thread against the current shared searcher.
    Asynchronous,
}

#[derive(Debug)]
pub struct SearchCoordinator {
    registry: Arc<IndexRegistry>,
    readers: Arc<ReaderLifecycleManager>,
    events: Arc<IndexEventBus>,
    queue: Option<Arc<UpdateQueue>>,
}

impl SearchCoordinator {
    pub fn new(
        registry: Arc<IndexRegistry>,
        readers: Arc<ReaderLifecycleManager>,
        events: Arc<IndexEventBus>,
        queue: Option<Arc<UpdateQueue>>,
    ) -> Self {
        Self {
            registry,
            readers,
            events,
            queue,
        }
    }

    fn active_queue(&self) -> Option<&Arc<UpdateQueue>> {
        self.queue.as_ref().filter(|q| q.is_active())
    }

    /// Run `query` against `index_type` and hand the hits to `op`.
    ///
    /// A synchronous search with an active queue is submitted as a callback
    /// command and the calling thread waits for it; otherwise the search runs
    /// immediately.
    pub fn execute<R, F>(&self, index_type: &str, query: Query, mode: SearchMode, op: F) -> Result<R>
    where
        R: Send + 'static,
        F: FnOnce(&IndexHandle, &dyn IndexSearcher, &Query, &Hits) -> Result<R> + Send + 'static,
    {
        let handle = self.registry.get(index_type)?;
        if mode == SearchMode::Synchronous
            && let Some(queue) = self.active_queue()
        {
            let slot: Arc<Mutex<Option<Result<R>>>> = Arc::new(Mutex::new(None));
            let job_slot = Arc::clone(&slot);
            let readers = Arc::clone(&self.readers);
            let events = Arc::clone(&self.events);
            let job_handle = Arc::clone(&handle);
            let (command, callback) = UpdateCommand::with_job(
                index_type,
                Operation::Callback,
                Box::new(move || {
                    let outcome = run_search(&job_handle, &readers, &events, &query, op);
                    *job_slot.lock() = Some(outcome);
                    Ok(None)
                }),
            );
            queue.enqueue(command)?;
            callback.wait_until_done()?;
            let outcome = slot.lock().take();
            return outcome.unwrap_or_else(|| {
                Err(PhalanxError::internal(format!(
                    "search on [{index_type}] completed without a result"
                )))
            });
        }
        run_search(&handle, &self.readers, &self.events, &query, op)
    }

    /// Run `query` on the calling thread. In synchronous mode the index's
    /// update buffer is flushed first so the search observes earlier writes.
    pub fn execute_now<R>(
        &self,
        index_type: &str,
        query: &Query,
        mode: SearchMode,
        op: impl FnOnce(&IndexHandle, &dyn IndexSearcher, &Query, &Hits) -> Result<R>,
    ) -> Result<R> {
        let handle = self.registry.get(index_type)?;
        if mode == SearchMode::Synchronous
            && let Some(queue) = self.active_queue()
        {
            queue.flush(index_type)?;
        }
        run_search(&handle, &self.readers, &self.events, query, op)
    }
}

/// Lease the shared searcher, run `query` and pass the hits to `op`.
/// The lease is released when this returns, whether or not `op` failed.
/// A successful search publishes a `Query` event carrying the query text.
pub(crate) fn run_search<R>(
    handle: &IndexHandle,
    readers: &ReaderLifecycleManager,
    events: &IndexEventBus,
    query: &Query,
    op: impl FnOnce(&IndexHandle, &dyn IndexSearcher, &Query, &Hits) -> Result<R>,
) -> Result<R> {
    let outcome = (|| {
        let lease = readers.lease(handle)?;
        let queries = handle.record_query();
        let started = Instant::now();
        let hits = lease.searcher().search(query)?;
        let elapsed = started.elapsed();
        log::debug!(
            "Query #{queries} [{query}] on [{}] returned {} in {elapsed:?}",
            handle.index_type(),
            hits.len()
        );
        trace_op!(
            TraceOp::Query,
            "query [{query}] on [{}] returned {} in {elapsed:?}",
            handle.index_type(),
            hits.len()
        );
        op(handle, lease.searcher().as_ref(), query, &hits)
    })();
    if outcome.is_ok() {
        events.publish(&query_event(handle.index_type(), query));
    }
    outcome.map_err(|e| {
        log::error!("Exception during search on [{}]: {e}", handle.index_type());
        match e {
            PhalanxError::Search { .. } => e,
            other => PhalanxError::search(handle.index_type(), other),
        }
    })
}

/// Notification of a search; the source is the query text.
pub(crate) fn query_event(index_type: &str, query: impl ToString) -> IndexEvent {
    IndexEvent::new(
        IndexItem::Object(query.to_string().into()),
        IndexEventKind::Query,
        index_type,
    )
}
