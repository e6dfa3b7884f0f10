//! The update queue: per-index buffering and batch application of writes.

use std::collections::{HashMap, VecDeque};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::config::ServiceConfig;
use crate::engine::{IndexReader, IndexWriter};
use crate::error::{PhalanxError, Result};
use crate::events::{IndexEvent, IndexEventBus, IndexEventKind};
use crate::index::{IndexHandle, IndexRegistry};
use crate::item::{IndexItem, ObjectId};
use crate::queue::callback::StatusCallback;
use crate::queue::command::{Operation, UpdateCommand};
use crate::queue::executor::CallbackExecutor;
use crate::queue::policy::{FlushPolicy, SizeThresholdPolicy};
use crate::queue::worker::WorkQueue;
use crate::trace::{TraceOp, trace_op};
use crate::writer::{OptimizePolicy, WriterCoordinator};

#[derive(Debug, Default)]
struct IndexBuffer {
    pending: Mutex<VecDeque<UpdateCommand>>,
    /// Serializes flushes of this buffer between the consumer and callers.
    flush_lock: Mutex<()>,
}

/// Updates keyed by object id: the latest command per id wins, while
/// iteration follows the order in which ids were first seen.
#[derive(Debug, Default)]
struct PendingUpdates {
    order: Vec<ObjectId>,
    latest: HashMap<ObjectId, UpdateCommand>,
}

impl PendingUpdates {
    fn insert(&mut self, id: ObjectId, command: UpdateCommand) {
        if self.latest.insert(id.clone(), command).is_none() {
            self.order.push(id);
        }
    }

    fn remove(&mut self, id: &ObjectId) {
        if self.latest.remove(id).is_some() {
            self.order.retain(|o| o != id);
        }
    }

    fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    fn len(&self) -> usize {
        self.order.len()
    }

    fn iter(&self) -> impl Iterator<Item = (&ObjectId, &UpdateCommand)> {
        self.order
            .iter()
            .filter_map(|id| self.latest.get(id).map(|command| (id, command)))
    }
}

#[derive(Debug)]
struct QueueCore {
    registry: Arc<IndexRegistry>,
    writers: Arc<WriterCoordinator>,
    events: Arc<IndexEventBus>,
    policy: Box<dyn FlushPolicy>,
    executor: CallbackExecutor,
    buffers: Mutex<HashMap<String, Arc<IndexBuffer>>>,
    id_field: String,
    optimize_trigger_count: u32,
}

impl QueueCore {
    fn buffer(&self, index_type: &str) -> Arc<IndexBuffer> {
        Arc::clone(self.buffers.lock().entry(index_type.to_string()).or_default())
    }

    /// Consumer-side handling; failures are logged.
    fn handle(&self, command: UpdateCommand) {
        let description = command.to_string();
        if let Err(e) = self.dispatch(command) {
            log::error!("Failed to process {description}: {e}");
        }
    }

    fn dispatch(&self, mut command: UpdateCommand) -> Result<()> {
        match command.operation {
            Operation::Reindex | Operation::Callback => {
                let (callback, job) = command.take_job().ok_or_else(|| {
                    PhalanxError::internal(format!("{command} carries no job"))
                })?;
                let submitted = self
                    .prepare_job(&command)
                    .and_then(|()| self.executor.submit(Arc::clone(&callback), job));
                if let Err(e) = submitted {
                    let message = e.to_string();
                    // Release the waiter with the failure.
                    callback.complete(Err(e));
                    return Err(PhalanxError::other(format!(
                        "{command} not dispatched: {message}"
                    )));
                }
                Ok(())
            }
            Operation::Update | Operation::Delete => {
                log::debug!("Buffering {command}");
                let index_type = command.index_type.clone();
                let from_calling_thread = command.from_calling_thread;
                let buffered = {
                    let buffer = self.buffer(&index_type);
                    let mut pending = buffer.pending.lock();
                    pending.push_back(command);
                    pending.len()
                };
                if self.policy.should_flush(buffered, from_calling_thread) {
                    self.flush(&index_type)?;
                }
                Ok(())
            }
        }
    }

    /// Everything submitted before a callback is applied first. A panic in
    /// that flush is reported as an error.
    fn prepare_job(&self, command: &UpdateCommand) -> Result<()> {
        if command.operation != Operation::Callback {
            return Ok(());
        }
        panic::catch_unwind(AssertUnwindSafe(|| self.flush(&command.index_type))).unwrap_or_else(
            |_| {
                Err(PhalanxError::internal(format!(
                    "flush of [{}] panicked",
                    command.index_type
                )))
            },
        )
    }

    fn flush(&self, index_type: &str) -> Result<()> {
        let buffer = self.buffer(index_type);
        let _flushing = buffer.flush_lock.lock();
        let commands: Vec<UpdateCommand> = buffer.pending.lock().drain(..).collect();
        if commands.is_empty() {
            return Ok(());
        }
        let handle = self.registry.get(index_type)?;
        trace_op!(
            TraceOp::Update,
            "processing {} buffered commands for [{index_type}]",
            commands.len()
        );
        self.apply(&handle, commands)
    }

    fn flush_all(&self) -> Result<()> {
        let index_types: Vec<String> = self.buffers.lock().keys().cloned().collect();
        let mut first_error = None;
        for index_type in index_types {
            if let Err(e) = self.flush(&index_type) {
                log::error!("Failed to flush update buffer [{index_type}]: {e}");
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Apply deletes in one exclusive reader pass, then collapsed updates in
    /// one delete-then-add writer pass.
    fn apply(&self, handle: &IndexHandle, commands: Vec<UpdateCommand>) -> Result<()> {
        let mut updates = PendingUpdates::default();
        self.writers.with_exclusive_read(handle, |reader| {
            for command in commands {
                let Some(id) = self.resolve_id(handle, &command) else {
                    log::warn!("Unable to resolve an id for {command}, skipping");
                    continue;
                };
                let operation = command.operation;
                match operation {
                    Operation::Update => updates.insert(id, command),
                    Operation::Delete => {
                        updates.remove(&id);
                        self.delete(handle, reader, &id)?;
                        self.events.publish(&IndexEvent::new(
                            command.item,
                            IndexEventKind::Delete,
                            handle.index_type(),
                        ));
                    }
                    Operation::Reindex | Operation::Callback => {
                        log::warn!("Ignoring unbuffered {command} found in update buffer");
                    }
                }
            }
            Ok(())
        })?;

        if updates.is_empty() {
            return Ok(());
        }
        trace_op!(
            TraceOp::Update,
            "indexing {} objects into [{}]",
            updates.len(),
            handle.index_type()
        );
        let plugin = Arc::clone(handle.plugin());
        self.writers.with_exclusive_read_then_write(
            handle,
            |reader| {
                for (id, _) in updates.iter() {
                    self.delete(handle, reader, id)?;
                }
                Ok(())
            },
            false,
            OptimizePolicy::interactive(self.optimize_trigger_count),
            |writer: &mut dyn IndexWriter| {
                for (id, command) in updates.iter() {
                    let indexed = match &command.item {
                        IndexItem::Id(id) => plugin.index(id, writer),
                        IndexItem::Object(object) => plugin.index_object(object, writer),
                    };
                    match indexed {
                        Ok(()) => {
                            self.events.publish(&IndexEvent::new(
                                command.item.clone(),
                                IndexEventKind::Update,
                                handle.index_type(),
                            ));
                        }
                        Err(e) if e.is_object_resolution() => log::warn!(
                            "Unable to load object {id} of [{}] for indexing: {e}",
                            handle.index_type()
                        ),
                        Err(e) => return Err(e),
                    }
                }
                Ok(())
            },
        )
    }

    fn resolve_id(&self, handle: &IndexHandle, command: &UpdateCommand) -> Option<ObjectId> {
        match &command.item {
            IndexItem::Id(id) => Some(id.clone()),
            IndexItem::Object(object) => handle.plugin().id_for_object(object),
        }
    }

    fn delete(&self, handle: &IndexHandle, reader: &dyn IndexReader, id: &ObjectId) -> Result<usize> {
        if reader.doc_freq(&self.id_field, id.as_str())? == 0 {
            return Ok(0);
        }
        let deleted = reader.delete_documents(&self.id_field, id.as_str())?;
        trace_op!(
            TraceOp::Delete,
            "deleted {deleted} documents for id {id} from [{}] via reader {}",
            handle.index_type(),
            reader.id()
        );
        Ok(deleted)
    }

    fn buffered(&self, index_type: &str) -> usize {
        self.buffers
            .lock()
            .get(index_type)
            .map(|b| b.pending.lock().len())
            .unwrap_or(0)
    }
}

/// Single-consumer update queue with per-index buffers.
#[derive(Debug)]
pub struct UpdateQueue {
    core: Arc<QueueCore>,
    worker: Mutex<Option<WorkQueue<UpdateCommand>>>,
    shutdown_timeout: std::time::Duration,
}

impl UpdateQueue {
    pub fn new(
        registry: Arc<IndexRegistry>,
        writers: Arc<WriterCoordinator>,
        events: Arc<IndexEventBus>,
        config: &ServiceConfig,
    ) -> Result<Self> {
        Self::with_policy(
            registry,
            writers,
            events,
            config,
            Box::new(SizeThresholdPolicy::new(config.update_buffer_size)),
        )
    }

    pub fn with_policy(
        registry: Arc<IndexRegistry>,
        writers: Arc<WriterCoordinator>,
        events: Arc<IndexEventBus>,
        config: &ServiceConfig,
        policy: Box<dyn FlushPolicy>,
    ) -> Result<Self> {
        let core = QueueCore {
            registry,
            writers,
            events,
            policy,
            executor: CallbackExecutor::new(config.callback_threads)?,
            buffers: Mutex::new(HashMap::new()),
            id_field: config.id_field.clone(),
            optimize_trigger_count: config.optimize_trigger_count,
        };
        Ok(Self {
            core: Arc::new(core),
            worker: Mutex::new(None),
            shutdown_timeout: config.shutdown_timeout,
        })
    }

    /// Start the consumer thread.
    pub fn start(&self) -> Result<()> {
        let mut worker = self.worker.lock();
        if worker.is_some() {
            return Err(PhalanxError::other("update queue already started"));
        }
        let handler_core = Arc::clone(&self.core);
        let exit_core = Arc::clone(&self.core);
        *worker = Some(WorkQueue::start(
            "phalanx-update-queue",
            move |command| handler_core.handle(command),
            move || {
                if let Err(e) = exit_core.flush_all() {
                    log::error!("Exception flushing update queue on exit: {e}");
                }
            },
        )?);
        log::info!("Update queue started");
        Ok(())
    }

    /// Whether the consumer thread is accepting commands.
    pub fn is_active(&self) -> bool {
        self.worker.lock().as_ref().is_some_and(|w| w.is_running())
    }

    /// Hand a command to the consumer thread.
    pub fn enqueue(&self, command: UpdateCommand) -> Result<()> {
        match self.worker.lock().as_ref() {
            Some(worker) => worker.enqueue(command),
            None => Err(PhalanxError::ServiceStopped(
                "update queue is not running".to_string(),
            )),
        }
    }

    /// Process a command on the calling thread. Updates and deletes flush
    /// their buffer before returning and failures are returned. Jobs run inline
    /// and report failures through their callback.
    pub fn handle_now(&self, command: UpdateCommand) -> Result<Option<Arc<StatusCallback>>> {
        let mut command = command.from_calling_thread();
        if command.is_buffered() {
            self.core.dispatch(command)?;
            return Ok(None);
        }
        let (callback, job) = command
            .take_job()
            .ok_or_else(|| PhalanxError::internal(format!("{command} carries no job")))?;
        match self.core.prepare_job(&command) {
            Ok(()) => callback.run(job),
            Err(e) => callback.complete(Err(e)),
        }
        Ok(Some(callback))
    }

    pub fn flush(&self, index_type: &str) -> Result<()> {
        log::debug!("Flushing update buffer [{index_type}]");
        self.core.flush(index_type)
    }

    pub fn flush_all(&self) -> Result<()> {
        self.core.flush_all()
    }

    /// Commands waiting in the buffer of `index_type`.
    pub fn buffered(&self, index_type: &str) -> usize {
        self.core.buffered(index_type)
    }

    /// Commands submitted to the consumer but not yet taken.
    pub fn pending(&self) -> usize {
        self.worker.lock().as_ref().map_or(0, |w| w.pending())
    }

    /// Stop the consumer after it drains, flush every buffer one last time
    /// and shut down the callback executor. Never fails; problems are logged.
    pub fn stop(&self) {
        let worker = self.worker.lock().take();
        if let Some(worker) = worker {
            log::info!("Stopping {}", worker.name());
            worker.stop();
        }
        if let Err(e) = self.core.flush_all() {
            log::error!("Exception flushing update buffers during shutdown: {e}");
        }
        if !self.core.executor.shutdown(self.shutdown_timeout) {
            log::warn!("Callback executor did not terminate within {:?}", self.shutdown_timeout);
        }
    }
}
