//! Exclusive write, delete and optimize sessions per index.
//!
//! Every mutating session runs under the index write lock, so at most one
//! writer or exclusive reader is active per index. When a session ends the
//! writer is closed and the shared reader discarded, even if the session
//! failed.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crate::config::ServiceConfig;
use crate::engine::{IndexReader, IndexWriter, WriterSettings};
use crate::error::{PhalanxError, Result};
use crate::index::IndexHandle;
use crate::reader::ReaderLifecycleManager;
use crate::trace::{TraceOp, trace_op};

/// When a writer session optimizes the index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OptimizePolicy {
    /// Optimize once this many sessions have run since the last optimize.
    /// 0 disables the trigger.
    pub trigger_count: u32,

    /// Batch session: use batch writer settings and always optimize at the end.
    pub optimize_on_finish: bool,
}

impl OptimizePolicy {
    pub fn interactive(trigger_count: u32) -> Self {
        Self {
            trigger_count,
            optimize_on_finish: false,
        }
    }

    pub fn batch() -> Self {
        Self {
            trigger_count: 0,
            optimize_on_finish: true,
        }
    }

    pub fn none() -> Self {
        Self {
            trigger_count: 0,
            optimize_on_finish: false,
        }
    }
}

/// Result of an optimize request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptimizeOutcome {
    Optimized,
    /// Optimize is turned off by configuration.
    Disabled,
    /// Readers did not drain within the configured wait; nothing was done.
    TimedOut,
}

#[derive(Debug)]
pub struct WriterCoordinator {
    readers: Arc<ReaderLifecycleManager>,
    never_optimize: bool,
    reader_poll: Duration,
    reader_wait: Option<Duration>,
    batch_settings: WriterSettings,
}

impl WriterCoordinator {
    pub fn new(readers: Arc<ReaderLifecycleManager>, config: &ServiceConfig) -> Self {
        Self {
            readers,
            never_optimize: config.never_optimize,
            reader_poll: config.optimize_reader_poll,
            reader_wait: config.optimize_reader_wait,
            batch_settings: config.batch_settings(),
        }
    }

    pub fn readers(&self) -> &Arc<ReaderLifecycleManager> {
        &self.readers
    }

    /// Run `body` with an exclusive writer.
    pub fn with_exclusive_write<R>(
        &self,
        handle: &IndexHandle,
        create: bool,
        policy: OptimizePolicy,
        body: impl FnOnce(&mut dyn IndexWriter) -> Result<R>,
    ) -> Result<R> {
        let _lock = handle.lock_writes();
        self.write_locked(handle, create, policy, body)
    }

    /// Run `body` with a new, uncached reader that may delete documents.
    pub fn with_exclusive_read<R>(
        &self,
        handle: &IndexHandle,
        body: impl FnOnce(&dyn IndexReader) -> Result<R>,
    ) -> Result<R> {
        let _lock = handle.lock_writes();
        self.read_locked(handle, body)
    }

    /// An exclusive reader pass followed by a writer pass, both under one
    /// acquisition of the write lock.
    pub fn with_exclusive_read_then_write<R>(
        &self,
        handle: &IndexHandle,
        reader_op: impl FnOnce(&dyn IndexReader) -> Result<()>,
        create: bool,
        policy: OptimizePolicy,
        writer_op: impl FnOnce(&mut dyn IndexWriter) -> Result<R>,
    ) -> Result<R> {
        let _lock = handle.lock_writes();
        self.read_locked(handle, reader_op)?;
        self.write_locked(handle, create, policy, writer_op)
    }

    /// Optimize through `writer` once the live reader count is zero.
    ///
    /// Waits by polling; with a configured upper bound the wait gives up and
    /// reports [`OptimizeOutcome::TimedOut`].
    pub fn optimize(
        &self,
        handle: &IndexHandle,
        writer: &mut dyn IndexWriter,
    ) -> Result<OptimizeOutcome> {
        if self.never_optimize {
            return Ok(OptimizeOutcome::Disabled);
        }

        let started = Instant::now();
        loop {
            {
                let mut cache = handle.cache();
                let live = cache.reader_count.get();
                if live == 0 {
                    self.readers.discard_locked(handle.index_type(), &mut cache);
                    self.readers.close_idle(handle.index_type());
                    trace_op!(TraceOp::Update, "optimizing index [{}]", handle.index_type());
                    writer.optimize()?;
                    trace_op!(
                        TraceOp::Update,
                        "optimizing index [{}] complete",
                        handle.index_type()
                    );
                    return Ok(OptimizeOutcome::Optimized);
                }
                log::debug!(
                    "Optimize of [{}] waiting for {live} readers",
                    handle.index_type()
                );
            }

            if let Some(max_wait) = self.reader_wait
                && started.elapsed() >= max_wait
            {
                log::warn!(
                    "Skipping optimize of [{}]: readers still active after {:?}",
                    handle.index_type(),
                    max_wait
                );
                return Ok(OptimizeOutcome::TimedOut);
            }
            thread::sleep(self.reader_poll);
        }
    }

    fn read_locked<R>(
        &self,
        handle: &IndexHandle,
        body: impl FnOnce(&dyn IndexReader) -> Result<R>,
    ) -> Result<R> {
        let reader = self.readers.get_exclusive_reader(handle)?;
        let result = body(reader.as_ref());

        // The shared reader no longer reflects the index once this pass deleted.
        if reader.deletions() > 0 {
            self.readers.discard(handle);
        }
        trace_op!(
            TraceOp::Connection,
            "closing exclusive reader {} for [{}]",
            reader.id(),
            handle.index_type()
        );
        if let Err(e) = reader.close()
            && !e.is_already_closed()
        {
            log::warn!("Unable to close reader of [{}]: {e}", handle.index_type());
        }

        result.map_err(|e| {
            log::error!("Exception during reader operation on [{}]: {e}", handle.index_type());
            wrap(handle, "IndexReader", e)
        })
    }

    fn write_locked<R>(
        &self,
        handle: &IndexHandle,
        create: bool,
        policy: OptimizePolicy,
        body: impl FnOnce(&mut dyn IndexWriter) -> Result<R>,
    ) -> Result<R> {
        let mut writer = match handle
            .directory()
            .new_writer(Arc::clone(handle.analyzer()), create)
        {
            Ok(writer) => writer,
            Err(e) => {
                self.readers.discard(handle);
                return Err(wrap(handle, "IndexWriter", e));
            }
        };
        trace_op!(
            TraceOp::Connection,
            "created writer for [{}] (create={create})",
            handle.index_type()
        );
        writer.apply_settings(if policy.optimize_on_finish {
            self.batch_settings
        } else {
            handle.config().interactive_settings()
        });

        let result = body(writer.as_mut()).and_then(|value| {
            self.apply_trigger(handle, policy, writer.as_mut())?;
            Ok(value)
        });

        if policy.optimize_on_finish
            && let Err(e) = self.optimize(handle, writer.as_mut())
        {
            log::warn!("Unable to optimize index [{}]: {e}", handle.index_type());
        }
        trace_op!(TraceOp::Connection, "closing writer for [{}]", handle.index_type());
        if let Err(e) = writer.close() {
            log::warn!("Unable to close writer of [{}]: {e}", handle.index_type());
        }
        self.readers.discard(handle);

        result.map_err(|e| {
            log::error!(
                "Exception during writer operation on [{}, create={create}]: {e}",
                handle.index_type()
            );
            wrap(handle, "IndexWriter", e)
        })
    }

    fn apply_trigger(
        &self,
        handle: &IndexHandle,
        policy: OptimizePolicy,
        writer: &mut dyn IndexWriter,
    ) -> Result<()> {
        if policy.trigger_count == 0 || policy.optimize_on_finish {
            return Ok(());
        }
        if handle.record_update() > policy.trigger_count
            && self.optimize(handle, writer)? != OptimizeOutcome::TimedOut
        {
            handle.reset_update_count();
        }
        Ok(())
    }
}

fn wrap(handle: &IndexHandle, operation: &'static str, error: PhalanxError) -> PhalanxError {
    match error {
        PhalanxError::IndexOperation { .. } => error,
        other => PhalanxError::index_operation(handle.index_type(), operation, other),
    }
}
