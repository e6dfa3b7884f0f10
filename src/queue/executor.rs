//! Bounded pool running reindex jobs and queued callbacks.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender, unbounded};
use parking_lot::Mutex;

use crate::error::{PhalanxError, Result};
use crate::queue::callback::{CallbackJob, StatusCallback};
use crate::trace::{TraceOp, trace_op};

struct Task {
    callback: Arc<StatusCallback>,
    job: CallbackJob,
}

#[derive(Debug)]
pub struct CallbackExecutor {
    sender: Mutex<Option<Sender<Task>>>,
    finished: Receiver<()>,
    workers: usize,
}

impl CallbackExecutor {
    pub fn new(workers: usize) -> Result<Self> {
        let workers = workers.max(1);
        let (sender, receiver) = unbounded::<Task>();
        let (finished_sender, finished) = unbounded::<()>();

        for worker_id in 0..workers {
            let receiver = receiver.clone();
            let finished_sender = finished_sender.clone();
            thread::Builder::new()
                .name(format!("phalanx-callback-{worker_id}"))
                .spawn(move || {
                    for task in receiver.iter() {
                        trace_op!(TraceOp::Connection, "processing {}", task.callback.label());
                        task.callback.run(task.job);
                        trace_op!(TraceOp::Connection, "completed {}", task.callback.label());
                    }
                    let _ = finished_sender.send(());
                })
                .map_err(|e| PhalanxError::Thread(format!("failed to spawn callback worker: {e}")))?;
        }

        Ok(Self {
            sender: Mutex::new(Some(sender)),
            finished,
            workers,
        })
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Run `job` on a pool thread, completing `callback` with its outcome.
    pub fn submit(&self, callback: Arc<StatusCallback>, job: CallbackJob) -> Result<()> {
        let sender = self.sender.lock();
        let Some(sender) = sender.as_ref() else {
            return Err(PhalanxError::ServiceStopped(
                "callback executor is shut down".to_string(),
            ));
        };
        sender
            .send(Task { callback, job })
            .map_err(|_| PhalanxError::ServiceStopped("callback workers have exited".to_string()))
    }

    /// Stop accepting jobs and wait up to `timeout` for queued and running
    /// jobs to finish. Returns `false` if the wait timed out; remaining
    /// workers keep running detached.
    pub fn shutdown(&self, timeout: Duration) -> bool {
        if self.sender.lock().take().is_none() {
            return true;
        }
        log::info!("Waiting for termination of {} callback workers", self.workers);

        let deadline = Instant::now() + timeout;
        for _ in 0..self.workers {
            if self.finished.recv_deadline(deadline).is_err() {
                log::warn!("Timed out after {timeout:?} waiting for callback workers");
                return false;
            }
        }
        true
    }
}

impl Drop for CallbackExecutor {
    fn drop(&mut self) {
        // Closing the channel lets idle workers exit; running jobs are not awaited.
        self.sender.lock().take();
    }
}
