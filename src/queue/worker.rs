//! Single-consumer work queue on a dedicated thread.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use crossbeam_channel::{Sender, unbounded};
use parking_lot::Mutex;

use crate::error::{PhalanxError, Result};

enum Message<T> {
    Item(T),
    Stop,
}

/// Items are handled one at a time, in submission order, by `handler`.
///
/// [`stop`](WorkQueue::stop) enqueues a stop marker behind everything already
/// submitted, so pending items are still handled. Once the consumer has seen
/// the marker it runs the `exiting` hook and terminates.
pub struct WorkQueue<T: Send + 'static> {
    name: String,
    sender: Sender<Message<T>>,
    running: Arc<AtomicBool>,
    handle: Mutex<Option<thread::JoinHandle<()>>>,
}

impl<T: Send + 'static> WorkQueue<T> {
    pub fn start<H, X>(name: impl Into<String>, mut handler: H, exiting: X) -> Result<Self>
    where
        H: FnMut(T) + Send + 'static,
        X: FnOnce() + Send + 'static,
    {
        let name = name.into();
        let (sender, receiver) = unbounded::<Message<T>>();
        let running = Arc::new(AtomicBool::new(true));

        let thread_name = name.clone();
        let handle = thread::Builder::new()
            .name(name.clone())
            .spawn(move || {
                while let Ok(Message::Item(item)) = receiver.recv() {
                    if panic::catch_unwind(AssertUnwindSafe(|| handler(item))).is_err() {
                        log::error!("Work item panicked in {thread_name}");
                    }
                }
                if panic::catch_unwind(AssertUnwindSafe(exiting)).is_err() {
                    log::error!("Exit hook panicked in {thread_name}");
                }
                log::debug!("{thread_name} exited");
            })
            .map_err(|e| PhalanxError::Thread(format!("failed to spawn {name}: {e}")))?;

        Ok(Self {
            name,
            sender,
            running,
            handle: Mutex::new(Some(handle)),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn enqueue(&self, item: T) -> Result<()> {
        if !self.is_running() {
            return Err(PhalanxError::ServiceStopped(format!("{} is stopped", self.name)));
        }
        self.sender
            .send(Message::Item(item))
            .map_err(|_| PhalanxError::ServiceStopped(format!("{} has exited", self.name)))
    }

    /// Items submitted but not yet taken by the consumer.
    pub fn pending(&self) -> usize {
        self.sender.len()
    }

    /// Stop accepting items, let the consumer drain and wait for it to exit.
    pub fn stop(&self) {
        if !self.running.swap(false, Ordering::AcqRel) {
            return;
        }
        let _ = self.sender.send(Message::Stop);
        if let Some(handle) = self.handle.lock().take()
            && handle.join().is_err()
        {
            log::error!("{} terminated abnormally", self.name);
        }
    }
}

impl<T: Send + 'static> Drop for WorkQueue<T> {
    fn drop(&mut self) {
        self.stop();
    }
}

impl<T: Send + 'static> std::fmt::Debug for WorkQueue<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkQueue")
            .field("name", &self.name)
            .field("running", &self.is_running())
            .field("pending", &self.pending())
            .finish()
    }
}
