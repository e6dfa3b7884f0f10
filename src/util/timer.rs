//! Fixed-period background task.

use std::panic::{self, AssertUnwindSafe};
use std::thread;
use std::time::Duration;

use crossbeam_channel::{RecvTimeoutError, Sender, bounded};

use crate::error::{PhalanxError, Result};

/// Runs a closure on a dedicated named thread every `period` until stopped.
/// A run that panics is logged and the schedule continues.
#[derive(Debug)]
pub struct PeriodicTask {
    name: String,
    stop_sender: Option<Sender<()>>,
    handle: Option<thread::JoinHandle<()>>,
}

impl PeriodicTask {
    /// Start the task. The first run happens one `period` after start.
    pub fn start<F>(name: impl Into<String>, period: Duration, mut task: F) -> Result<Self>
    where
        F: FnMut() + Send + 'static,
    {
        let name = name.into();
        let (stop_sender, stop_receiver) = bounded::<()>(1);

        let thread_name = name.clone();
        let handle = thread::Builder::new()
            .name(name.clone())
            .spawn(move || {
                loop {
                    match stop_receiver.recv_timeout(period) {
                        Err(RecvTimeoutError::Timeout) => {
                            if panic::catch_unwind(AssertUnwindSafe(|| task())).is_err() {
                                log::error!("Scheduled run of {thread_name} panicked");
                            }
                        }
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
            })
            .map_err(|e| PhalanxError::Thread(format!("failed to spawn {name}: {e}")))?;

        Ok(Self {
            name,
            stop_sender: Some(stop_sender),
            handle: Some(handle),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Stop the task and wait for an in-progress run to finish.
    pub fn stop(&mut self) {
        if let Some(sender) = self.stop_sender.take() {
            let _ = sender.send(());
        }
        if let Some(handle) = self.handle.take()
            && handle.join().is_err()
        {
            log::error!("Periodic task {} panicked", self.name);
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }
}

impl Drop for PeriodicTask {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_runs_until_stopped() {
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&runs);
        let mut task = PeriodicTask::start("test-timer", Duration::from_millis(5), move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

        thread::sleep(Duration::from_millis(100));
        task.stop();
        assert!(!task.is_running());

        let after_stop = runs.load(Ordering::SeqCst);
        assert!(after_stop > 0);
        thread::sleep(Duration::from_millis(30));
        assert_eq!(runs.load(Ordering::SeqCst), after_stop);
    }

    #[test]
    fn test_panicking_run_keeps_schedule() {
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&runs);
        let mut task = PeriodicTask::start("panicking-timer", Duration::from_millis(5), move || {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                panic!("first run fails");
            }
        })
        .unwrap();

        for _ in 0..200 {
            if runs.load(Ordering::SeqCst) >= 3 {
                break;
            }
            thread::sleep(Duration::from_millis(5));
        }
        task.stop();
        assert!(runs.load(Ordering::SeqCst) >= 3);
    }
}
