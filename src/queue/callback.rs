//! Completion handle for asynchronous reindex and callback jobs.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::error::{PhalanxError, Result};
use crate::plugin::IndexResults;

/// Work run on behalf of a [`StatusCallback`].
pub type CallbackJob = Box<dyn FnOnce() -> Result<Option<IndexResults>> + Send>;

#[derive(Debug, Default)]
struct CallbackState {
    done: bool,
    error: Option<Arc<PhalanxError>>,
    results: Option<IndexResults>,
}

/// Tracks one asynchronous job. Any thread may block in
/// [`wait_until_done`](Self::wait_until_done); a failure of the job is
/// re-raised there.
pub struct StatusCallback {
    label: String,
    state: Mutex<CallbackState>,
    done: Condvar,
}

impl StatusCallback {
    pub fn new(label: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            label: label.into(),
            state: Mutex::new(CallbackState::default()),
            done: Condvar::new(),
        })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Run `job` on the current thread and record its outcome. Panics are
    /// captured as failures.
    pub fn run(&self, job: CallbackJob) {
        let outcome = match panic::catch_unwind(AssertUnwindSafe(job)) {
            Ok(outcome) => outcome,
            Err(payload) => {
                let message = payload
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                Err(PhalanxError::internal(format!("{} panicked: {message}", self.label)))
            }
        };
        self.complete(outcome);
    }

    /// Record the outcome and wake every waiter.
    pub fn complete(&self, outcome: Result<Option<IndexResults>>) {
        let mut state = self.state.lock();
        match outcome {
            Ok(results) => state.results = results,
            Err(e) => {
                log::debug!("Error during {} processing: {e}", self.label);
                state.error = Some(Arc::new(e));
            }
        }
        state.done = true;
        self.done.notify_all();
    }

    pub fn is_done(&self) -> bool {
        self.state.lock().done
    }

    /// Block until the job has completed; re-raise its failure.
    pub fn wait_until_done(&self) -> Result<()> {
        let mut state = self.state.lock();
        while !state.done {
            self.done.wait(&mut state);
        }
        match &state.error {
            Some(e) => Err(PhalanxError::Callback(Arc::clone(e))),
            None => Ok(()),
        }
    }

    /// Like [`wait_until_done`](Self::wait_until_done) with an upper bound.
    /// Returns `Ok(false)` if the job is still running.
    pub fn wait_timeout(&self, timeout: Duration) -> Result<bool> {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        while !state.done {
            if self.done.wait_until(&mut state, deadline).timed_out() {
                break;
            }
        }
        if !state.done {
            return Ok(false);
        }
        match &state.error {
            Some(e) => Err(PhalanxError::Callback(Arc::clone(e))),
            None => Ok(true),
        }
    }

    pub fn index_results(&self) -> Option<IndexResults> {
        self.state.lock().results.clone()
    }
}

impl fmt::Debug for StatusCallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("StatusCallback")
            .field("label", &self.label)
            .field("done", &state.done)
            .field("failed", &state.error.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_waiter_is_woken_with_results() {
        let callback = StatusCallback::new("reindex [notes]");
        let worker = Arc::clone(&callback);
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            worker.run(Box::new(|| {
                Ok(Some(IndexResults {
                    num_processed: 2,
                    num_indexed: 2,
                    finished: true,
                    ..Default::default()
                }))
            }));
        });

        callback.wait_until_done().unwrap();
        assert!(callback.is_done());
        assert_eq!(callback.index_results().unwrap().num_indexed, 2);
        handle.join().unwrap();
    }

    #[test]
    fn test_failure_is_reraised() {
        let callback = StatusCallback::new("callback [notes]");
        callback.run(Box::new(|| Err(PhalanxError::other("search exploded"))));

        let err = callback.wait_until_done().unwrap_err();
        match err {
            PhalanxError::Callback(inner) => assert!(inner.to_string().contains("search exploded")),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_panic_is_captured() {
        let callback = StatusCallback::new("callback [notes]");
        callback.run(Box::new(|| panic!("kaboom")));
        assert!(callback.wait_until_done().is_err());
    }

    #[test]
    fn test_wait_timeout() {
        let callback = StatusCallback::new("slow");
        assert!(!callback.wait_timeout(Duration::from_millis(10)).unwrap());
        callback.complete(Ok(None));
        assert!(callback.wait_timeout(Duration::from_millis(10)).unwrap());
    }
}
