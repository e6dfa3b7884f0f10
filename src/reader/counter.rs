//! Reference counter of in-flight reader uses.
//!
//! Clones share the same count. A discarded reader keeps a clone of the
//! counter that was live when it was discarded, while the index handle moves
//! on to a fresh counter, so late users of the old reader stay tracked.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Debug, Clone, Default)]
pub struct ReaderCounter(Arc<AtomicUsize>);

impl ReaderCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }

    pub fn increment(&self) -> usize {
        self.0.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Decrement, never going below zero.
    pub fn decrement(&self) -> usize {
        match self
            .0
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        {
            Ok(previous) => previous - 1,
            Err(_) => {
                log::warn!("Reader counter decremented below zero");
                0
            }
        }
    }

    /// Increment now and decrement when the returned guard is dropped.
    pub fn acquire(&self) -> ReaderGuard {
        self.increment();
        ReaderGuard {
            counter: self.clone(),
        }
    }

    /// Whether both handles share one count.
    pub fn same_as(&self, other: &ReaderCounter) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

/// Scoped reader use; releases its count on drop, including during unwinding.
#[derive(Debug)]
pub struct ReaderGuard {
    counter: ReaderCounter,
}

impl ReaderGuard {
    pub fn counter(&self) -> &ReaderCounter {
        &self.counter
    }
}

impl Drop for ReaderGuard {
    fn drop(&mut self) {
        self.counter.decrement();
    }
}
