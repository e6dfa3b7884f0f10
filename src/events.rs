//! Index change notifications.
//!
//! The [`IndexEventBus`] fans out [`IndexEvent`]s to registered listeners.
//! Each listener call is isolated: an error or panic in one listener is
//! logged and the remaining listeners are still notified.

use std::fmt::Debug;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::item::IndexItem;

pub mod tracker;

pub use tracker::IndexUpdateTracker;

/// What happened to the index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IndexEventKind {
    Query,
    Delete,
    Update,
}

/// An immutable notification about one item of one index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexEvent {
    source: IndexItem,
    kind: IndexEventKind,
    index_type: String,
    timestamp: DateTime<Utc>,
}

impl IndexEvent {
    pub fn new(source: IndexItem, kind: IndexEventKind, index_type: impl Into<String>) -> Self {
        Self {
            source,
            kind,
            index_type: index_type.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn source(&self) -> &IndexItem {
        &self.source
    }

    pub fn kind(&self) -> IndexEventKind {
        self.kind
    }

    pub fn index_type(&self) -> &str {
        &self.index_type
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

/// Receives index events.
pub trait IndexListener: Send + Sync + Debug {
    fn on_index_event(&self, event: &IndexEvent) -> Result<()>;
}

#[derive(Debug, Default)]
pub struct IndexEventBus {
    listeners: RwLock<Vec<Arc<dyn IndexListener>>>,
}

impl IndexEventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_listener(&self, listener: Arc<dyn IndexListener>) {
        self.listeners.write().push(listener);
    }

    /// Remove every registration of `listener`. Returns whether any was found.
    pub fn remove_listener(&self, listener: &Arc<dyn IndexListener>) -> bool {
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.retain(|l| !Arc::ptr_eq(l, listener));
        listeners.len() != before
    }

    pub fn len(&self) -> usize {
        self.listeners.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.read().is_empty()
    }

    /// Deliver `event` to every listener. Returns how many accepted it.
    pub fn publish(&self, event: &IndexEvent) -> usize {
        // Snapshot so listeners may (un)register while being notified.
        let listeners: Vec<Arc<dyn IndexListener>> = self.listeners.read().clone();
        let mut delivered = 0;
        for listener in listeners {
            match panic::catch_unwind(AssertUnwindSafe(|| listener.on_index_event(event))) {
                Ok(Ok(())) => delivered += 1,
                Ok(Err(e)) => log::warn!(
                    "Index listener {listener:?} failed on {:?} event for [{}]: {e}",
                    event.kind(),
                    event.index_type()
                ),
                Err(_) => log::error!(
                    "Index listener {listener:?} panicked on {:?} event for [{}]",
                    event.kind(),
                    event.index_type()
                ),
            }
        }
        delivered
    }
}
