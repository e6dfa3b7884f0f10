//! Owned registry of index handles, keyed by index type.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::{PhalanxError, Result};
use crate::index::IndexHandle;

#[derive(Debug, Default)]
pub struct IndexRegistry {
    handles: RwLock<HashMap<String, Arc<IndexHandle>>>,
}

impl IndexRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handle, replacing any previous handle of the same type.
    pub fn register(&self, handle: IndexHandle) -> Arc<IndexHandle> {
        let handle = Arc::new(handle);
        let previous = self
            .handles
            .write()
            .insert(handle.index_type().to_string(), Arc::clone(&handle));
        if previous.is_some() {
            log::warn!("Replaced index handle for [{}]", handle.index_type());
        }
        handle
    }

    pub fn get(&self, index_type: &str) -> Result<Arc<IndexHandle>> {
        self.handles
            .read()
            .get(index_type)
            .cloned()
            .ok_or_else(|| PhalanxError::UnknownIndex(index_type.to_string()))
    }

    pub fn contains(&self, index_type: &str) -> bool {
        self.handles.read().contains_key(index_type)
    }

    /// Registered index types, sorted.
    pub fn index_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.handles.read().keys().cloned().collect();
        types.sort();
        types
    }

    /// All handles, sorted by index type.
    pub fn handles(&self) -> Vec<Arc<IndexHandle>> {
        let mut handles: Vec<Arc<IndexHandle>> = self.handles.read().values().cloned().collect();
        handles.sort_by(|a, b| a.index_type().cmp(b.index_type()));
        handles
    }

    pub fn len(&self) -> usize {
        self.handles.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.read().is_empty()
    }
}
