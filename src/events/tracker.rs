//! Listener that remembers updated items so they can be removed again.

use std::collections::HashMap;

use parking_lot::Mutex;

use crate::error::Result;
use crate::events::{IndexEvent, IndexEventKind, IndexListener};
use crate::item::IndexItem;
use crate::service::IndexService;

/// Records every `Update` event per index type.
///
/// Tests register one, run against a shared index, then call
/// [`clean_up`](Self::clean_up) to delete what they indexed.
#[derive(Debug, Default)]
pub struct IndexUpdateTracker {
    updates: Mutex<HashMap<String, Vec<IndexItem>>>,
}

impl IndexUpdateTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Items updated in `index_type`, in event order.
    pub fn updates(&self, index_type: &str) -> Vec<IndexItem> {
        self.updates
            .lock()
            .get(index_type)
            .cloned()
            .unwrap_or_default()
    }

    /// Delete every recorded item and forget it. Returns how many deletes were
    /// issued; failures are logged at debug level and skipped.
    pub fn clean_up(&self, service: &IndexService) -> usize {
        let updates = std::mem::take(&mut *self.updates.lock());
        let mut issued = 0;
        for (index_type, items) in updates {
            for item in items {
                let result = match &item {
                    IndexItem::Id(id) => service.delete_object_by_id(&index_type, id.clone()),
                    IndexItem::Object(object) => service.delete_object(&index_type, object.clone()),
                };
                match result {
                    Ok(()) => issued += 1,
                    Err(e) => log::debug!("Unable to delete {item} from [{index_type}]: {e}"),
                }
            }
        }
        issued
    }
}

impl IndexListener for IndexUpdateTracker {
    fn on_index_event(&self, event: &IndexEvent) -> Result<()> {
        if event.kind() == IndexEventKind::Update {
            self.updates
                .lock()
                .entry(event.index_type().to_string())
                .or_default()
                .push(event.source().clone());
        }
        Ok(())
    }
}
