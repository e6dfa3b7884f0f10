//! Requests processed by the update queue.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::item::IndexItem;
use crate::queue::callback::{CallbackJob, StatusCallback};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operation {
    Delete,
    Update,
    Reindex,
    Callback,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operation::Delete => "delete",
            Operation::Update => "update",
            Operation::Reindex => "reindex",
            Operation::Callback => "callback",
        };
        f.write_str(name)
    }
}

/// One queued request against one index.
pub struct UpdateCommand {
    pub item: IndexItem,
    pub index_type: String,
    pub operation: Operation,
    /// The item is an identifier to be resolved by the plugin.
    pub index_by_id: bool,
    pub status_callback: Option<Arc<StatusCallback>>,
    /// Flush the buffer this command lands in right away.
    pub from_calling_thread: bool,
    job: Option<CallbackJob>,
}

impl UpdateCommand {
    fn buffered(index_type: impl Into<String>, item: IndexItem, operation: Operation) -> Self {
        Self {
            index_by_id: item.is_id(),
            item,
            index_type: index_type.into(),
            operation,
            status_callback: None,
            from_calling_thread: false,
            job: None,
        }
    }

    pub fn update(index_type: impl Into<String>, item: IndexItem) -> Self {
        Self::buffered(index_type, item, Operation::Update)
    }

    pub fn delete(index_type: impl Into<String>, item: IndexItem) -> Self {
        Self::buffered(index_type, item, Operation::Delete)
    }

    /// A reindex or callback command running `job`, with the callback to wait on.
    pub fn with_job(
        index_type: impl Into<String>,
        operation: Operation,
        job: CallbackJob,
    ) -> (Self, Arc<StatusCallback>) {
        let index_type = index_type.into();
        let callback = StatusCallback::new(format!("{operation} [{index_type}]"));
        let command = Self {
            item: IndexItem::Id("0".into()),
            index_type,
            operation,
            index_by_id: true,
            status_callback: Some(Arc::clone(&callback)),
            from_calling_thread: false,
            job: Some(job),
        };
        (command, callback)
    }

    pub fn from_calling_thread(mut self) -> Self {
        self.from_calling_thread = true;
        self
    }

    pub fn is_buffered(&self) -> bool {
        matches!(self.operation, Operation::Update | Operation::Delete)
    }

    pub(crate) fn take_job(&mut self) -> Option<(Arc<StatusCallback>, CallbackJob)> {
        let job = self.job.take()?;
        let callback = self.status_callback.clone()?;
        Some((callback, job))
    }
}

impl fmt::Debug for UpdateCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpdateCommand")
            .field("item", &self.item)
            .field("index_type", &self.index_type)
            .field("operation", &self.operation)
            .field("index_by_id", &self.index_by_id)
            .field("from_calling_thread", &self.from_calling_thread)
            .finish()
    }
}

impl fmt::Display for UpdateCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} on [{}]", self.operation, self.item, self.index_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::ObjectId;
    use serde_json::json;

    #[test]
    fn test_constructors() {
        let command = UpdateCommand::update("notes", IndexItem::Id(ObjectId::from(1u64)));
        assert!(command.index_by_id);
        assert!(command.is_buffered());
        assert_eq!(command.to_string(), "update id 1 on [notes]");

        let command =
            UpdateCommand::delete("notes", IndexItem::Object(json!({"id": 1}))).from_calling_thread();
        assert!(!command.index_by_id);
        assert!(command.from_calling_thread);

        let (mut command, callback) =
            UpdateCommand::with_job("notes", Operation::Reindex, Box::new(|| Ok(None)));
        assert!(!command.is_buffered());
        assert_eq!(callback.label(), "reindex [notes]");
        assert!(command.take_job().is_some());
        assert!(command.take_job().is_none());
    }
}
