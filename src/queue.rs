//! Buffered update processing.
//!
//! Writes are submitted as [`UpdateCommand`]s to a single consumer thread,
//! which buffers updates and deletes per index and applies each buffer as one
//! batch. Reindex jobs and queued callbacks are handed to a bounded executor
//! so they do not hold up the consumer.

pub mod callback;
pub mod command;
pub mod executor;
pub mod policy;
pub mod update;
pub mod worker;

pub use callback::StatusCallback;
pub use command::{Operation, UpdateCommand};
pub use executor::CallbackExecutor;
pub use policy::{FlushPolicy, SizeThresholdPolicy};
pub use update::UpdateQueue;
pub use worker::WorkQueue;
