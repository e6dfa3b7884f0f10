//! # Phalanx
//!
//! Concurrency and lifecycle management for a set of independently updatable
//! full-text indexes.
//!
//! ## Features
//!
//! - Shared, reference-counted index readers with deferred closing
//! - One exclusive writer per index, with optimize-on-trigger and
//!   optimize-on-finish policies
//! - A single-consumer update queue that batches updates and deletes per index
//! - Searches that can be ordered behind queued writes
//! - Update, delete and query notifications to registered listeners
//! - Pluggable index engines and per-index domain plugins

pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod index;
pub mod item;
pub mod plugin;
pub mod queue;
pub mod reader;
pub mod search;
pub mod service;
pub mod trace;
pub mod util;
pub mod writer;

pub mod prelude {
    pub use crate::config::{IndexConfig, ServiceConfig};
    pub use crate::engine::document::Document;
    pub use crate::engine::file::FileEngine;
    pub use crate::engine::memory::MemoryEngine;
    pub use crate::engine::query::Query;
    pub use crate::error::{PhalanxError, Result};
    pub use crate::events::{IndexEvent, IndexEventKind, IndexListener};
    pub use crate::item::{IndexItem, ObjectId};
    pub use crate::plugin::json::{JsonDocumentPlugin, JsonObjectStore};
    pub use crate::plugin::{IndexPlugin, SearchCriteria, SearchResults};
    pub use crate::search::{PagedResults, SearchMode};
    pub use crate::service::{ExecutionMode, IndexService};
}

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
