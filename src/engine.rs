//! Index engine contract.
//!
//! The coordination layer treats full-text indexing as an opaque engine that
//! exposes directories, point-in-time readers, exclusive writers and searchers.
//! Two implementations ship with the crate:
//!
//! - [`memory::MemoryEngine`]: in-process, for tests and embedding
//! - [`file::FileEngine`]: same semantics, committed state persisted to disk
//!
//! # Example
//!
//! ```
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! use phalanx::engine::analyzer::SimpleAnalyzer;
//! use phalanx::engine::document::Document;
//! use phalanx::engine::memory::MemoryEngine;
//! use phalanx::engine::query::Query;
//! use phalanx::engine::{IndexEngine, ReaderMode};
//!
//! # fn main() -> phalanx::error::Result<()> {
//! let engine = MemoryEngine::new();
//! let dir = engine.open_directory(Path::new("/idx/notes"))?;
//!
//! let mut writer = dir.new_writer(Arc::new(SimpleAnalyzer::new()), true)?;
//! writer.add_document(Document::new().with_keyword("id", "1").with_text("body", "hello"))?;
//! writer.close()?;
//!
//! let reader = dir.open_reader(ReaderMode::ReadOnly)?;
//! let searcher = dir.new_searcher(reader)?;
//! assert_eq!(searcher.search(&Query::term("body", "hello"))?.len(), 1);
//! # Ok(())
//! # }
//! ```

use std::fmt::Debug;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::engine::analyzer::Analyzer;
use crate::engine::document::Document;
use crate::engine::query::Query;
use crate::engine::searcher::{Hits, ReaderSearcher};
use crate::error::Result;

pub mod analyzer;
pub mod document;
pub mod file;
pub mod memory;
pub mod query;
pub mod searcher;

pub type DirectoryRef = Arc<dyn IndexDirectory>;
pub type ReaderRef = Arc<dyn IndexReader>;
pub type SearcherRef = Arc<dyn IndexSearcher>;

/// Whether a reader may apply deletions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReaderMode {
    ReadOnly,
    ReadWrite,
}

/// Writer tuning knobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriterSettings {
    /// Documents buffered in memory before they are flushed to the directory.
    pub max_buffered_docs: u32,

    /// How many segments accumulate before they are merged.
    pub merge_factor: u32,

    /// Pack segment files together to keep the number of open files low.
    pub use_compound_file: bool,
}

impl Default for WriterSettings {
    fn default() -> Self {
        Self {
            max_buffered_docs: 10,
            merge_factor: 10,
            use_compound_file: true,
        }
    }
}

/// A posting: a document containing a term, with the term frequency.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Posting {
    pub doc_id: u32,
    pub freq: u32,
}

/// An index engine: resolves index locations to directories.
pub trait IndexEngine: Send + Sync + Debug {
    /// Engine name, for diagnostics.
    fn name(&self) -> &str;

    /// Open (or create) the directory at `path`.
    fn open_directory(&self, path: &Path) -> Result<DirectoryRef>;
}

/// One index location.
pub trait IndexDirectory: Send + Sync + Debug {
    fn location(&self) -> &Path;

    /// Whether an index has ever been created here.
    fn index_exists(&self) -> Result<bool>;

    /// Open a point-in-time reader over committed data.
    fn open_reader(&self, mode: ReaderMode) -> Result<ReaderRef>;

    /// Open a writer. Only one writer may be open per directory; with
    /// `create` any existing documents are discarded.
    fn new_writer(&self, analyzer: Arc<dyn Analyzer>, create: bool)
    -> Result<Box<dyn IndexWriter>>;

    /// Wrap a reader in a searcher.
    fn new_searcher(&self, reader: ReaderRef) -> Result<SearcherRef> {
        Ok(Arc::new(ReaderSearcher::new(reader)))
    }
}

/// A point-in-time view over an index.
pub trait IndexReader: Send + Sync + Debug {
    /// Identity of this reader instance, used in trace output.
    fn id(&self) -> Uuid;

    /// Number of live documents.
    fn num_docs(&self) -> usize;

    /// One greater than the largest document id.
    fn max_doc(&self) -> u32;

    fn is_deleted(&self, doc_id: u32) -> bool;

    /// Stored document, or `None` if deleted or out of range.
    fn document(&self, doc_id: u32) -> Result<Option<Arc<Document>>>;

    /// Number of live documents containing the term.
    fn doc_freq(&self, field: &str, term: &str) -> Result<usize>;

    /// Live postings of the term, ordered by document id.
    fn postings(&self, field: &str, term: &str) -> Result<Vec<Posting>>;

    /// All terms of a field, sorted.
    fn terms(&self, field: &str) -> Result<Vec<String>>;

    /// Delete every document containing the term; returns how many.
    fn delete_documents(&self, field: &str, term: &str) -> Result<usize>;

    /// Documents deleted through this reader so far.
    fn deletions(&self) -> usize;

    fn close(&self) -> Result<()>;

    fn is_closed(&self) -> bool;
}

/// An exclusive handle for adding documents and optimizing.
pub trait IndexWriter: Send + Debug {
    fn settings(&self) -> WriterSettings;

    fn apply_settings(&mut self, settings: WriterSettings);

    fn add_document(&mut self, doc: Document) -> Result<()>;

    /// Documents added but not yet flushed.
    fn pending_docs(&self) -> usize;

    /// Compact the index.
    fn optimize(&mut self) -> Result<()>;

    /// Flush pending documents and release the directory write lock.
    fn close(&mut self) -> Result<()>;

    fn is_closed(&self) -> bool;
}

/// Executes queries against a reader.
pub trait IndexSearcher: Send + Sync + Debug {
    fn reader(&self) -> &ReaderRef;

    fn search(&self, query: &Query) -> Result<Hits>;
}
