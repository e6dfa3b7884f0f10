//! Per-index plugins mapping domain objects to documents.
//!
//! A plugin owns everything domain-specific about one index type: how objects
//! are loaded and turned into documents, how the whole index is rebuilt and
//! how stored documents become search matches. The service owns everything
//! about concurrency.

use std::collections::BTreeMap;
use std::fmt::Debug;
use std::ops::Range;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::IndexConfig;
use crate::engine::analyzer::Analyzer;
use crate::engine::document::Document;
use crate::engine::query::{Query, QueryParser};
use crate::engine::{IndexSearcher, IndexWriter};
use crate::error::{PhalanxError, Result};
use crate::events::IndexEventBus;
use crate::index::IndexHandle;
use crate::item::ObjectId;
use crate::search::page::result_window;
use crate::writer::{OptimizePolicy, WriterCoordinator};

pub mod json;

pub type PluginRef = Arc<dyn IndexPlugin>;

/// Outcome of a reindex run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexResults {
    pub num_processed: usize,
    pub num_indexed: usize,
    pub finished: bool,
    /// Per-object failures, keyed by object id.
    pub errors: BTreeMap<String, String>,
}

/// What to find, and which slice of the matches to return.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchCriteria {
    pub query: String,
    /// Only the total number of matches is wanted.
    pub count_only: bool,
    /// Upper bound on matches considered; 0 means no limit.
    pub max_results: usize,
    /// Matches per page; 0 disables paging.
    pub page_size: usize,
    /// 1-based page number.
    pub page: usize,
}

impl SearchCriteria {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            page: 1,
            ..Default::default()
        }
    }

    pub fn count_only(mut self) -> Self {
        self.count_only = true;
        self
    }

    pub fn with_max_results(mut self, max_results: usize) -> Self {
        self.max_results = max_results;
        self
    }

    pub fn with_page(mut self, page_size: usize, page: usize) -> Self {
        self.page_size = page_size;
        self.page = page;
        self
    }

    /// Indexes of the hits to return out of `total`.
    pub fn window(&self, total: usize) -> Range<usize> {
        result_window(total, self.max_results, self.page_size, self.page)
    }
}

/// One match built from a stored document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchMatch {
    pub id: Option<ObjectId>,
    pub score: f32,
    pub fields: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchResults {
    pub total_matches: usize,
    pub matches: Vec<SearchMatch>,
}

/// Access to an index's batch writer during [`IndexPlugin::reindex`].
pub struct ReindexContext<'a> {
    handle: &'a IndexHandle,
    writers: &'a WriterCoordinator,
}

impl<'a> ReindexContext<'a> {
    pub fn new(handle: &'a IndexHandle, writers: &'a WriterCoordinator) -> Self {
        Self { handle, writers }
    }

    pub fn index_type(&self) -> &str {
        self.handle.index_type()
    }

    /// Recreate the index from scratch with a batch writer, optimizing at the end.
    pub fn with_batch_writer(
        &self,
        body: &mut dyn FnMut(&mut dyn IndexWriter) -> Result<()>,
    ) -> Result<()> {
        self.writers
            .with_exclusive_write(self.handle, true, OptimizePolicy::batch(), |writer| body(writer))
    }
}

/// What [`IndexPlugin::find`] runs against.
pub struct FindContext<'a> {
    pub searcher: &'a dyn IndexSearcher,
    pub parser: &'a QueryParser,
}

pub trait IndexPlugin: Send + Sync + Debug {
    /// Name of the index this plugin serves.
    fn index_type(&self) -> &str;

    /// Plugin implementation name, for status output.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Called once at service start. Plugins may register listeners on `events`.
    fn init(&self, events: &Arc<IndexEventBus>) -> Result<IndexConfig>;

    /// Analyzer for writing and parsing queries. `None` is a configuration error.
    fn analyzer(&self) -> Option<Arc<dyn Analyzer>>;

    /// Rebuild the entire index.
    fn reindex(&self, ctx: &ReindexContext<'_>) -> Result<IndexResults>;

    /// Load the object with `id` and add it to `writer`.
    /// An object that cannot be loaded is reported as
    /// [`PhalanxError::ObjectResolution`].
    fn index(&self, id: &ObjectId, writer: &mut dyn IndexWriter) -> Result<()>;

    fn index_object(&self, object: &Value, writer: &mut dyn IndexWriter) -> Result<()>;

    fn id_for_object(&self, object: &Value) -> Option<ObjectId>;

    /// Turn a stored document into a match.
    fn build(&self, doc: &Document) -> Result<SearchMatch>;

    /// Engine query for `criteria`, if this plugin can express one.
    fn native_query(
        &self,
        criteria: &SearchCriteria,
        parser: &QueryParser,
    ) -> Result<Option<Query>> {
        parser.parse(&criteria.query).map(Some)
    }

    fn find(&self, criteria: &SearchCriteria, ctx: &FindContext<'_>) -> Result<SearchResults> {
        let query = self.native_query(criteria, ctx.parser)?.ok_or_else(|| {
            PhalanxError::unsupported(format!(
                "no query for criteria [{}] on [{}]",
                criteria.query,
                self.index_type()
            ))
        })?;
        let hits = ctx.searcher.search(&query)?;
        let total_matches = hits.len();
        if criteria.count_only {
            return Ok(SearchResults {
                total_matches,
                matches: Vec::new(),
            });
        }

        let mut matches = Vec::new();
        for i in criteria.window(total_matches) {
            if let Some(hit) = hits.get(i) {
                let mut found = self.build(&hit.document)?;
                found.score = hit.score;
                matches.push(found);
            }
        }
        Ok(SearchResults {
            total_matches,
            matches,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_criteria_window() {
        let criteria = SearchCriteria::new("x").with_page(10, 2);
        assert_eq!(criteria.window(25), 10..20);
        assert_eq!(criteria.window(15), 10..15);
        assert_eq!(criteria.window(5), 5..5);

        let criteria = SearchCriteria::new("x").with_max_results(3);
        assert_eq!(criteria.window(25), 0..3);
    }
}
