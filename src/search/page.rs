//! Result windows and uniformly shaped result pages.

use std::collections::{BTreeMap, BTreeSet};
use std::ops::Range;

use serde::{Deserialize, Serialize};

use crate::engine::document::Document;
use crate::engine::searcher::Hits;

/// One result row: field name to stored values. `None` marks a field that
/// another row on the same page has but this document lacks.
pub type ResultRow = BTreeMap<String, Option<Vec<String>>>;

/// One page of search results.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PagedResults {
    pub total_matches: usize,
    pub results: Vec<ResultRow>,
}

impl PagedResults {
    /// Build the page covering `window` of `hits`, back-filling missing fields
    /// so every row has the same keys.
    pub fn from_hits(hits: &Hits, window: Range<usize>) -> Self {
        let mut results: Vec<ResultRow> = Vec::with_capacity(window.len());
        let mut all_fields = BTreeSet::new();
        for doc in window.filter_map(|i| hits.doc(i)) {
            let row = row_for(doc);
            all_fields.extend(row.keys().cloned());
            results.push(row);
        }
        for row in results.iter_mut() {
            for field in &all_fields {
                row.entry(field.clone()).or_insert(None);
            }
        }
        Self {
            total_matches: hits.len(),
            results,
        }
    }
}

fn row_for(doc: &Document) -> ResultRow {
    doc.field_names()
        .into_iter()
        .map(|name| (name.to_string(), Some(doc.values(name))))
        .collect()
}

/// Streaming consumer of search matches.
pub trait SearchResultHandler {
    /// Called once, before any match.
    fn set_total_matches(&mut self, total: usize);

    /// Handle one matching document; return `false` to stop early.
    fn process_match(&mut self, doc: &Document) -> bool;
}

/// Index range of the hits to return.
///
/// `max_results` of zero means no limit; a `page_size` of zero disables
/// paging. Pages are numbered from 1 and values below 1 are treated as 1.
pub fn result_window(
    total: usize,
    max_results: usize,
    page_size: usize,
    page: usize,
) -> Range<usize> {
    let limit = if max_results == 0 {
        total
    } else {
        max_results.min(total)
    };
    let start = if page_size > 0 {
        page_size.saturating_mul(page.max(1) - 1)
    } else {
        0
    };
    let end = if page_size > 0 {
        start.saturating_add(page_size).min(limit)
    } else {
        limit
    };
    start.min(end)..end
}
