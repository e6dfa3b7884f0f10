//! Query evaluation over any [`IndexReader`].

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::engine::document::Document;
use crate::engine::query::{Occur, Query};
use crate::engine::{IndexReader, IndexSearcher, ReaderRef};
use crate::error::{PhalanxError, Result};

/// A matching document.
#[derive(Debug, Clone)]
pub struct Hit {
    pub doc_id: u32,
    pub score: f32,
    pub document: Arc<Document>,
}

/// Ranked search results.
#[derive(Debug, Clone, Default)]
pub struct Hits {
    hits: Vec<Hit>,
}

impl Hits {
    pub fn new(hits: Vec<Hit>) -> Self {
        Self { hits }
    }

    pub fn len(&self) -> usize {
        self.hits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Hit> {
        self.hits.get(index)
    }

    /// Stored document of the hit at `index`.
    pub fn doc(&self, index: usize) -> Option<&Document> {
        self.hits.get(index).map(|h| h.document.as_ref())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Hit> {
        self.hits.iter()
    }
}

type Scores = BTreeMap<u32, f32>;

/// Scores documents by summed term frequency. Ties keep document order.
#[derive(Debug)]
pub struct ReaderSearcher {
    reader: ReaderRef,
}

impl ReaderSearcher {
    pub fn new(reader: ReaderRef) -> Self {
        Self { reader }
    }

    fn evaluate(&self, query: &Query) -> Result<Scores> {
        let reader: &dyn IndexReader = self.reader.as_ref();
        match query {
            Query::MatchAll => Ok((0..reader.max_doc())
                .filter(|doc_id| !reader.is_deleted(*doc_id))
                .map(|doc_id| (doc_id, 1.0))
                .collect()),
            Query::Term { field, value } => Ok(reader
                .postings(field, value)?
                .into_iter()
                .map(|p| (p.doc_id, p.freq as f32))
                .collect()),
            Query::Prefix { field, prefix } => {
                let mut scores = Scores::new();
                for term in reader.terms(field)? {
                    if !term.starts_with(prefix.as_str()) {
                        continue;
                    }
                    for posting in reader.postings(field, &term)? {
                        *scores.entry(posting.doc_id).or_default() += posting.freq as f32;
                    }
                }
                Ok(scores)
            }
            Query::Boolean(clauses) => {
                let mut required: Option<Scores> = None;
                let mut optional = Scores::new();
                let mut prohibited = Vec::new();

                for clause in clauses {
                    let scores = self.evaluate(&clause.query)?;
                    match clause.occur {
                        Occur::Must => {
                            required = Some(match required {
                                None => scores,
                                Some(acc) => acc
                                    .into_iter()
                                    .filter_map(|(doc, s)| scores.get(&doc).map(|t| (doc, s + t)))
                                    .collect(),
                            });
                        }
                        Occur::Should => {
                            for (doc, s) in scores {
                                *optional.entry(doc).or_default() += s;
                            }
                        }
                        Occur::MustNot => prohibited.extend(scores.into_keys()),
                    }
                }

                let mut result = match required {
                    Some(mut acc) => {
                        for (doc, s) in acc.iter_mut() {
                            if let Some(extra) = optional.get(doc) {
                                *s += extra;
                            }
                        }
                        acc
                    }
                    None => optional,
                };
                for doc in prohibited {
                    result.remove(&doc);
                }
                Ok(result)
            }
        }
    }
}

impl IndexSearcher for ReaderSearcher {
    fn reader(&self) -> &ReaderRef {
        &self.reader
    }

    fn search(&self, query: &Query) -> Result<Hits> {
        if self.reader.is_closed() {
            return Err(PhalanxError::already_closed(format!(
                "reader {} is closed",
                self.reader.id()
            )));
        }

        let mut hits = Vec::new();
        for (doc_id, score) in self.evaluate(query)? {
            if let Some(document) = self.reader.document(doc_id)? {
                hits.push(Hit {
                    doc_id,
                    score,
                    document,
                });
            }
        }
        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(Ordering::Equal)
                .then(a.doc_id.cmp(&b.doc_id))
        });
        Ok(Hits::new(hits))
    }
}
