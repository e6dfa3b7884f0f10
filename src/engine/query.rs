//! Engine query model and a small query-string parser.
//!
//! The grammar is intentionally tiny: whitespace separated clauses of the form
//! `[+|-]field:value`, `value` (against the default field), `value*` for a
//! prefix match and `*:*` for every document. `AND` and `OR` are accepted and
//! ignored (clauses are optional unless prefixed with `+`); `NOT` prohibits the
//! following clause.

use std::fmt;
use std::sync::Arc;

use crate::engine::analyzer::Analyzer;
use crate::error::{PhalanxError, Result};

/// How a clause participates in a boolean query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Occur {
    Must,
    Should,
    MustNot,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Clause {
    pub occur: Occur,
    pub query: Query,
}

/// A query understood by [`crate::engine::searcher::ReaderSearcher`].
#[derive(Debug, Clone, PartialEq)]
pub enum Query {
    /// Matches every live document.
    MatchAll,
    /// Exact term match.
    Term { field: String, value: String },
    /// Any term of `field` starting with `prefix`.
    Prefix { field: String, prefix: String },
    /// Combination of clauses.
    Boolean(Vec<Clause>),
}

impl Query {
    pub fn term(field: impl Into<String>, value: impl Into<String>) -> Self {
        Query::Term {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn prefix(field: impl Into<String>, prefix: impl Into<String>) -> Self {
        Query::Prefix {
            field: field.into(),
            prefix: prefix.into(),
        }
    }

    /// Boolean query with every clause required.
    pub fn all_of(queries: impl IntoIterator<Item = Query>) -> Self {
        Query::Boolean(
            queries
                .into_iter()
                .map(|query| Clause {
                    occur: Occur::Must,
                    query,
                })
                .collect(),
        )
    }

    /// Boolean query with every clause optional.
    pub fn any_of(queries: impl IntoIterator<Item = Query>) -> Self {
        Query::Boolean(
            queries
                .into_iter()
                .map(|query| Clause {
                    occur: Occur::Should,
                    query,
                })
                .collect(),
        )
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Query::MatchAll => f.write_str("*:*"),
            Query::Term { field, value } => write!(f, "{field}:{value}"),
            Query::Prefix { field, prefix } => write!(f, "{field}:{prefix}*"),
            Query::Boolean(clauses) => {
                for (i, clause) in clauses.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" ")?;
                    }
                    match clause.occur {
                        Occur::Must => f.write_str("+")?,
                        Occur::MustNot => f.write_str("-")?,
                        Occur::Should => {}
                    }
                    match &clause.query {
                        Query::Boolean(_) => write!(f, "({})", clause.query)?,
                        other => write!(f, "{other}")?,
                    }
                }
                Ok(())
            }
        }
    }
}

/// Parses query strings against a default field using an index analyzer.
#[derive(Debug, Clone)]
pub struct QueryParser {
    default_field: String,
    analyzer: Arc<dyn Analyzer>,
}

impl QueryParser {
    pub fn new(default_field: impl Into<String>, analyzer: Arc<dyn Analyzer>) -> Self {
        Self {
            default_field: default_field.into(),
            analyzer,
        }
    }

    pub fn parse(&self, text: &str) -> Result<Query> {
        let mut clauses = Vec::new();
        let mut negate_next = false;

        for token in text.split_whitespace() {
            match token {
                "AND" | "OR" | "&&" | "||" => continue,
                "NOT" | "!" => {
                    negate_next = true;
                    continue;
                }
                _ => {}
            }

            let (mut occur, body) = match token.as_bytes()[0] {
                b'+' => (Occur::Must, &token[1..]),
                b'-' => (Occur::MustNot, &token[1..]),
                _ => (Occur::Should, token),
            };
            if negate_next {
                occur = Occur::MustNot;
                negate_next = false;
            }

            if let Some(query) = self.parse_clause(body)? {
                clauses.push(Clause { occur, query });
            }
        }

        match clauses.len() {
            0 => Err(PhalanxError::query(format!("no searchable terms in [{text}]"))),
            1 if clauses[0].occur == Occur::Should => Ok(clauses.remove(0).query),
            _ => Ok(Query::Boolean(clauses)),
        }
    }

    fn parse_clause(&self, body: &str) -> Result<Option<Query>> {
        let (field, raw_value) = match body.split_once(':') {
            Some((field, value)) if !field.is_empty() => (field, value),
            Some((_, _)) => {
                return Err(PhalanxError::query(format!("missing field name in [{body}]")));
            }
            None => (self.default_field.as_str(), body),
        };
        let value: String = raw_value
            .chars()
            .filter(|c| !matches!(c, '(' | ')' | '"'))
            .collect();

        if field == "*" && value == "*" {
            return Ok(Some(Query::MatchAll));
        }
        if value.is_empty() {
            return Ok(None);
        }
        if let Some(prefix) = value.strip_suffix('*')
            && !prefix.is_empty()
        {
            return Ok(Some(Query::prefix(field, prefix.to_lowercase())));
        }

        let mut terms = self.analyzer.analyze(&value);
        Ok(match terms.len() {
            0 => None,
            1 => Some(Query::term(field, terms.remove(0))),
            _ => Some(Query::any_of(terms.into_iter().map(|t| Query::term(field, t)))),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::analyzer::SimpleAnalyzer;

    fn parser() -> QueryParser {
        QueryParser::new("Gtext", Arc::new(SimpleAnalyzer::new()))
    }

    #[test]
    fn test_single_term_uses_default_field() {
        assert_eq!(parser().parse("Rust").unwrap(), Query::term("Gtext", "rust"));
        assert_eq!(parser().parse("title:Rust").unwrap(), Query::term("title", "rust"));
    }

    #[test]
    fn test_boolean_prefixes() {
        let query = parser().parse("+tag:red -tag:blue title:sea* NOT id:4").unwrap();
        assert_eq!(query.to_string(), "+tag:red -tag:blue title:sea* -id:4");
    }

    #[test]
    fn test_match_all_and_errors() {
        assert_eq!(parser().parse("*:*").unwrap(), Query::MatchAll);
        assert!(parser().parse("  AND ").is_err());
        assert!(parser().parse(":value").is_err());
    }

    #[test]
    fn test_multi_term_value_becomes_optional_clauses() {
        let query = parser().parse("body:hello-world").unwrap();
        assert_eq!(query.to_string(), "body:hello body:world");
    }
}
