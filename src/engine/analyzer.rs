//! Text analysis used by writers and the query parser.

use std::fmt::Debug;

use unicode_segmentation::UnicodeSegmentation;

/// Turns field text into index terms.
pub trait Analyzer: Send + Sync + Debug {
    /// Analyzer name, for diagnostics.
    fn name(&self) -> &str;

    /// Split `text` into terms.
    fn analyze(&self, text: &str) -> Vec<String>;
}

/// Splits on Unicode word boundaries and lowercases every word.
#[derive(Debug, Clone, Default)]
pub struct SimpleAnalyzer;

impl SimpleAnalyzer {
    pub fn new() -> Self {
        Self
    }
}

impl Analyzer for SimpleAnalyzer {
    fn name(&self) -> &str {
        "simple"
    }

    fn analyze(&self, text: &str) -> Vec<String> {
        text.unicode_words().map(|w| w.to_lowercase()).collect()
    }
}

/// Emits the whole input as a single term.
#[derive(Debug, Clone, Default)]
pub struct KeywordAnalyzer;

impl Analyzer for KeywordAnalyzer {
    fn name(&self) -> &str {
        "keyword"
    }

    fn analyze(&self, text: &str) -> Vec<String> {
        if text.is_empty() {
            Vec::new()
        } else {
            vec![text.to_string()]
        }
    }
}
