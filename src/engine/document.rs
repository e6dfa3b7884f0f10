//! Stored documents exchanged with the index engine.

use serde::{Deserialize, Serialize};

/// How a field value is treated at index time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldKind {
    /// Analyzed into terms and stored.
    Text,
    /// Indexed as a single untouched term and stored.
    Keyword,
    /// Stored only, never searchable.
    Stored,
}

/// A single named field value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub value: String,
    pub kind: FieldKind,
}

/// A document: an ordered list of (possibly repeated) fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    fields: Vec<Field>,
}

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a field.
    pub fn add(&mut self, name: impl Into<String>, value: impl Into<String>, kind: FieldKind) {
        self.fields.push(Field {
            name: name.into(),
            value: value.into(),
            kind,
        });
    }

    pub fn with_text(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.add(name, value, FieldKind::Text);
        self
    }

    pub fn with_keyword(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.add(name, value, FieldKind::Keyword);
        self
    }

    pub fn with_stored(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.add(name, value, FieldKind::Stored);
        self
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// First value of the named field.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|f| f.name == name)
            .map(|f| f.value.as_str())
    }

    /// All values of the named field, in insertion order.
    pub fn values(&self, name: &str) -> Vec<String> {
        self.fields
            .iter()
            .filter(|f| f.name == name)
            .map(|f| f.value.clone())
            .collect()
    }

    /// Distinct field names in first-seen order.
    pub fn field_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for field in &self.fields {
            if !names.contains(&field.name.as_str()) {
                names.push(&field.name);
            }
        }
        names
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}
