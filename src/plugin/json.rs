//! A generic plugin indexing JSON objects.
//!
//! Objects live in a [`JsonObjectStore`] keyed by the value of their id field.
//! String values become analyzed text fields, numbers and booleans become
//! keyword fields and nested objects are stored verbatim. All text is also
//! copied into a catch-all default field so unqualified queries match it.

use std::collections::BTreeMap;
use std::io::BufRead;
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::Value;

use crate::config::IndexConfig;
use crate::engine::IndexWriter;
use crate::engine::analyzer::{Analyzer, SimpleAnalyzer};
use crate::engine::document::{Document, FieldKind};
use crate::error::{PhalanxError, Result};
use crate::events::IndexEventBus;
use crate::item::ObjectId;
use crate::plugin::{IndexPlugin, IndexResults, ReindexContext, SearchMatch};

/// In-memory object source for [`JsonDocumentPlugin`].
#[derive(Debug, Default)]
pub struct JsonObjectStore {
    objects: RwLock<BTreeMap<ObjectId, Value>>,
}

impl JsonObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace an object.
    pub fn put(&self, id: impl Into<ObjectId>, object: Value) {
        self.objects.write().insert(id.into(), object);
    }

    pub fn get(&self, id: &ObjectId) -> Option<Value> {
        self.objects.read().get(id).cloned()
    }

    pub fn remove(&self, id: &ObjectId) -> Option<Value> {
        self.objects.write().remove(id)
    }

    pub fn len(&self) -> usize {
        self.objects.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.read().is_empty()
    }

    /// All objects, ordered by id.
    pub fn entries(&self) -> Vec<(ObjectId, Value)> {
        self.objects
            .read()
            .iter()
            .map(|(id, object)| (id.clone(), object.clone()))
            .collect()
    }

    /// Load one JSON object per line, keyed by `id_field`. Blank lines are
    /// skipped. Returns the ids in input order.
    pub fn load_lines(&self, input: impl BufRead, id_field: &str) -> Result<Vec<ObjectId>> {
        let mut ids = Vec::new();
        for (number, line) in input.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let object: Value = serde_json::from_str(&line)?;
            let id = object
                .get(id_field)
                .and_then(ObjectId::from_json)
                .ok_or_else(|| {
                    PhalanxError::object_resolution(format!(
                        "line {}: missing \"{id_field}\"",
                        number + 1
                    ))
                })?;
            self.put(id.clone(), object);
            ids.push(id);
        }
        Ok(ids)
    }
}

#[derive(Debug)]
pub struct JsonDocumentPlugin {
    index_type: String,
    store: Arc<JsonObjectStore>,
    id_field: String,
    default_field: String,
    config: IndexConfig,
    analyzer: Arc<dyn Analyzer>,
}

impl JsonDocumentPlugin {
    pub fn new(index_type: impl Into<String>, store: Arc<JsonObjectStore>) -> Self {
        Self {
            index_type: index_type.into(),
            store,
            id_field: "id".to_string(),
            default_field: "Gtext".to_string(),
            config: IndexConfig::default(),
            analyzer: Arc::new(SimpleAnalyzer::new()),
        }
    }

    pub fn with_id_field(mut self, id_field: impl Into<String>) -> Self {
        self.id_field = id_field.into();
        self
    }

    pub fn with_default_field(mut self, default_field: impl Into<String>) -> Self {
        self.default_field = default_field.into();
        self
    }

    pub fn with_index_config(mut self, config: IndexConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_analyzer(mut self, analyzer: Arc<dyn Analyzer>) -> Self {
        self.analyzer = analyzer;
        self
    }

    pub fn store(&self) -> &Arc<JsonObjectStore> {
        &self.store
    }

    /// Build the document for `object`.
    pub fn document_for(&self, object: &Value) -> Result<Document> {
        let Value::Object(fields) = object else {
            return Err(PhalanxError::object_resolution(format!(
                "[{}] expects JSON objects, got {object}",
                self.index_type
            )));
        };
        let id = self.id_for_object(object).ok_or_else(|| {
            PhalanxError::object_resolution(format!(
                "[{}] object has no \"{}\"",
                self.index_type, self.id_field
            ))
        })?;

        let mut doc = Document::new().with_keyword(&self.id_field, id.as_str());
        let mut catch_all = Vec::new();
        for (name, value) in fields {
            if *name == self.id_field {
                continue;
            }
            match value {
                Value::Array(values) => {
                    for value in values {
                        add_value(&mut doc, name, value, &mut catch_all);
                    }
                }
                value => add_value(&mut doc, name, value, &mut catch_all),
            }
        }
        if !catch_all.is_empty() && !fields.contains_key(&self.default_field) {
            doc.add(&self.default_field, catch_all.join(" "), FieldKind::Text);
        }
        Ok(doc)
    }
}

fn add_value(doc: &mut Document, name: &str, value: &Value, catch_all: &mut Vec<String>) {
    match value {
        Value::Null => {}
        Value::String(text) => {
            doc.add(name, text.as_str(), FieldKind::Text);
            catch_all.push(text.clone());
        }
        Value::Number(n) => doc.add(name, n.to_string(), FieldKind::Keyword),
        Value::Bool(b) => doc.add(name, b.to_string(), FieldKind::Keyword),
        nested => doc.add(name, nested.to_string(), FieldKind::Stored),
    }
}

impl IndexPlugin for JsonDocumentPlugin {
    fn index_type(&self) -> &str {
        &self.index_type
    }

    fn init(&self, _events: &Arc<IndexEventBus>) -> Result<IndexConfig> {
        log::debug!(
            "JSON plugin for [{}] holds {} objects",
            self.index_type,
            self.store.len()
        );
        Ok(self.config)
    }

    fn analyzer(&self) -> Option<Arc<dyn Analyzer>> {
        Some(Arc::clone(&self.analyzer))
    }

    fn reindex(&self, ctx: &ReindexContext<'_>) -> Result<IndexResults> {
        let mut results = IndexResults::default();
        ctx.with_batch_writer(&mut |writer: &mut dyn IndexWriter| {
            for (id, object) in self.store.entries() {
                results.num_processed += 1;
                match self.index_object(&object, writer) {
                    Ok(()) => results.num_indexed += 1,
                    Err(e) if e.is_object_resolution() => {
                        results.errors.insert(id.to_string(), e.to_string());
                    }
                    Err(e) => return Err(e),
                }
            }
            Ok(())
        })?;
        results.finished = true;
        log::info!(
            "Reindexed [{}]: {} of {} objects indexed",
            ctx.index_type(),
            results.num_indexed,
            results.num_processed
        );
        Ok(results)
    }

    fn index(&self, id: &ObjectId, writer: &mut dyn IndexWriter) -> Result<()> {
        let object = self.store.get(id).ok_or_else(|| {
            PhalanxError::object_resolution(format!("[{}] object {id} not found", self.index_type))
        })?;
        self.index_object(&object, writer)
    }

    fn index_object(&self, object: &Value, writer: &mut dyn IndexWriter) -> Result<()> {
        writer.add_document(self.document_for(object)?)
    }

    fn id_for_object(&self, object: &Value) -> Option<ObjectId> {
        object.get(&self.id_field).and_then(ObjectId::from_json)
    }

    fn build(&self, doc: &Document) -> Result<SearchMatch> {
        let mut fields = BTreeMap::new();
        for name in doc.field_names() {
            if name == self.id_field || name == self.default_field {
                continue;
            }
            fields.insert(name.to_string(), doc.values(name));
        }
        Ok(SearchMatch {
            id: doc.get(&self.id_field).map(ObjectId::from),
            score: 0.0,
            fields,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn plugin() -> JsonDocumentPlugin {
        JsonDocumentPlugin::new("notes", Arc::new(JsonObjectStore::new()))
    }

    #[test]
    fn test_document_for_object() {
        let doc = plugin()
            .document_for(&json!({
                "id": 7,
                "title": "Hello World",
                "tags": ["a", "b"],
                "rank": 3,
                "meta": {"k": "v"}
            }))
            .unwrap();

        assert_eq!(doc.get("id"), Some("7"));
        assert_eq!(doc.values("tags"), vec!["a", "b"]);
        assert_eq!(doc.get("rank"), Some("3"));
        assert_eq!(doc.get("meta"), Some(r#"{"k":"v"}"#));
        let catch_all = doc.get("Gtext").unwrap();
        assert!(catch_all.contains("Hello World"));
        assert!(catch_all.contains('a'));
    }

    #[test]
    fn test_missing_id_is_resolution_error() {
        let err = plugin().document_for(&json!({"title": "x"})).unwrap_err();
        assert!(err.is_object_resolution());
        let err = plugin().document_for(&json!("scalar")).unwrap_err();
        assert!(err.is_object_resolution());
    }

    #[test]
    fn test_build_skips_id_and_catch_all() {
        let plugin = plugin();
        let doc = plugin
            .document_for(&json!({"id": "n1", "title": "alpha"}))
            .unwrap();
        let found = plugin.build(&doc).unwrap();
        assert_eq!(found.id, Some(ObjectId::from("n1")));
        assert_eq!(found.fields.len(), 1);
        assert_eq!(found.fields["title"], vec!["alpha"]);
    }

    #[test]
    fn test_load_lines() {
        let store = JsonObjectStore::new();
        let input = "{\"id\": 1, \"t\": \"a\"}\n\n{\"id\": \"x\", \"t\": \"b\"}\n";
        let ids = store.load_lines(input.as_bytes(), "id").unwrap();
        assert_eq!(ids, vec![ObjectId::from(1u64), ObjectId::from("x")]);
        assert_eq!(store.len(), 2);

        assert!(store.load_lines("{\"t\": 1}".as_bytes(), "id").is_err());
    }
}
