//! In-memory index engine.
//!
//! Every directory keeps its committed documents in a shared slot table.
//! Readers take a point-in-time snapshot and build their own term index from
//! it, so a reader never observes writes made after it was opened. Only one
//! writer may be open per directory at a time.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::engine::analyzer::Analyzer;
use crate::engine::document::{Document, FieldKind};
use crate::engine::file;
use crate::engine::{
    DirectoryRef, IndexDirectory, IndexEngine, IndexReader, IndexWriter, Posting, ReaderMode,
    ReaderRef, WriterSettings,
};
use crate::error::{EngineErrorKind, PhalanxError, Result};

/// A stored document together with the terms it was indexed under.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexedEntry {
    pub document: Document,
    /// `(field, term)` pairs, one per occurrence.
    pub terms: Vec<(String, String)>,
}

impl IndexedEntry {
    fn analyze(document: Document, analyzer: &dyn Analyzer) -> Self {
        let mut terms = Vec::new();
        for field in document.fields() {
            match field.kind {
                FieldKind::Text => {
                    for term in analyzer.analyze(&field.value) {
                        terms.push((field.name.clone(), term));
                    }
                }
                FieldKind::Keyword => terms.push((field.name.clone(), field.value.clone())),
                FieldKind::Stored => {}
            }
        }
        Self { document, terms }
    }

    fn contains(&self, field: &str, term: &str) -> bool {
        self.terms.iter().any(|(f, t)| f == field && t == term)
    }
}

#[derive(Debug, Default)]
struct DirectoryState {
    slots: Vec<Option<Arc<IndexedEntry>>>,
    exists: bool,
}

/// Inspection counters for a directory.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirectoryStats {
    pub num_docs: usize,
    pub readers_opened: usize,
    pub readers_closed: usize,
    pub writers_opened: usize,
    pub optimizations: usize,
    pub writer_open: bool,
    pub last_writer_settings: Option<WriterSettings>,
}

#[derive(Debug, Default)]
struct Counters {
    readers_opened: AtomicUsize,
    readers_closed: AtomicUsize,
    writers_opened: AtomicUsize,
    optimizations: AtomicUsize,
}

#[derive(Debug)]
struct DirectoryShared {
    state: RwLock<DirectoryState>,
    writer_open: AtomicBool,
    counters: Counters,
    last_writer_settings: Mutex<Option<WriterSettings>>,
    persist_to: Option<PathBuf>,
}

impl DirectoryShared {
    fn persist(&self, state: &DirectoryState) -> Result<()> {
        match &self.persist_to {
            Some(path) => file::save_slots(path, &state.slots),
            None => Ok(()),
        }
    }

    fn append(&self, entries: Vec<IndexedEntry>) -> Result<()> {
        let mut state = self.state.write();
        state.slots.extend(entries.into_iter().map(|e| Some(Arc::new(e))));
        state.exists = true;
        self.persist(&state)
    }

    fn clear(&self) -> Result<()> {
        let mut state = self.state.write();
        state.slots.clear();
        state.exists = true;
        self.persist(&state)
    }

    fn delete_term(&self, field: &str, term: &str) -> Result<usize> {
        let mut state = self.state.write();
        let mut deleted = 0;
        for slot in state.slots.iter_mut() {
            if slot.as_ref().is_some_and(|e| e.contains(field, term)) {
                *slot = None;
                deleted += 1;
            }
        }
        if deleted > 0 {
            self.persist(&state)?;
        }
        Ok(deleted)
    }

    fn compact(&self) -> Result<()> {
        let mut state = self.state.write();
        state.slots.retain(Option::is_some);
        self.counters.optimizations.fetch_add(1, Ordering::SeqCst);
        self.persist(&state)
    }
}

/// A directory of the in-memory engine.
#[derive(Debug, Clone)]
pub struct MemoryDirectory {
    location: PathBuf,
    shared: Arc<DirectoryShared>,
}

impl MemoryDirectory {
    /// Create an empty, non-persistent directory.
    pub fn new(location: impl Into<PathBuf>) -> Self {
        Self::with_state(location.into(), DirectoryState::default(), None)
    }

    /// Open a directory whose committed state is persisted to `persist_to`.
    pub(crate) fn persistent(location: PathBuf, persist_to: PathBuf) -> Result<Self> {
        let state = match file::load_slots(&persist_to)? {
            Some(slots) => DirectoryState {
                slots: slots.into_iter().map(|s| s.map(Arc::new)).collect(),
                exists: true,
            },
            None => DirectoryState::default(),
        };
        Ok(Self::with_state(location, state, Some(persist_to)))
    }

    fn with_state(location: PathBuf, state: DirectoryState, persist_to: Option<PathBuf>) -> Self {
        Self {
            location,
            shared: Arc::new(DirectoryShared {
                state: RwLock::new(state),
                writer_open: AtomicBool::new(false),
                counters: Counters::default(),
                last_writer_settings: Mutex::new(None),
                persist_to,
            }),
        }
    }

    pub fn stats(&self) -> DirectoryStats {
        let counters = &self.shared.counters;
        DirectoryStats {
            num_docs: self
                .shared
                .state
                .read()
                .slots
                .iter()
                .filter(|s| s.is_some())
                .count(),
            readers_opened: counters.readers_opened.load(Ordering::SeqCst),
            readers_closed: counters.readers_closed.load(Ordering::SeqCst),
            writers_opened: counters.writers_opened.load(Ordering::SeqCst),
            optimizations: counters.optimizations.load(Ordering::SeqCst),
            writer_open: self.shared.writer_open.load(Ordering::SeqCst),
            last_writer_settings: *self.shared.last_writer_settings.lock(),
        }
    }

    /// Live stored documents, in slot order.
    pub fn documents(&self) -> Vec<Document> {
        self.shared
            .state
            .read()
            .slots
            .iter()
            .flatten()
            .map(|e| e.document.clone())
            .collect()
    }
}

impl IndexDirectory for MemoryDirectory {
    fn location(&self) -> &Path {
        &self.location
    }

    fn index_exists(&self) -> Result<bool> {
        Ok(self.shared.state.read().exists)
    }

    fn open_reader(&self, mode: ReaderMode) -> Result<ReaderRef> {
        let slots = self.shared.state.read().slots.clone();
        self.shared
            .counters
            .readers_opened
            .fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(MemoryReader::new(
            mode,
            slots,
            Arc::clone(&self.shared),
        )))
    }

    fn new_writer(
        &self,
        analyzer: Arc<dyn Analyzer>,
        create: bool,
    ) -> Result<Box<dyn IndexWriter>> {
        if self
            .shared
            .writer_open
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(PhalanxError::engine(
                EngineErrorKind::LockObtainFailed,
                format!("write lock held on {}", self.location.display()),
            ));
        }
        if create && let Err(e) = self.shared.clear() {
            self.shared.writer_open.store(false, Ordering::SeqCst);
            return Err(e);
        }
        self.shared
            .counters
            .writers_opened
            .fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MemoryWriter {
            id: Uuid::new_v4(),
            shared: Arc::clone(&self.shared),
            analyzer,
            settings: WriterSettings::default(),
            pending: Vec::new(),
            closed: false,
        }))
    }
}

/// Point-in-time reader.
#[derive(Debug)]
pub struct MemoryReader {
    id: Uuid,
    mode: ReaderMode,
    slots: Vec<Option<Arc<IndexedEntry>>>,
    postings: HashMap<String, BTreeMap<String, Vec<Posting>>>,
    deleted: Mutex<HashSet<u32>>,
    deletions: AtomicUsize,
    closed: AtomicBool,
    shared: Arc<DirectoryShared>,
}

impl MemoryReader {
    fn new(
        mode: ReaderMode,
        slots: Vec<Option<Arc<IndexedEntry>>>,
        shared: Arc<DirectoryShared>,
    ) -> Self {
        let mut postings: HashMap<String, BTreeMap<String, Vec<Posting>>> = HashMap::new();
        for (doc_id, entry) in slots.iter().enumerate() {
            let Some(entry) = entry else { continue };
            let mut freqs: BTreeMap<(&str, &str), u32> = BTreeMap::new();
            for (field, term) in &entry.terms {
                *freqs.entry((field.as_str(), term.as_str())).or_default() += 1;
            }
            for ((field, term), freq) in freqs {
                postings
                    .entry(field.to_string())
                    .or_default()
                    .entry(term.to_string())
                    .or_default()
                    .push(Posting {
                        doc_id: doc_id as u32,
                        freq,
                    });
            }
        }

        Self {
            id: Uuid::new_v4(),
            mode,
            slots,
            postings,
            deleted: Mutex::new(HashSet::new()),
            deletions: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
            shared,
        }
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            Err(PhalanxError::already_closed(format!(
                "reader {} is closed",
                self.id
            )))
        } else {
            Ok(())
        }
    }

    fn live_postings(&self, field: &str, term: &str) -> Vec<Posting> {
        let deleted = self.deleted.lock();
        self.postings
            .get(field)
            .and_then(|terms| terms.get(term))
            .map(|list| {
                list.iter()
                    .filter(|p| !deleted.contains(&p.doc_id))
                    .copied()
                    .collect()
            })
            .unwrap_or_default()
    }
}

impl IndexReader for MemoryReader {
    fn id(&self) -> Uuid {
        self.id
    }

    fn num_docs(&self) -> usize {
        let deleted = self.deleted.lock().len();
        self.slots.iter().filter(|s| s.is_some()).count() - deleted
    }

    fn max_doc(&self) -> u32 {
        self.slots.len() as u32
    }

    fn is_deleted(&self, doc_id: u32) -> bool {
        match self.slots.get(doc_id as usize) {
            Some(Some(_)) => self.deleted.lock().contains(&doc_id),
            _ => true,
        }
    }

    fn document(&self, doc_id: u32) -> Result<Option<Arc<Document>>> {
        self.ensure_open()?;
        if self.is_deleted(doc_id) {
            return Ok(None);
        }
        Ok(self.slots[doc_id as usize]
            .as_ref()
            .map(|e| Arc::new(e.document.clone())))
    }

    fn doc_freq(&self, field: &str, term: &str) -> Result<usize> {
        self.ensure_open()?;
        Ok(self.live_postings(field, term).len())
    }

    fn postings(&self, field: &str, term: &str) -> Result<Vec<Posting>> {
        self.ensure_open()?;
        Ok(self.live_postings(field, term))
    }

    fn terms(&self, field: &str) -> Result<Vec<String>> {
        self.ensure_open()?;
        let deleted = self.deleted.lock();
        Ok(self
            .postings
            .get(field)
            .map(|terms| {
                terms
                    .iter()
                    .filter(|(_, list)| list.iter().any(|p| !deleted.contains(&p.doc_id)))
                    .map(|(term, _)| term.clone())
                    .collect()
            })
            .unwrap_or_default())
    }

    fn delete_documents(&self, field: &str, term: &str) -> Result<usize> {
        self.ensure_open()?;
        if self.mode == ReaderMode::ReadOnly {
            return Err(PhalanxError::unsupported(format!(
                "delete of {field}:{term} on read-only reader {}",
                self.id
            )));
        }

        let matched = self.live_postings(field, term);
        if matched.is_empty() {
            return Ok(0);
        }
        self.shared.delete_term(field, term)?;
        let mut deleted = self.deleted.lock();
        deleted.extend(matched.iter().map(|p| p.doc_id));
        self.deletions.fetch_add(matched.len(), Ordering::SeqCst);
        Ok(matched.len())
    }

    fn deletions(&self) -> usize {
        self.deletions.load(Ordering::SeqCst)
    }

    fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Err(PhalanxError::already_closed(format!(
                "reader {} already closed",
                self.id
            )));
        }
        self.shared
            .counters
            .readers_closed
            .fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// Exclusive writer; holds the directory write lock until closed or dropped.
#[derive(Debug)]
pub struct MemoryWriter {
    id: Uuid,
    shared: Arc<DirectoryShared>,
    analyzer: Arc<dyn Analyzer>,
    settings: WriterSettings,
    pending: Vec<IndexedEntry>,
    closed: bool,
}

impl MemoryWriter {
    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            Err(PhalanxError::already_closed(format!(
                "writer {} is closed",
                self.id
            )))
        } else {
            Ok(())
        }
    }

    fn flush(&mut self) -> Result<()> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let entries = std::mem::take(&mut self.pending);
        self.shared.append(entries)
    }
}

impl IndexWriter for MemoryWriter {
    fn settings(&self) -> WriterSettings {
        self.settings
    }

    fn apply_settings(&mut self, settings: WriterSettings) {
        self.settings = settings;
    }

    fn add_document(&mut self, doc: Document) -> Result<()> {
        self.ensure_open()?;
        self.pending
            .push(IndexedEntry::analyze(doc, self.analyzer.as_ref()));
        if self.pending.len() >= self.settings.max_buffered_docs.max(1) as usize {
            self.flush()?;
        }
        Ok(())
    }

    fn pending_docs(&self) -> usize {
        self.pending.len()
    }

    fn optimize(&mut self) -> Result<()> {
        self.ensure_open()?;
        self.flush()?;
        self.shared.compact()
    }

    fn close(&mut self) -> Result<()> {
        self.ensure_open()?;
        let flushed = self.flush();
        self.closed = true;
        *self.shared.last_writer_settings.lock() = Some(self.settings);
        self.shared.writer_open.store(false, Ordering::SeqCst);
        flushed
    }

    fn is_closed(&self) -> bool {
        self.closed
    }
}

impl Drop for MemoryWriter {
    fn drop(&mut self) {
        if !self.closed {
            log::warn!(
                "Writer {} dropped without close, discarding {} pending documents",
                self.id,
                self.pending.len()
            );
            self.shared.writer_open.store(false, Ordering::SeqCst);
        }
    }
}

/// In-process engine. Opening the same path twice yields the same directory.
#[derive(Debug, Default)]
pub struct MemoryEngine {
    directories: Mutex<HashMap<PathBuf, MemoryDirectory>>,
}

impl MemoryEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// The concrete directory previously opened at `path`.
    pub fn directory(&self, path: &Path) -> Option<MemoryDirectory> {
        self.directories.lock().get(path).cloned()
    }
}

impl IndexEngine for MemoryEngine {
    fn name(&self) -> &str {
        "memory"
    }

    fn open_directory(&self, path: &Path) -> Result<DirectoryRef> {
        let mut directories = self.directories.lock();
        let dir = directories
            .entry(path.to_path_buf())
            .or_insert_with(|| MemoryDirectory::new(path));
        Ok(Arc::new(dir.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::analyzer::SimpleAnalyzer;

    fn doc(id: &str, body: &str) -> Document {
        Document::new().with_keyword("id", id).with_text("body", body)
    }

    fn populated() -> MemoryDirectory {
        let dir = MemoryDirectory::new("/mem");
        let mut writer = dir.new_writer(Arc::new(SimpleAnalyzer::new()), true).unwrap();
        writer.add_document(doc("1", "alpha beta")).unwrap();
        writer.add_document(doc("2", "beta gamma")).unwrap();
        writer.close().unwrap();
        dir
    }

    #[test]
    fn test_index_exists_after_first_writer() {
        let dir = MemoryDirectory::new("/mem");
        assert!(!dir.index_exists().unwrap());
        let mut writer = dir.new_writer(Arc::new(SimpleAnalyzer::new()), true).unwrap();
        writer.close().unwrap();
        assert!(dir.index_exists().unwrap());
    }

    #[test]
    fn test_single_writer_per_directory() {
        let dir = populated();
        let analyzer: Arc<dyn Analyzer> = Arc::new(SimpleAnalyzer::new());
        let mut first = dir.new_writer(analyzer.clone(), false).unwrap();
        let err = dir.new_writer(analyzer.clone(), false).unwrap_err();
        assert_eq!(err.engine_kind(), Some(EngineErrorKind::LockObtainFailed));
        first.close().unwrap();
        assert!(dir.new_writer(analyzer, false).is_ok());
    }

    #[test]
    fn test_reader_is_point_in_time() {
        let dir = populated();
        let reader = dir.open_reader(ReaderMode::ReadOnly).unwrap();
        let mut writer = dir.new_writer(Arc::new(SimpleAnalyzer::new()), false).unwrap();
        writer.add_document(doc("3", "delta")).unwrap();
        writer.close().unwrap();

        assert_eq!(reader.num_docs(), 2);
        assert_eq!(dir.open_reader(ReaderMode::ReadOnly).unwrap().num_docs(), 3);
    }

    #[test]
    fn test_read_write_reader_deletes() {
        let dir = populated();
        let readonly = dir.open_reader(ReaderMode::ReadOnly).unwrap();
        assert!(matches!(
            readonly.delete_documents("id", "1"),
            Err(PhalanxError::UnsupportedOperation(_))
        ));

        let reader = dir.open_reader(ReaderMode::ReadWrite).unwrap();
        assert_eq!(reader.doc_freq("id", "1").unwrap(), 1);
        assert_eq!(reader.delete_documents("id", "1").unwrap(), 1);
        assert_eq!(reader.doc_freq("id", "1").unwrap(), 0);
        assert_eq!(reader.deletions(), 1);
        assert_eq!(dir.stats().num_docs, 1);
        assert_eq!(reader.terms("body").unwrap(), vec!["beta", "gamma"]);
    }

    #[test]
    fn test_double_close_is_already_closed() {
        let dir = populated();
        let reader = dir.open_reader(ReaderMode::ReadOnly).unwrap();
        reader.close().unwrap();
        assert!(reader.close().unwrap_err().is_already_closed());
        assert_eq!(dir.stats().readers_closed, 1);
    }

    #[test]
    fn test_optimize_compacts_and_records_settings() {
        let dir = populated();
        let reader = dir.open_reader(ReaderMode::ReadWrite).unwrap();
        reader.delete_documents("id", "2").unwrap();
        reader.close().unwrap();

        let mut writer = dir.new_writer(Arc::new(SimpleAnalyzer::new()), false).unwrap();
        let settings = WriterSettings {
            max_buffered_docs: 500,
            merge_factor: 50,
            use_compound_file: true,
        };
        writer.apply_settings(settings);
        writer.optimize().unwrap();
        writer.close().unwrap();

        let stats = dir.stats();
        assert_eq!(stats.optimizations, 1);
        assert_eq!(stats.last_writer_settings, Some(settings));
        assert_eq!(dir.open_reader(ReaderMode::ReadOnly).unwrap().max_doc(), 1);
    }

    #[test]
    fn test_engine_reuses_directory_per_path() {
        let engine = MemoryEngine::new();
        let a = engine.open_directory(Path::new("/x")).unwrap();
        let mut writer = a.new_writer(Arc::new(SimpleAnalyzer::new()), true).unwrap();
        writer.add_document(doc("1", "one")).unwrap();
        writer.close().unwrap();

        let b = engine.open_directory(Path::new("/x")).unwrap();
        assert_eq!(b.open_reader(ReaderMode::ReadOnly).unwrap().num_docs(), 1);
        assert_eq!(engine.directory(Path::new("/x")).unwrap().stats().num_docs, 1);
    }
}
