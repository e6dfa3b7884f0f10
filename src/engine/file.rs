//! File-backed index engine.
//!
//! Directories behave exactly like [`MemoryDirectory`]; in addition every
//! committed change is written to `index.json` under the directory location,
//! and that file is loaded again when the directory is opened.

use std::collections::HashMap;
use std::fs;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::engine::memory::{IndexedEntry, MemoryDirectory};
use crate::engine::{DirectoryRef, IndexEngine};
use crate::error::{EngineErrorKind, PhalanxError, Result};

/// Name of the file holding the committed documents.
pub const INDEX_FILE: &str = "index.json";

#[derive(Serialize)]
struct IndexFileRef<'a> {
    version: u32,
    slots: Vec<Option<&'a IndexedEntry>>,
}

#[derive(Deserialize)]
struct IndexFile {
    version: u32,
    slots: Vec<Option<IndexedEntry>>,
}

const FORMAT_VERSION: u32 = 1;

/// Write `slots` to `path`, replacing the previous file atomically.
pub(crate) fn save_slots(path: &Path, slots: &[Option<Arc<IndexedEntry>>]) -> Result<()> {
    let tmp = path.with_extension("json.tmp");
    {
        let file = fs::File::create(&tmp)?;
        let mut writer = BufWriter::new(file);
        let body = IndexFileRef {
            version: FORMAT_VERSION,
            slots: slots.iter().map(|s| s.as_deref()).collect(),
        };
        serde_json::to_writer(&mut writer, &body)?;
        writer.flush()?;
    }
    fs::rename(&tmp, path)?;
    Ok(())
}

/// Load previously saved slots, or `None` if no index was ever written.
pub(crate) fn load_slots(path: &Path) -> Result<Option<Vec<Option<IndexedEntry>>>> {
    if !path.exists() {
        return Ok(None);
    }
    let reader = BufReader::new(fs::File::open(path)?);
    let file: IndexFile = serde_json::from_reader(reader).map_err(|e| {
        PhalanxError::engine(
            EngineErrorKind::Corrupt,
            format!("{}: {e}", path.display()),
        )
    })?;
    if file.version != FORMAT_VERSION {
        return Err(PhalanxError::engine(
            EngineErrorKind::Corrupt,
            format!(
                "{}: unsupported format version {}",
                path.display(),
                file.version
            ),
        ));
    }
    Ok(Some(file.slots))
}

/// Engine whose directories live on the local filesystem.
#[derive(Debug, Default)]
pub struct FileEngine {
    directories: Mutex<HashMap<PathBuf, MemoryDirectory>>,
}

impl FileEngine {
    pub fn new() -> Self {
        Self::default()
    }
}

impl IndexEngine for FileEngine {
    fn name(&self) -> &str {
        "file"
    }

    fn open_directory(&self, path: &Path) -> Result<DirectoryRef> {
        let mut directories = self.directories.lock();
        if let Some(dir) = directories.get(path) {
            return Ok(Arc::new(dir.clone()));
        }

        fs::create_dir_all(path)?;
        let dir = MemoryDirectory::persistent(path.to_path_buf(), path.join(INDEX_FILE))?;
        log::debug!("Opened file index directory {}", path.display());
        directories.insert(path.to_path_buf(), dir.clone());
        Ok(Arc::new(dir))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::ReaderMode;
    use crate::engine::analyzer::SimpleAnalyzer;
    use crate::engine::document::Document;
    use tempfile::TempDir;

    #[test]
    fn test_committed_state_survives_reopen() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("notes");

        {
            let engine = FileEngine::new();
            let dir = engine.open_directory(&path).unwrap();
            assert!(!dir.index_exists().unwrap());
            let mut writer = dir.new_writer(Arc::new(SimpleAnalyzer::new()), true).unwrap();
            writer
                .add_document(Document::new().with_keyword("id", "1").with_text("body", "kept"))
                .unwrap();
            writer
                .add_document(Document::new().with_keyword("id", "2").with_text("body", "gone"))
                .unwrap();
            writer.close().unwrap();

            let reader = dir.open_reader(ReaderMode::ReadWrite).unwrap();
            reader.delete_documents("id", "2").unwrap();
            reader.close().unwrap();
        }

        assert!(path.join(INDEX_FILE).exists());
        let engine = FileEngine::new();
        let dir = engine.open_directory(&path).unwrap();
        assert!(dir.index_exists().unwrap());
        let reader = dir.open_reader(ReaderMode::ReadOnly).unwrap();
        assert_eq!(reader.num_docs(), 1);
        assert_eq!(reader.doc_freq("body", "kept").unwrap(), 1);
    }

    #[test]
    fn test_corrupt_file_is_reported() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join(INDEX_FILE), "not json").unwrap();

        let err = FileEngine::new().open_directory(temp_dir.path()).unwrap_err();
        assert_eq!(err.engine_kind(), Some(EngineErrorKind::Corrupt));
    }
}
