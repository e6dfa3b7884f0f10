//! Command implementations for the phalanx CLI.

use std::fs::{self, File};
use std::io::BufReader;
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;

use crate::cli::args::*;
use crate::cli::output::output_result;
use crate::config::ServiceConfig;
use crate::engine::file::FileEngine;
use crate::error::{PhalanxError, Result};
use crate::plugin::IndexPlugin;
use crate::plugin::json::{JsonDocumentPlugin, JsonObjectStore};
use crate::service::IndexService;

/// Result of an index command.
#[derive(Debug, Serialize)]
pub struct IndexingSummary {
    pub index_type: String,
    pub objects_indexed: usize,
    pub duration_ms: u64,
}

/// Result of a delete command.
#[derive(Debug, Serialize)]
pub struct DeletionSummary {
    pub index_type: String,
    pub ids_deleted: Vec<String>,
}

/// Result of a terms command.
#[derive(Debug, Serialize)]
pub struct FieldTerms {
    pub index_type: String,
    pub field: String,
    pub terms: Vec<String>,
}

/// Execute a CLI command.
pub fn execute_command(args: PhalanxArgs) -> Result<()> {
    match &args.command {
        Command::Index(index_args) => index_objects(index_args, &args),
        Command::Search(search_args) => search_index(search_args, &args),
        Command::Delete(delete_args) => delete_documents(delete_args, &args),
        Command::Terms(terms_args) => list_terms(terms_args, &args),
        Command::Status => show_status(&args),
    }
}

fn service_config(args: &PhalanxArgs) -> Result<ServiceConfig> {
    let config = match &args.config {
        Some(path) => ServiceConfig::from_file(path)?,
        None => ServiceConfig::default(),
    };
    Ok(ServiceConfig {
        base_directory: args.base_dir.clone(),
        throw_on_init_failure: true,
        ..config
    })
}

fn open_service(
    args: &PhalanxArgs,
    index_types: &[String],
    store: &Arc<JsonObjectStore>,
    id_field: &str,
) -> Result<IndexService> {
    let config = service_config(args)?;
    let plugins = index_types
        .iter()
        .map(|index_type| {
            let plugin = JsonDocumentPlugin::new(index_type.as_str(), Arc::clone(store))
                .with_id_field(id_field)
                .with_default_field(config.default_field.as_str());
            Arc::new(plugin) as Arc<dyn IndexPlugin>
        })
        .collect();
    IndexService::initialize(config, Arc::new(FileEngine::new()), plugins)
}

/// Open the service for an index that must already exist on disk.
fn open_existing(args: &PhalanxArgs, index_type: &str) -> Result<IndexService> {
    if !args.base_dir.join(index_type).is_dir() {
        return Err(PhalanxError::UnknownIndex(index_type.to_string()));
    }
    let store = Arc::new(JsonObjectStore::new());
    open_service(args, &[index_type.to_string()], &store, "id")
}

fn index_objects(index_args: &IndexArgs, args: &PhalanxArgs) -> Result<()> {
    let started = Instant::now();
    let store = Arc::new(JsonObjectStore::new());
    let service = open_service(
        args,
        &[index_args.index_type.clone()],
        &store,
        &index_args.id_field,
    )?;

    let file = File::open(&index_args.file)?;
    let ids = store.load_lines(BufReader::new(file), &index_args.id_field)?;
    if args.verbosity() > 1 {
        println!(
            "Loaded {} objects from {}",
            ids.len(),
            index_args.file.display()
        );
    }
    for id in &ids {
        service.index_object_by_id(&index_args.index_type, id.clone())?;
    }
    service.finish();

    output_result(
        "Objects indexed",
        &IndexingSummary {
            index_type: index_args.index_type.clone(),
            objects_indexed: ids.len(),
            duration_ms: started.elapsed().as_millis() as u64,
        },
        args,
    )
}

fn search_index(search_args: &SearchArgs, args: &PhalanxArgs) -> Result<()> {
    let service = open_existing(args, &search_args.index_type)?;
    let page = service.search(
        &search_args.index_type,
        &search_args.query,
        search_args.max,
        search_args.page_size,
        search_args.page,
    )?;
    service.finish();
    output_result("Search results", &page, args)
}

fn delete_documents(delete_args: &DeleteArgs, args: &PhalanxArgs) -> Result<()> {
    let service = open_existing(args, &delete_args.index_type)?;
    for id in &delete_args.ids {
        service.delete_object_by_id(&delete_args.index_type, id.as_str())?;
    }
    service.finish();
    output_result(
        "Documents deleted",
        &DeletionSummary {
            index_type: delete_args.index_type.clone(),
            ids_deleted: delete_args.ids.clone(),
        },
        args,
    )
}

fn list_terms(terms_args: &TermsArgs, args: &PhalanxArgs) -> Result<()> {
    let service = open_existing(args, &terms_args.index_type)?;
    let terms = service.field_terms(&terms_args.index_type, &terms_args.field)?;
    service.finish();
    output_result(
        "Field terms",
        &FieldTerms {
            index_type: terms_args.index_type.clone(),
            field: terms_args.field.clone(),
            terms: terms.into_iter().collect(),
        },
        args,
    )
}

fn show_status(args: &PhalanxArgs) -> Result<()> {
    let mut index_types = Vec::new();
    if args.base_dir.is_dir() {
        for entry in fs::read_dir(&args.base_dir)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                index_types.push(entry.file_name().to_string_lossy().to_string());
            }
        }
    }
    index_types.sort();

    let store = Arc::new(JsonObjectStore::new());
    let service = open_service(args, &index_types, &store, "id")?;
    let status = service.status();
    service.finish();
    output_result("Index service status", &status, args)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use std::io::Write;
    use tempfile::TempDir;

    fn parse(base: &std::path::Path, rest: &[&str]) -> PhalanxArgs {
        let mut argv = vec!["phalanx", "-q", "--base-dir", base.to_str().unwrap()];
        argv.extend_from_slice(rest);
        PhalanxArgs::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_index_then_search_and_delete() {
        let dir = TempDir::new().unwrap();
        let data = dir.path().join("notes.jsonl");
        let mut file = File::create(&data).unwrap();
        writeln!(file, r#"{{"id": "1", "title": "rust threads"}}"#).unwrap();
        writeln!(file, r#"{{"id": "2", "title": "rust channels"}}"#).unwrap();
        drop(file);

        let base = dir.path().join("indexes");
        let data_arg = data.to_str().unwrap();
        execute_command(parse(&base, &["index", "--type", "notes", data_arg])).unwrap();
        execute_command(parse(&base, &["search", "--type", "notes", "rust"])).unwrap();
        execute_command(parse(&base, &["delete", "--type", "notes", "1"])).unwrap();
        execute_command(parse(&base, &["terms", "--type", "notes", "--field", "title"])).unwrap();
        execute_command(parse(&base, &["status"])).unwrap();

        let service = open_existing(&parse(&base, &["status"]), "notes").unwrap();
        let page = service.search("notes", "rust", 0, 0, 1).unwrap();
        assert_eq!(page.total_matches, 1);
        assert_eq!(page.results[0]["id"], Some(vec!["2".to_string()]));
    }

    #[test]
    fn test_search_of_missing_index_fails() {
        let dir = TempDir::new().unwrap();
        let err = execute_command(parse(dir.path(), &["search", "--type", "nope", "x"]))
            .unwrap_err();
        assert!(matches!(err, PhalanxError::UnknownIndex(_)));
    }
}
