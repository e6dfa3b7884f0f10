//! Command line argument parsing for the phalanx CLI using clap.

use clap::{Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Phalanx - maintain and query on-disk search indexes
#[derive(Parser, Debug, Clone)]
#[command(name = "phalanx")]
#[command(about = "Maintain and query independently updatable search indexes")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(long_about = None)]
pub struct PhalanxArgs {
    /// Verbosity level (0=quiet, 1=normal, 2=verbose, 3=debug)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Quiet mode (overrides verbose)
    #[arg(short, long)]
    pub quiet: bool,

    /// Directory holding one sub-directory per index
    #[arg(short, long, value_name = "DIR", env = "PHALANX_BASE_DIR", default_value = "indexes")]
    pub base_dir: PathBuf,

    /// Service configuration file (JSON); --base-dir overrides its base directory
    #[arg(short, long, value_name = "CONFIG_FILE")]
    pub config: Option<PathBuf>,

    /// Output format
    #[arg(short = 'f', long = "format", default_value = "json")]
    pub output_format: OutputFormat,

    /// Pretty-print JSON output
    #[arg(long)]
    pub pretty: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

impl PhalanxArgs {
    /// Get the effective verbosity level
    pub fn verbosity(&self) -> u8 {
        if self.quiet {
            0
        } else {
            match self.verbose {
                0 => 1,
                n => n,
            }
        }
    }
}

/// Available CLI commands
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Index JSON objects, one per line
    Index(IndexArgs),

    /// Search an index
    Search(SearchArgs),

    /// Delete documents by id
    Delete(DeleteArgs),

    /// List the distinct terms of a field
    Terms(TermsArgs),

    /// Show the state of every index under the base directory
    Status,
}

/// Arguments for indexing objects
#[derive(Parser, Debug, Clone)]
pub struct IndexArgs {
    /// Index type
    #[arg(short = 't', long = "type", value_name = "TYPE")]
    pub index_type: String,

    /// JSON lines file with one object per line
    #[arg(value_name = "FILE")]
    pub file: PathBuf,

    /// Field holding each object's id
    #[arg(long, default_value = "id")]
    pub id_field: String,
}

/// Arguments for searching
#[derive(Parser, Debug, Clone)]
pub struct SearchArgs {
    /// Index type
    #[arg(short = 't', long = "type", value_name = "TYPE")]
    pub index_type: String,

    /// Query string
    #[arg(value_name = "QUERY")]
    pub query: String,

    /// Maximum number of results (0 for no limit)
    #[arg(short, long, default_value = "0")]
    pub max: usize,

    /// Results per page (0 to disable paging)
    #[arg(long, default_value = "10")]
    pub page_size: usize,

    /// Page number, starting at 1
    #[arg(short, long, default_value = "1")]
    pub page: usize,
}

/// Arguments for deleting documents
#[derive(Parser, Debug, Clone)]
pub struct DeleteArgs {
    /// Index type
    #[arg(short = 't', long = "type", value_name = "TYPE")]
    pub index_type: String,

    /// Ids of the documents to delete
    #[arg(value_name = "ID", required = true)]
    pub ids: Vec<String>,
}

/// Arguments for listing terms
#[derive(Parser, Debug, Clone)]
pub struct TermsArgs {
    /// Index type
    #[arg(short = 't', long = "type", value_name = "TYPE")]
    pub index_type: String,

    /// Field name
    #[arg(long, value_name = "FIELD")]
    pub field: String,
}

/// Output format options
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutputFormat {
    /// Human-readable output
    Human,
    /// JSON output
    Json,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_search_command() {
        let args = PhalanxArgs::try_parse_from([
            "phalanx",
            "--base-dir",
            "/data/indexes",
            "search",
            "--type",
            "notes",
            "title:rust",
            "--page-size",
            "20",
            "--page",
            "3",
        ])
        .unwrap();

        assert_eq!(args.base_dir, PathBuf::from("/data/indexes"));
        if let Command::Search(search_args) = args.command {
            assert_eq!(search_args.index_type, "notes");
            assert_eq!(search_args.query, "title:rust");
            assert_eq!(search_args.max, 0);
            assert_eq!(search_args.page_size, 20);
            assert_eq!(search_args.page, 3);
        } else {
            panic!("Expected Search command");
        }
    }

    #[test]
    fn test_delete_requires_ids() {
        assert!(PhalanxArgs::try_parse_from(["phalanx", "delete", "--type", "notes"]).is_err());

        let args =
            PhalanxArgs::try_parse_from(["phalanx", "delete", "-t", "notes", "1", "2"]).unwrap();
        if let Command::Delete(delete_args) = args.command {
            assert_eq!(delete_args.ids, vec!["1", "2"]);
        } else {
            panic!("Expected Delete command");
        }
    }

    #[test]
    fn test_verbosity_levels() {
        let args = PhalanxArgs::try_parse_from(["phalanx", "status"]).unwrap();
        assert_eq!(args.verbosity(), 1);

        let args = PhalanxArgs::try_parse_from(["phalanx", "-vv", "status"]).unwrap();
        assert_eq!(args.verbosity(), 2);

        let args = PhalanxArgs::try_parse_from(["phalanx", "--quiet", "-v", "status"]).unwrap();
        assert_eq!(args.verbosity(), 0);
    }

    #[test]
    fn test_output_format() {
        let args =
            PhalanxArgs::try_parse_from(["phalanx", "--format", "human", "status"]).unwrap();
        assert_eq!(args.output_format, OutputFormat::Human);
    }
}
