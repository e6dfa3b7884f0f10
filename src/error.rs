//! Error types for the Phalanx library.
//!
//! All errors are represented by the [`PhalanxError`] enum. Failures local to a
//! single item of a buffered batch are logged by the update queue rather than
//! surfaced here; everything that reaches a caller goes through this type.
//!
//! # Examples
//!
//! ```
//! use phalanx::error::{PhalanxError, Result};
//!
//! fn example_operation() -> Result<()> {
//!     Err(PhalanxError::config("base directory not configured"))
//! }
//!
//! match example_operation() {
//!     Ok(_) => println!("Success"),
//!     Err(e) => eprintln!("Error: {}", e),
//! }
//! ```

use std::fmt;
use std::io;
use std::sync::Arc;

use thiserror::Error;

/// Classification of failures reported by an index engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineErrorKind {
    /// The reader, writer or searcher was already closed.
    AlreadyClosed,
    /// Another writer holds the engine-level write lock on the directory.
    LockObtainFailed,
    /// Persisted index data could not be decoded.
    Corrupt,
    /// The directory holds no index yet.
    NoIndex,
}

impl fmt::Display for EngineErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            EngineErrorKind::AlreadyClosed => "already closed",
            EngineErrorKind::LockObtainFailed => "lock obtain failed",
            EngineErrorKind::Corrupt => "corrupt index",
            EngineErrorKind::NoIndex => "no index",
        };
        f.write_str(label)
    }
}

/// The main error type for Phalanx operations.
#[derive(Error, Debug)]
pub enum PhalanxError {
    /// I/O errors (directory creation, persistence, etc.)
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Bad or missing configuration (base path, analyzer, plugin config).
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Failure reported by the underlying index engine.
    #[error("Engine error ({kind}): {message}")]
    Engine {
        kind: EngineErrorKind,
        message: String,
    },

    /// An index operation failed; wraps the underlying cause.
    #[error("Exception during {operation} operation on index [{index_type}]")]
    IndexOperation {
        index_type: String,
        operation: &'static str,
        #[source]
        source: Box<PhalanxError>,
    },

    /// A search failed; wraps the underlying cause.
    #[error("Exception searching index [{index_type}]")]
    Search {
        index_type: String,
        #[source]
        source: Box<PhalanxError>,
    },

    /// Query text could not be parsed.
    #[error("Query error: {0}")]
    Query(String),

    /// A mutation was requested on a read-only reader pass.
    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    /// A domain object could not be resolved for indexing.
    #[error("Unable to resolve object: {0}")]
    ObjectResolution(String),

    /// An asynchronous callback failed; re-raised to the waiting thread.
    #[error("Callback failed: {0}")]
    Callback(#[source] Arc<PhalanxError>),

    /// No index is registered under the given type.
    #[error("Unknown index type [{0}]")]
    UnknownIndex(String),

    /// The service has been shut down.
    #[error("Service stopped: {0}")]
    ServiceStopped(String),

    /// Thread spawn or join errors
    #[error("Thread error: {0}")]
    Thread(String),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error for other cases
    #[error("Error: {0}")]
    Other(String),

    /// Errors raised by plugins and other collaborators
    #[error("Anyhow error: {0}")]
    Anyhow(#[from] anyhow::Error),
}

/// Result type alias for operations that may fail with PhalanxError.
pub type Result<T> = std::result::Result<T, PhalanxError>;

impl PhalanxError {
    /// Create a new configuration error.
    pub fn config<S: Into<String>>(msg: S) -> Self {
        PhalanxError::Configuration(msg.into())
    }

    /// Create a new engine error of the given kind.
    pub fn engine<S: Into<String>>(kind: EngineErrorKind, msg: S) -> Self {
        PhalanxError::Engine {
            kind,
            message: msg.into(),
        }
    }

    /// Create an "already closed" engine error.
    pub fn already_closed<S: Into<String>>(msg: S) -> Self {
        Self::engine(EngineErrorKind::AlreadyClosed, msg)
    }

    /// Wrap `source` as a failure of `operation` on `index_type`.
    pub fn index_operation(
        index_type: impl Into<String>,
        operation: &'static str,
        source: PhalanxError,
    ) -> Self {
        PhalanxError::IndexOperation {
            index_type: index_type.into(),
            operation,
            source: Box::new(source),
        }
    }

    /// Wrap `source` as a search failure on `index_type`.
    pub fn search(index_type: impl Into<String>, source: PhalanxError) -> Self {
        PhalanxError::Search {
            index_type: index_type.into(),
            source: Box::new(source),
        }
    }

    /// Create a new query error.
    pub fn query<S: Into<String>>(msg: S) -> Self {
        PhalanxError::Query(msg.into())
    }

    /// Create a new unsupported operation error.
    pub fn unsupported<S: Into<String>>(msg: S) -> Self {
        PhalanxError::UnsupportedOperation(msg.into())
    }

    /// Create a new object resolution error.
    pub fn object_resolution<S: Into<String>>(msg: S) -> Self {
        PhalanxError::ObjectResolution(msg.into())
    }

    /// Create a new generic error.
    pub fn other<S: Into<String>>(msg: S) -> Self {
        PhalanxError::Other(msg.into())
    }

    /// Create a new internal error.
    pub fn internal<S: Into<String>>(msg: S) -> Self {
        PhalanxError::Other(format!("Internal error: {}", msg.into()))
    }

    /// The engine error kind, looking through operation wrappers.
    pub fn engine_kind(&self) -> Option<EngineErrorKind> {
        match self {
            PhalanxError::Engine { kind, .. } => Some(*kind),
            PhalanxError::IndexOperation { source, .. } | PhalanxError::Search { source, .. } => {
                source.engine_kind()
            }
            _ => None,
        }
    }

    /// True for the benign "already closed" class of close failures.
    pub fn is_already_closed(&self) -> bool {
        self.engine_kind() == Some(EngineErrorKind::AlreadyClosed)
    }

    /// True if this error, or the error it wraps, is an object resolution failure.
    pub fn is_object_resolution(&self) -> bool {
        match self {
            PhalanxError::ObjectResolution(_) => true,
            PhalanxError::IndexOperation { source, .. } => source.is_object_resolution(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_construction() {
        let error = PhalanxError::config("Test config error");
        assert_eq!(error.to_string(), "Configuration error: Test config error");

        let error = PhalanxError::already_closed("reader 1");
        assert_eq!(error.to_string(), "Engine error (already closed): reader 1");
    }

    #[test]
    fn test_wrapped_error_classification() {
        let error =
            PhalanxError::index_operation("notes", "IndexReader", PhalanxError::already_closed("x"));
        assert!(error.is_already_closed());
        assert_eq!(
            error.to_string(),
            "Exception during IndexReader operation on index [notes]"
        );

        let error = PhalanxError::index_operation(
            "notes",
            "IndexWriter",
            PhalanxError::object_resolution("id 7"),
        );
        assert!(error.is_object_resolution());
        assert!(!error.is_already_closed());
    }

    #[test]
    fn test_io_error_conversion() {
        let io_error = io::Error::new(io::ErrorKind::NotFound, "File not found");
        let error = PhalanxError::from(io_error);

        match error {
            PhalanxError::Io(_) => {}
            _ => panic!("Expected IO error variant"),
        }
    }
}
