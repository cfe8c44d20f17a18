//! Engine error types.

use docdex_core::CoreError;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur during build engine operations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// I/O error during file operations
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Project configuration could not be read or parsed
    #[error("Configuration error in {path}: {message}")]
    Config { path: PathBuf, message: String },

    /// A plugin failed validation, initialization, or extraction
    #[error("Plugin '{name}': {message}")]
    Plugin { name: String, message: String },

    /// The symbol extractor failed on a file
    #[error("Extraction failed for {path}: {message}")]
    Extract { path: String, message: String },

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// File watcher error
    #[error("Watcher error: {0}")]
    Watcher(String),

    /// Invalid exclusion pattern
    #[error("Invalid exclude pattern '{pattern}': {message}")]
    Pattern { pattern: String, message: String },

    /// No snapshot artifact exists yet
    #[error("Snapshot not found: {0}")]
    SnapshotMissing(PathBuf),

    /// The snapshot artifact exists but is not valid JSON
    #[error("Snapshot {path} is malformed: {message}")]
    SnapshotMalformed { path: PathBuf, message: String },

    /// The snapshot artifact was written by an incompatible engine version
    #[error("Snapshot schema mismatch: found version '{found}'")]
    SnapshotVersionMismatch { found: String },
}

impl From<serde_json::Error> for EngineError {
    fn from(e: serde_json::Error) -> Self {
        EngineError::Serialization(e.to_string())
    }
}

impl From<CoreError> for EngineError {
    fn from(e: CoreError) -> Self {
        match e {
            CoreError::Config { path, message } => EngineError::Config { path, message },
            CoreError::Io(e) => EngineError::Io(e),
            CoreError::InvalidPath(p) => EngineError::Config {
                path: PathBuf::from(p),
                message: "invalid project path".to_string(),
            },
        }
    }
}
