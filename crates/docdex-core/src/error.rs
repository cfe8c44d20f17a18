//! Core error types for docdex.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur in core operations
#[derive(Debug, Error)]
pub enum CoreError {
    /// Project configuration could not be read or parsed
    #[error("Invalid project configuration {path}: {message}")]
    Config { path: PathBuf, message: String },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid project path
    #[error("Invalid project path: {0}")]
    InvalidPath(String),
}
