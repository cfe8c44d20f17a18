//! Docdex Core Components
//!
//! This crate provides the shared types for the docdex engine,
//! including symbol records, project configuration, and build options.

mod config;
mod error;
mod symbol;

pub use config::{BuildOptions, ProjectConfig, DEFAULT_CONFIG_NAME, DEFAULT_OUT_DIR};
pub use error::CoreError;
pub use symbol::{normalize_rel_path, symbol_id, SymbolKind, SymbolRecord};
