//! The published index artifact.
//!
//! A snapshot is fully rebuilt and atomically replaced at the end of each
//! successful build; it is never mutated incrementally on disk.

use crate::EngineError;
use chrono::{DateTime, Utc};
use docdex_core::SymbolRecord;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

/// Index schema version. Bumped when the snapshot shape changes.
pub const INDEX_VERSION: &str = "1";

/// The externally visible index artifact for one build generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexSnapshot {
    /// Index schema version
    pub version: String,
    /// When this snapshot was generated
    pub generated_at: DateTime<Utc>,
    /// Project root the snapshot was built from
    pub project_root: String,
    /// All symbol records, sorted by stable identifier
    pub symbols: Vec<SymbolRecord>,
}

impl IndexSnapshot {
    /// Assemble a snapshot, sorting the records for deterministic output.
    pub fn new(project_root: String, mut symbols: Vec<SymbolRecord>) -> Self {
        sort_symbols(&mut symbols);
        Self {
            version: INDEX_VERSION.to_string(),
            generated_at: Utc::now(),
            project_root,
            symbols,
        }
    }

    /// Persist the snapshot, creating parent directories as needed.
    pub async fn write(&self, path: &Path) -> Result<(), EngineError> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let json = serde_json::to_vec_pretty(self)?;

        // Atomic write: write to temp file, then rename
        let temp_path = path.with_extension("json.tmp");
        tokio::fs::write(&temp_path, &json).await?;
        tokio::fs::rename(&temp_path, path).await?;

        debug!(path = ?path, symbols = self.symbols.len(), size = json.len(), "Wrote snapshot");

        Ok(())
    }

    /// Read a snapshot back, distinguishing the three failure modes a
    /// reader needs to report separately: no file yet, unparsable JSON,
    /// and a snapshot written by an incompatible engine.
    pub async fn read(path: &Path) -> Result<IndexSnapshot, EngineError> {
        let content = match tokio::fs::read(path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(EngineError::SnapshotMissing(path.to_path_buf()))
            }
            Err(e) => return Err(e.into()),
        };

        let value: serde_json::Value =
            serde_json::from_slice(&content).map_err(|e| EngineError::SnapshotMalformed {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;

        if let Some(version) = value.get("version").and_then(|v| v.as_str()) {
            if version != INDEX_VERSION {
                return Err(EngineError::SnapshotVersionMismatch {
                    found: version.to_string(),
                });
            }
        }

        serde_json::from_value(value).map_err(|e| EngineError::SnapshotMalformed {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }
}

/// Sort records by stable identifier; ties (overlapping plugin claims on
/// one file) break by line and kind so output stays deterministic.
pub fn sort_symbols(symbols: &mut [SymbolRecord]) {
    symbols.sort_by(|a, b| {
        a.id.cmp(&b.id)
            .then(a.start_line.cmp(&b.start_line))
            .then(a.kind.cmp(&b.kind))
    });
}
