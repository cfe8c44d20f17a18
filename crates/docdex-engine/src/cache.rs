//! Persisted cache manifest for incremental builds.
//!
//! The manifest maps relative file paths to their last-known content
//! fingerprint, modification time, and previously computed symbol records.
//! It is read once at the start of a build and replaced wholesale at the
//! end - never patched in place.

use crate::diff::hash_bytes;
use crate::EngineError;
use docdex_core::SymbolRecord;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::debug;

/// Cache format version. Any mismatch invalidates the whole manifest.
pub const CACHE_VERSION: u32 = 1;

/// Last-known state of one source file.
///
/// Invariant: `fingerprint` is always the hash of the exact bytes that
/// produced `symbols`; the two are never stored independently.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileEntry {
    /// Content fingerprint (sha256, lowercase hex)
    pub fingerprint: String,
    /// Symbol records derived from that content
    pub symbols: Vec<SymbolRecord>,
    /// Last observed modification time in milliseconds, if known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mtime_ms: Option<u64>,
}

/// The persisted cache manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheManifest {
    /// Cache format version
    pub cache_version: u32,
    /// Index schema version the entries were produced for
    pub index_version: String,
    /// Fingerprint of the project configuration file
    pub config_fingerprint: String,
    /// Sorted names of the plugins active when the manifest was written
    pub plugins: Vec<String>,
    /// Relative file path -> last-known state
    pub files: BTreeMap<String, FileEntry>,
}

impl CacheManifest {
    /// Create an empty manifest for the current engine versions.
    pub fn new(index_version: &str, config_fingerprint: String, mut plugins: Vec<String>) -> Self {
        plugins.sort();
        Self {
            cache_version: CACHE_VERSION,
            index_version: index_version.to_string(),
            config_fingerprint,
            plugins,
            files: BTreeMap::new(),
        }
    }
}

/// Loads and writes cache manifests.
///
/// Single writer process assumed; no locking.
pub struct CacheStore;

impl CacheStore {
    /// Load a manifest, validating it against the expected versions,
    /// plugin set, and configuration fingerprint.
    ///
    /// Checks run cheapest-first and short-circuit: a missing or malformed
    /// file, a version mismatch, a different plugin set, or a changed
    /// configuration each invalidate the entire manifest. Invalidation is
    /// a soft failure - the caller gets `None` and performs a full build.
    pub async fn load(
        path: &Path,
        expected_cache_version: u32,
        expected_index_version: &str,
        expected_plugins: &[String],
        config_fingerprint: &str,
    ) -> Option<CacheManifest> {
        let content = match tokio::fs::read(path).await {
            Ok(c) => c,
            Err(e) => {
                debug!(path = ?path, error = %e, "No cache manifest");
                return None;
            }
        };

        // Type-level envelope validation only; entry data is engine-authored
        // and trusted as written.
        let manifest: CacheManifest = match serde_json::from_slice(&content) {
            Ok(m) => m,
            Err(e) => {
                debug!(path = ?path, error = %e, "Cache manifest malformed, ignoring");
                return None;
            }
        };

        if manifest.cache_version != expected_cache_version {
            debug!(
                found = manifest.cache_version,
                expected = expected_cache_version,
                "Cache format version mismatch, ignoring"
            );
            return None;
        }

        if manifest.index_version != expected_index_version {
            debug!(
                found = %manifest.index_version,
                expected = %expected_index_version,
                "Index schema version mismatch, ignoring"
            );
            return None;
        }

        let mut expected = expected_plugins.to_vec();
        expected.sort();
        if manifest.plugins != expected {
            debug!(
                found = ?manifest.plugins,
                expected = ?expected,
                "Plugin set changed, ignoring cache"
            );
            return None;
        }

        if manifest.config_fingerprint != config_fingerprint {
            debug!("Project configuration changed, ignoring cache");
            return None;
        }

        debug!(path = ?path, entries = manifest.files.len(), "Loaded cache manifest");

        Some(manifest)
    }

    /// Persist a manifest, creating parent directories as needed.
    pub async fn write(path: &Path, manifest: &CacheManifest) -> Result<(), EngineError> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let json = serde_json::to_vec(manifest)?;

        // Atomic write: write to temp file, then rename
        let temp_path = path.with_extension("json.tmp");
        tokio::fs::write(&temp_path, &json).await?;
        tokio::fs::rename(&temp_path, path).await?;

        debug!(path = ?path, entries = manifest.files.len(), size = json.len(), "Wrote cache manifest");

        Ok(())
    }
}

/// Fingerprint the live project configuration file.
pub async fn config_fingerprint(config_path: &Path) -> Result<String, EngineError> {
    let bytes = tokio::fs::read(config_path)
        .await
        .map_err(|e| EngineError::Config {
            path: config_path.to_path_buf(),
            message: e.to_string(),
        })?;
    Ok(hash_bytes(&bytes))
}
