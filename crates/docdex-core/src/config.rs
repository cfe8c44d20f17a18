//! Project configuration and build options.

use crate::CoreError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Conventional name of the project configuration file.
pub const DEFAULT_CONFIG_NAME: &str = "docdex.json";

/// Directory (under the project root) holding the engine's output artifacts.
pub const DEFAULT_OUT_DIR: &str = ".docdex";

/// Normalized project configuration.
///
/// Loaded from a JSON file that declares which files belong to the project
/// and which patterns to exclude on top of the engine's built-in set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectConfig {
    /// Project-relative source files to index
    #[serde(default)]
    pub files: Vec<String>,

    /// Additional exclusion glob patterns
    #[serde(default)]
    pub exclude: Vec<String>,
}

impl ProjectConfig {
    /// Load configuration from a file.
    ///
    /// An unreadable or unparsable configuration is fatal - callers must not
    /// fall back to defaults, since a wrong file list would silently produce
    /// a wrong index.
    pub fn load(path: &Path) -> Result<Self, CoreError> {
        let content = std::fs::read_to_string(path).map_err(|e| CoreError::Config {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

        let config: ProjectConfig =
            serde_json::from_str(&content).map_err(|e| CoreError::Config {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;

        tracing::debug!(path = ?path, files = config.files.len(), "Loaded project configuration");

        Ok(config)
    }
}

/// Options for one build of the index.
#[derive(Debug, Clone)]
pub struct BuildOptions {
    /// Project root directory
    pub project_root: PathBuf,
    /// Path to the project configuration file
    pub config_path: PathBuf,
    /// Output directory for the snapshot and cache artifacts
    pub out_dir: PathBuf,
    /// Whether to read/write the cache manifest
    pub incremental: bool,
    /// Recreate the extraction context after this many re-extractions
    pub extract_batch: usize,
    /// Maximum concurrent hash/stat operations during diffing
    pub hash_concurrency: usize,
    /// Extra exclusion patterns on top of config + built-ins
    pub exclude: Vec<String>,
}

impl BuildOptions {
    /// Create options for a project root, with conventional defaults.
    pub fn new(project_root: impl Into<PathBuf>) -> Self {
        let project_root = project_root.into();
        Self {
            config_path: project_root.join(DEFAULT_CONFIG_NAME),
            out_dir: project_root.join(DEFAULT_OUT_DIR),
            project_root,
            incremental: true,
            extract_batch: 50,
            hash_concurrency: 32,
            exclude: Vec::new(),
        }
    }

    /// Use a specific configuration file.
    pub fn with_config_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_path = path.into();
        self
    }

    /// Use a specific output directory.
    pub fn with_out_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.out_dir = dir.into();
        self
    }

    /// Enable or disable the cache manifest.
    pub fn with_incremental(mut self, incremental: bool) -> Self {
        self.incremental = incremental;
        self
    }

    /// Override the extraction-context recreation cadence.
    pub fn with_extract_batch(mut self, batch: usize) -> Self {
        self.extract_batch = batch.max(1);
        self
    }

    /// Path of the snapshot artifact.
    pub fn snapshot_path(&self) -> PathBuf {
        self.out_dir.join("index.json")
    }

    /// Path of the cache manifest.
    pub fn cache_path(&self) -> PathBuf {
        self.out_dir.join("cache.json")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_load_minimal_config() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(DEFAULT_CONFIG_NAME);
        std::fs::write(&path, r#"{ "files": ["src/a.ts"] }"#).unwrap();

        let config = ProjectConfig::load(&path).unwrap();
        assert_eq!(config.files, vec!["src/a.ts"]);
        assert!(config.exclude.is_empty());
    }

    #[test]
    fn test_load_missing_config_is_fatal() {
        let dir = tempdir().unwrap();
        let result = ProjectConfig::load(&dir.path().join("absent.json"));
        assert!(matches!(result, Err(CoreError::Config { .. })));
    }

    #[test]
    fn test_load_malformed_config_is_fatal() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(DEFAULT_CONFIG_NAME);
        std::fs::write(&path, "{ not json").unwrap();

        let result = ProjectConfig::load(&path);
        assert!(matches!(result, Err(CoreError::Config { .. })));
    }

    #[test]
    fn test_build_options_defaults() {
        let opts = BuildOptions::new("/proj");
        assert_eq!(opts.config_path, PathBuf::from("/proj/docdex.json"));
        assert_eq!(opts.out_dir, PathBuf::from("/proj/.docdex"));
        assert!(opts.incremental);
        assert_eq!(opts.extract_batch, 50);
        assert_eq!(opts.hash_concurrency, 32);
    }

    #[test]
    fn test_build_options_artifact_paths() {
        let opts = BuildOptions::new("/proj");
        assert_eq!(opts.snapshot_path(), PathBuf::from("/proj/.docdex/index.json"));
        assert_eq!(opts.cache_path(), PathBuf::from("/proj/.docdex/cache.json"));
    }

    #[test]
    fn test_extract_batch_never_zero() {
        let opts = BuildOptions::new("/proj").with_extract_batch(0);
        assert_eq!(opts.extract_batch, 1);
    }
}
