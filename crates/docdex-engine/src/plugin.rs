//! Extension handlers for file types outside the native extraction path.

use crate::EngineError;
use async_trait::async_trait;
use docdex_core::SymbolRecord;
use std::path::PathBuf;

/// Context handed to a plugin at initialization.
#[derive(Debug, Clone)]
pub struct PluginContext {
    /// Project root directory
    pub project_root: PathBuf,
}

/// What a plugin produced for one file.
#[derive(Debug)]
pub enum PluginOutput {
    /// Fully-formed symbol records, used as-is (after path normalization)
    Symbols(Vec<SymbolRecord>),
    /// Translatable source text, fed back through the symbol extractor
    /// under a synthetic path
    Translated(String),
    /// Nothing to contribute for this file
    Skip,
}

/// An extension handler claiming one or more file extensions.
///
/// Lifecycle: `init` is called once per build (and again after each
/// re-initialization cadence), `extract` once per claimed file in sorted
/// order, `dispose` exactly once per successful `init`.
#[async_trait]
pub trait DocPlugin: Send {
    /// Unique plugin name. Part of the cache manifest identity.
    fn name(&self) -> &str;

    /// Claimed file extensions, without the leading dot.
    fn extensions(&self) -> &[&str];

    /// Prepare for a build.
    async fn init(&mut self, ctx: &PluginContext) -> Result<(), EngineError>;

    /// Release per-build resources.
    async fn dispose(&mut self) -> Result<(), EngineError>;

    /// Process one claimed file.
    async fn extract(
        &mut self,
        rel_path: &str,
        content: &str,
    ) -> Result<PluginOutput, EngineError>;
}

/// Ordered set of registered plugins.
///
/// Validation happens at registration, before any build: a plugin with an
/// empty or duplicate name, or no claimed extensions, is rejected outright.
#[derive(Default)]
pub struct PluginRegistry {
    plugins: Vec<Box<dyn DocPlugin>>,
}

impl PluginRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a plugin, validating its shape.
    pub fn register(&mut self, plugin: Box<dyn DocPlugin>) -> Result<(), EngineError> {
        let name = plugin.name().to_string();
        if name.is_empty() {
            return Err(EngineError::Plugin {
                name: "<unnamed>".to_string(),
                message: "plugin name must not be empty".to_string(),
            });
        }
        if self.plugins.iter().any(|p| p.name() == name) {
            return Err(EngineError::Plugin {
                name,
                message: "duplicate plugin name".to_string(),
            });
        }
        if plugin.extensions().is_empty() {
            return Err(EngineError::Plugin {
                name,
                message: "plugin claims no extensions".to_string(),
            });
        }
        self.plugins.push(plugin);
        Ok(())
    }

    /// Number of registered plugins.
    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    /// Plugin claims as `(name, lowercased extensions)`, in registration order.
    pub fn claims(&self) -> Vec<(String, Vec<String>)> {
        self.plugins
            .iter()
            .map(|p| {
                (
                    p.name().to_string(),
                    p.extensions().iter().map(|e| e.to_lowercase()).collect(),
                )
            })
            .collect()
    }

    /// Sorted plugin names, as stored in the cache manifest.
    pub fn names_sorted(&self) -> Vec<String> {
        let mut names: Vec<String> = self.plugins.iter().map(|p| p.name().to_string()).collect();
        names.sort();
        names
    }

    /// Mutable access to the plugins in registration order.
    pub(crate) fn plugins_mut(&mut self) -> &mut [Box<dyn DocPlugin>] {
        &mut self.plugins
    }
}
