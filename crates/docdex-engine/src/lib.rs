//! Docdex Engine
//!
//! This crate provides the incremental build engine for docdex, including:
//! - Content/metadata-based change diffing against a persisted cache
//! - File routing between the native extractor and registered plugins
//! - Build orchestration with bounded extraction batches
//! - A debounced, single-flight build scheduler
//! - File watching feeding the scheduler

mod error;

pub mod build;
pub mod cache;
pub mod controller;
pub mod diff;
pub mod extract;
pub mod plugin;
pub mod progress;
pub mod router;
pub mod snapshot;
pub mod watcher;

pub use build::{BuildOrchestrator, BuildReport};
pub use cache::{config_fingerprint, CacheManifest, CacheStore, FileEntry, CACHE_VERSION};
pub use controller::{BuildController, BuildState, ControllerOptions};
pub use diff::{diff, DiffResult};
pub use error::EngineError;
pub use extract::{ExtractorFactory, SymbolExtractor};
pub use plugin::{DocPlugin, PluginContext, PluginOutput, PluginRegistry};
pub use progress::{BuildObserver, BuildPhase, BuildProgress, NullObserver};
pub use router::{ExcludeSet, RoutedFiles};
pub use snapshot::{IndexSnapshot, INDEX_VERSION};
pub use watcher::{
    ChangeKind, FileChange, FileWatcher, WatchEvent, WatchFilter, WatchSession, WatcherOptions,
};
