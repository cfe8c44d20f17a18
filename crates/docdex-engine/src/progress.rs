//! Build progress and lifecycle observation.
//!
//! Observers are fire-and-forget: events carry no return value and the
//! engine never waits on observer back-pressure. Each phase reports its own
//! monotonically increasing `1..=total` sequence.

use crate::EngineError;
use async_trait::async_trait;

/// Which build phase a progress event belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildPhase {
    /// Native file extraction
    Indexing,
    /// Per-plugin extraction
    Plugin,
}

/// One determinate progress step.
#[derive(Debug, Clone, Copy)]
pub struct BuildProgress<'a> {
    /// Phase the step belongs to
    pub phase: BuildPhase,
    /// Plugin name for plugin-phase steps
    pub plugin: Option<&'a str>,
    /// Step number within the phase, starting at 1
    pub current: usize,
    /// Total steps in the phase
    pub total: usize,
    /// File being processed
    pub file: &'a str,
}

/// Observer hooks for build lifecycle events. All methods are optional.
#[async_trait]
pub trait BuildObserver: Send + Sync {
    /// A build is starting.
    async fn on_build_start(&self) {}

    /// One file finished processing.
    async fn on_progress(&self, _progress: &BuildProgress<'_>) {}

    /// The build completed and its artifacts are published.
    async fn on_build_complete(&self, _symbol_count: usize, _elapsed_ms: u64) {}

    /// The build failed; nothing was published.
    async fn on_build_error(&self, _error: &EngineError) {}
}

/// Observer that ignores every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullObserver;

#[async_trait]
impl BuildObserver for NullObserver {}
