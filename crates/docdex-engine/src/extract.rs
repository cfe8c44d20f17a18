//! Seam to the symbol extraction collaborator.

use crate::EngineError;
use async_trait::async_trait;
use docdex_core::SymbolRecord;

/// Per-file symbol extraction.
///
/// Implementations parse one file and return its documentation records.
/// The engine treats this as opaque and assumes its internal state is not
/// thread-safe: files are fed through it sequentially.
#[async_trait]
pub trait SymbolExtractor: Send {
    /// Extract symbol records from one file's content.
    async fn extract(
        &mut self,
        rel_path: &str,
        content: &str,
    ) -> Result<Vec<SymbolRecord>, EngineError>;
}

/// Creates extraction contexts.
///
/// The orchestrator owns the context for the duration of a build and drops
/// and recreates it on a batch cadence to bound whatever internal caches
/// the implementation accumulates.
pub trait ExtractorFactory: Send + Sync {
    /// Create a fresh extraction context.
    fn create(&self) -> Box<dyn SymbolExtractor>;
}
