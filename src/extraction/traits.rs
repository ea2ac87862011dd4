// Extraction strategy trait and collaborator seams

use async_trait::async_trait;

use super::element::ElementRef;
use super::errors::StrategyError;
use super::metrics::ExtractionSummary;
use super::models::{ContentInfo, ExtractionContext, ExtractionResult};

/// Trait for extraction strategies
#[async_trait]
pub trait ExtractionStrategy: Send + Sync {
    /// Unique name of the strategy (for logging and blacklisting)
    fn name(&self) -> &str;

    /// Lower runs first
    fn priority(&self) -> i32;

    /// Check if this strategy applies to the context. Must be side-effect free.
    fn can_handle(&self, ctx: &ExtractionContext) -> bool;

    /// Attempt extraction.
    ///
    /// `Ok` with `success: false` and `Err` are treated the same by the chain.
    async fn extract(
        &self,
        ctx: &ExtractionContext,
        correlation_id: &str,
    ) -> Result<ExtractionResult, StrategyError>;
}

/// Resolves the content unit an element belongs to
pub trait ContentInfoResolver: Send + Sync {
    fn resolve(&self, element: &ElementRef) -> Option<ContentInfo>;
}

/// Receives exactly one summary per orchestrated extraction
pub trait SummarySink: Send + Sync {
    fn emit(&self, summary: &ExtractionSummary);
}
