// Extraction module - strategy chain, caching tiers and the orchestrator
//
// Layering, leaf first:
// - traits: the strategy contract and collaborator seams
// - chain: ordered (and grouped parallel) strategy execution
// - cache: content-keyed result cache, element-keyed success cache
// - orchestrator: cooldown, caches, preferred strategy, chain, metrics

pub mod cache;
pub mod chain;
pub mod config;
pub mod diagnostics;
pub mod element;
pub mod errors;
pub mod metrics;
pub mod models;
pub mod orchestrator;
pub mod resolver;
pub mod traits;

#[cfg(test)]
mod test_utils;

pub use cache::{CacheStatus, ResultCache, ResultCacheMetrics, SuccessCacheMetrics, SuccessResultCache};
pub use chain::{BeforeAction, ChainMetrics, ChainMiddleware, ChainOutcome, StrategyChain, StrategyChainBuilder};
pub use config::{OrchestratorConfig, ResultCacheConfig};
pub use diagnostics::FailureReason;
pub use element::{ElementId, ElementRef, WeakElement};
pub use errors::{ConfigError, ExtractionError, ExtractionErrorCode, StrategyError};
pub use metrics::{ExtractionSummary, OrchestratorCounters, OrchestratorMetrics, Outcome, ResultSource, TracingSummarySink};
pub use models::{ContentInfo, ExtractionContext, ExtractionMetadata, ExtractionOptions, ExtractionResult, MediaDescriptor, MediaType};
pub use orchestrator::MediaExtractionOrchestrator;
pub use resolver::LinkContentResolver;
pub use traits::{ContentInfoResolver, ExtractionStrategy, SummarySink};
