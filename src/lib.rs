// Media extraction engine
//
// Runs a prioritized chain of extraction strategies for an interacted UI
// element and caches results per content unit and per element.

pub mod extraction;
pub mod telemetry;

pub use extraction::{
    ContentInfo, ElementRef, ExtractionError, ExtractionErrorCode, ExtractionOptions,
    ExtractionResult, ExtractionStrategy, MediaDescriptor, MediaExtractionOrchestrator,
    MediaType, OrchestratorConfig,
};
