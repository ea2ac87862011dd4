// Chain middleware - hooks around every strategy attempt

use async_trait::async_trait;
use serde::Serialize;

use crate::extraction::models::{ExtractionContext, ExtractionResult};

/// What the chain should do with the strategy about to run
#[derive(Debug, Clone)]
pub enum BeforeAction {
    /// Run the strategy
    Proceed,
    /// Do not run this strategy; it is not counted as attempted
    Skip { reason: String },
    /// Stop the chain and return this result without attempting anything
    ShortCircuit(ExtractionResult),
}

/// Hooks invoked around each strategy attempt
#[async_trait]
pub trait ChainMiddleware: Send + Sync {
    async fn before(&self, _ctx: &ExtractionContext, _strategy: &str) -> BeforeAction {
        BeforeAction::Proceed
    }

    async fn after(&self, _ctx: &ExtractionContext, _strategy: &str, _result: &ExtractionResult) {}
}

/// Number of hook invocations during one chain run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MiddlewareCalls {
    pub before: u32,
    pub after: u32,
}
