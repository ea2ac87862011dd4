// Strategy chain - sequential (and grouped parallel) strategy execution
//
// Tries strategies in order until one succeeds. Failures, whether returned
// as `success: false` or raised as `Err`, are recorded and never escape.

mod builder;
mod middleware;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{FuturesUnordered, StreamExt};
use serde::Serialize;
use serde_json::json;
use tokio::time::Instant;
use tracing::{debug, trace};

use super::diagnostics::{diagnose_message, diagnose_strategy_error, FailureReason};
use super::errors::ExtractionError;
use super::models::{ExtractionContext, ExtractionResult};
use super::traits::ExtractionStrategy;

pub use builder::StrategyChainBuilder;
pub use middleware::{BeforeAction, ChainMiddleware, MiddlewareCalls};

/// One step of the chain
#[derive(Clone)]
pub enum ChainEntry {
    Single(Arc<dyn ExtractionStrategy>),
    /// Strategies raced against each other; first success wins
    Parallel(Vec<Arc<dyn ExtractionStrategy>>),
}

/// What happened during one chain run
#[derive(Debug, Clone, Default, Serialize)]
pub struct ChainMetrics {
    pub attempted_strategies: Vec<String>,
    pub success_strategy: Option<String>,
    pub failed_strategies: Vec<String>,
    pub failure_reasons: BTreeMap<String, FailureReason>,
    pub total_tried: usize,
    pub duration: Duration,
    pub middleware_calls: MiddlewareCalls,
    pub duplicates_skipped: usize,
    pub strategy_retries: BTreeMap<String, u32>,
    pub short_circuited: bool,
    pub group_size: Option<usize>,
    pub winner_latency: Option<Duration>,
    pub losing_cancel_count: Option<usize>,
}

/// Result of a chain run plus its metrics
#[derive(Debug, Clone)]
pub struct ChainOutcome {
    pub result: ExtractionResult,
    pub metrics: ChainMetrics,
}

struct Attempt {
    name: String,
    result: ExtractionResult,
    failure: Option<FailureReason>,
    retries: u32,
}

/// Ordered strategy executor
#[derive(Clone, Default)]
pub struct StrategyChain {
    entries: Vec<ChainEntry>,
    middlewares: Vec<Arc<dyn ChainMiddleware>>,
    retry_limits: BTreeMap<String, u32>,
    backoff: Option<Duration>,
    duplicates_skipped: usize,
}

impl StrategyChain {
    /// Plain chain over already-sorted strategies
    pub fn new(strategies: Vec<Arc<dyn ExtractionStrategy>>) -> Self {
        Self {
            entries: strategies.into_iter().map(ChainEntry::Single).collect(),
            ..Self::default()
        }
    }

    pub fn builder() -> StrategyChainBuilder {
        StrategyChainBuilder::new()
    }

    pub fn with_middlewares(mut self, middlewares: Vec<Arc<dyn ChainMiddleware>>) -> Self {
        self.middlewares = middlewares;
        self
    }

    pub fn len(&self) -> usize {
        self.entries
            .iter()
            .map(|entry| match entry {
                ChainEntry::Single(_) => 1,
                ChainEntry::Parallel(group) => group.len(),
            })
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Run the chain. Never fails: exhaustion yields a `NO_MEDIA_FOUND` result.
    pub async fn run(&self, ctx: &ExtractionContext, correlation_id: &str) -> ChainOutcome {
        let start = Instant::now();
        let mut metrics = ChainMetrics {
            duplicates_skipped: self.duplicates_skipped,
            ..ChainMetrics::default()
        };

        for entry in &self.entries {
            match entry {
                ChainEntry::Single(strategy) => {
                    if !strategy.can_handle(ctx) {
                        trace!(strategy = strategy.name(), "strategy not applicable");
                        continue;
                    }

                    match self.before(ctx, strategy.name(), &mut metrics).await {
                        BeforeAction::Proceed => {}
                        BeforeAction::Skip { reason } => {
                            debug!(strategy = strategy.name(), %reason, "strategy skipped by middleware");
                            continue;
                        }
                        BeforeAction::ShortCircuit(result) => {
                            return Self::short_circuit(result, metrics, start);
                        }
                    }

                    metrics.attempted_strategies.push(strategy.name().to_string());
                    debug!(correlation_id, strategy = strategy.name(), "trying strategy");

                    let attempt = self.attempt(strategy.as_ref(), ctx, correlation_id).await;
                    self.after(ctx, &attempt, &mut metrics).await;

                    if attempt.result.success {
                        return Self::finish_success(attempt, metrics, start);
                    }
                    Self::record_failure(attempt, &mut metrics);
                }
                ChainEntry::Parallel(group) => {
                    let mut runnable = Vec::with_capacity(group.len());
                    for strategy in group.iter().filter(|s| s.can_handle(ctx)) {
                        match self.before(ctx, strategy.name(), &mut metrics).await {
                            BeforeAction::Proceed => runnable.push(Arc::clone(strategy)),
                            BeforeAction::Skip { reason } => {
                                debug!(strategy = strategy.name(), %reason, "strategy skipped by middleware");
                            }
                            BeforeAction::ShortCircuit(result) => {
                                return Self::short_circuit(result, metrics, start);
                            }
                        }
                    }
                    if runnable.is_empty() {
                        continue;
                    }

                    metrics
                        .attempted_strategies
                        .extend(runnable.iter().map(|s| s.name().to_string()));
                    debug!(correlation_id, group_size = runnable.len(), "racing strategy group");

                    let group_start = Instant::now();
                    let mut pending: FuturesUnordered<_> = runnable
                        .iter()
                        .map(|strategy| self.attempt(strategy.as_ref(), ctx, correlation_id))
                        .collect();

                    let mut winner = None;
                    while let Some(attempt) = pending.next().await {
                        self.after(ctx, &attempt, &mut metrics).await;
                        if attempt.result.success {
                            winner = Some(attempt);
                            break;
                        }
                        Self::record_failure(attempt, &mut metrics);
                    }
                    // Dropping the set cancels whatever is still running
                    let losers = pending.len();
                    drop(pending);

                    if let Some(attempt) = winner {
                        metrics.group_size = Some(runnable.len());
                        metrics.winner_latency = Some(group_start.elapsed());
                        metrics.losing_cancel_count = Some(losers);
                        return Self::finish_success(attempt, metrics, start);
                    }
                }
            }
        }

        metrics.total_tried = metrics.attempted_strategies.len();
        metrics.duration = start.elapsed();
        debug!(
            correlation_id,
            attempted = ?metrics.attempted_strategies,
            duration_ms = metrics.duration.as_millis() as u64,
            "strategy chain exhausted"
        );

        let mut result = ExtractionResult::failure(
            ExtractionError::no_media_found("all strategies in the chain failed"),
            "strategy-chain-failed",
            "strategy-chain",
        )
        .with_content_info(ctx.content_info.clone())
        .with_debug("failedStrategies", json!(metrics.failed_strategies))
        .with_debug("failureReasons", json!(metrics.failure_reasons))
        .with_debug("durationMs", json!(metrics.duration.as_millis() as u64));
        result.metadata.attempted_strategies = metrics.attempted_strategies.clone();

        ChainOutcome { result, metrics }
    }

    async fn before(
        &self,
        ctx: &ExtractionContext,
        strategy: &str,
        metrics: &mut ChainMetrics,
    ) -> BeforeAction {
        let mut action = BeforeAction::Proceed;
        for middleware in &self.middlewares {
            let decision = middleware.before(ctx, strategy).await;
            metrics.middleware_calls.before += 1;
            match decision {
                BeforeAction::ShortCircuit(result) => return BeforeAction::ShortCircuit(result),
                BeforeAction::Skip { reason } => action = BeforeAction::Skip { reason },
                BeforeAction::Proceed => {}
            }
        }
        action
    }

    async fn after(&self, ctx: &ExtractionContext, attempt: &Attempt, metrics: &mut ChainMetrics) {
        if attempt.retries > 0 {
            metrics
                .strategy_retries
                .insert(attempt.name.clone(), attempt.retries);
        }
        for middleware in &self.middlewares {
            middleware.after(ctx, &attempt.name, &attempt.result).await;
            metrics.middleware_calls.after += 1;
        }
    }

    /// Run one strategy, retrying when configured and the failure is not permanent
    async fn attempt(
        &self,
        strategy: &dyn ExtractionStrategy,
        ctx: &ExtractionContext,
        correlation_id: &str,
    ) -> Attempt {
        let name = strategy.name().to_string();
        let max_retries = self.retry_limits.get(&name).copied().unwrap_or(0);
        let mut retries = 0;

        loop {
            let (result, failure) = match strategy.extract(ctx, correlation_id).await {
                Ok(result) if result.success => (result, None),
                Ok(result) => {
                    let reason = result
                        .errors
                        .iter()
                        .find_map(|e| diagnose_message(&e.message))
                        .unwrap_or(FailureReason::NoMedia);
                    (result, Some(reason))
                }
                Err(err) => {
                    let reason = diagnose_strategy_error(&err);
                    debug!(strategy = %name, error = %err, ?reason, "strategy raised");
                    let result = ExtractionResult::failure(err.into(), "strategy-error", &name)
                        .with_content_info(ctx.content_info.clone());
                    (result, Some(reason))
                }
            };

            let reason = match failure {
                None => {
                    return Attempt {
                        name,
                        result,
                        failure: None,
                        retries,
                    }
                }
                Some(reason) => reason,
            };

            if retries >= max_retries || reason.is_permanent() {
                return Attempt {
                    name,
                    result,
                    failure: Some(reason),
                    retries,
                };
            }

            retries += 1;
            debug!(strategy = %name, retries, ?reason, "retrying strategy");
            if let Some(backoff) = self.backoff.filter(|b| !b.is_zero()) {
                tokio::time::sleep(backoff).await;
            }
        }
    }

    fn record_failure(attempt: Attempt, metrics: &mut ChainMetrics) {
        let reason = attempt.failure.unwrap_or(FailureReason::Unknown);
        debug!(strategy = %attempt.name, ?reason, "strategy failed");
        metrics.failure_reasons.insert(attempt.name.clone(), reason);
        metrics.failed_strategies.push(attempt.name);
    }

    fn finish_success(attempt: Attempt, mut metrics: ChainMetrics, start: Instant) -> ChainOutcome {
        metrics.success_strategy = Some(attempt.name.clone());
        metrics.total_tried = metrics.attempted_strategies.len();
        metrics.duration = start.elapsed();

        let mut result = attempt.result;
        result.metadata.success_strategy = Some(attempt.name);
        result.metadata.attempted_strategies = metrics.attempted_strategies.clone();

        ChainOutcome { result, metrics }
    }

    fn short_circuit(result: ExtractionResult, mut metrics: ChainMetrics, start: Instant) -> ChainOutcome {
        debug!("strategy chain short-circuited by middleware");
        metrics.attempted_strategies.clear();
        metrics.failed_strategies.clear();
        metrics.failure_reasons.clear();
        metrics.total_tried = 0;
        metrics.short_circuited = true;
        metrics.success_strategy = result.metadata.success_strategy.clone();
        metrics.duration = start.elapsed();
        ChainOutcome { result, metrics }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extraction::errors::ExtractionErrorCode;
    use crate::extraction::test_utils::{context, MockStrategy};

    fn chain_of(strategies: &[&Arc<MockStrategy>]) -> StrategyChain {
        StrategyChain::new(
            strategies
                .iter()
                .map(|s| Arc::clone(*s) as Arc<dyn ExtractionStrategy>)
                .collect(),
        )
    }

    #[tokio::test]
    async fn test_first_failure_falls_through_to_next() {
        let a = MockStrategy::failing("A", 1);
        let b = MockStrategy::succeeding("B", 2, 2);
        let outcome = chain_of(&[&a, &b]).run(&context(), "cid").await;

        assert!(outcome.result.success);
        assert_eq!(outcome.result.items.len(), 2);
        assert_eq!(outcome.result.metadata.attempted_strategies, vec!["A", "B"]);
        assert_eq!(outcome.result.metadata.success_strategy.as_deref(), Some("B"));
        assert_eq!(outcome.metrics.failed_strategies, vec!["A"]);
        assert_eq!(outcome.metrics.total_tried, 2);
    }

    #[tokio::test]
    async fn test_success_stops_chain() {
        let a = MockStrategy::succeeding("A", 1, 1);
        let b = MockStrategy::succeeding("B", 2, 1);
        let outcome = chain_of(&[&a, &b]).run(&context(), "cid").await;

        assert_eq!(outcome.metrics.success_strategy.as_deref(), Some("A"));
        assert_eq!(a.calls(), 1);
        assert_eq!(b.calls(), 0);
    }

    #[tokio::test]
    async fn test_raised_error_treated_as_failure() {
        let a = MockStrategy::raising("A", 1, "socket closed");
        let b = MockStrategy::succeeding("B", 2, 1);
        let outcome = chain_of(&[&a, &b]).run(&context(), "cid").await;

        assert!(outcome.result.success);
        assert_eq!(outcome.metrics.failed_strategies, vec!["A"]);
        assert_eq!(
            outcome.metrics.failure_reasons.get("A"),
            Some(&FailureReason::Unknown)
        );
    }

    #[tokio::test]
    async fn test_inapplicable_strategies_are_not_attempted() {
        let a = MockStrategy::succeeding("A", 1, 1).not_applicable();
        let b = MockStrategy::succeeding("B", 2, 1);
        let outcome = chain_of(&[&a, &b]).run(&context(), "cid").await;

        assert_eq!(outcome.metrics.attempted_strategies, vec!["B"]);
        assert_eq!(a.calls(), 0);
    }

    #[tokio::test]
    async fn test_exhaustion_returns_no_media_found() {
        let a = MockStrategy::failing("A", 1);
        let b = MockStrategy::raising("B", 2, "HTTP 404");
        let outcome = chain_of(&[&a, &b]).run(&context(), "cid").await;

        assert!(!outcome.result.success);
        assert_eq!(outcome.result.errors.len(), 1);
        assert_eq!(outcome.result.errors[0].code, ExtractionErrorCode::NoMediaFound);
        assert_eq!(outcome.result.metadata.attempted_strategies, vec!["A", "B"]);
        assert_eq!(outcome.metrics.failed_strategies, vec!["A", "B"]);
        assert_eq!(
            outcome.metrics.failure_reasons.get("B"),
            Some(&FailureReason::NotFound)
        );
        assert!(outcome.result.metadata.debug.contains_key("durationMs"));
    }

    #[tokio::test]
    async fn test_empty_chain_fails_cleanly() {
        let outcome = StrategyChain::default().run(&context(), "cid").await;
        assert!(!outcome.result.success);
        assert!(outcome.metrics.attempted_strategies.is_empty());
    }
}
