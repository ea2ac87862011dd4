// Builder for strategy chains with retry, backoff, middleware and parallel groups

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use super::{ChainEntry, ChainMiddleware, StrategyChain};
use crate::extraction::traits::ExtractionStrategy;

/// Builder for `StrategyChain`
#[derive(Default)]
pub struct StrategyChainBuilder {
    entries: Vec<ChainEntry>,
    middlewares: Vec<Arc<dyn ChainMiddleware>>,
    retry_limits: BTreeMap<String, u32>,
    backoff: Option<Duration>,
    duplicate_guard: bool,
    added_names: HashSet<String>,
    duplicates_skipped: usize,
}

impl StrategyChainBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Skip strategies whose name was already added.
    ///
    /// Only affects strategies added after this call.
    pub fn with_duplicate_guard(mut self) -> Self {
        self.duplicate_guard = true;
        self
    }

    /// Delay between retries of the same strategy
    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = Some(backoff);
        self
    }

    /// Allow up to `max_retries` extra attempts for the named strategy
    pub fn with_retry(mut self, name: &str, max_retries: u32) -> Self {
        self.retry_limits.insert(name.to_string(), max_retries);
        self
    }

    pub fn with_middleware(mut self, middleware: Arc<dyn ChainMiddleware>) -> Self {
        self.middlewares.push(middleware);
        self
    }

    pub fn add(mut self, strategy: Arc<dyn ExtractionStrategy>) -> Self {
        if self.accept(strategy.name()) {
            self.entries.push(ChainEntry::Single(strategy));
        }
        self
    }

    /// Add a group raced concurrently; the first success wins
    pub fn add_parallel(mut self, strategies: Vec<Arc<dyn ExtractionStrategy>>) -> Self {
        let mut group = Vec::with_capacity(strategies.len());
        for strategy in strategies {
            if self.accept(strategy.name()) {
                group.push(strategy);
            }
        }
        if !group.is_empty() {
            self.entries.push(ChainEntry::Parallel(group));
        }
        self
    }

    fn accept(&mut self, name: &str) -> bool {
        if self.duplicate_guard && self.added_names.contains(name) {
            debug!(strategy = name, "duplicate strategy skipped");
            self.duplicates_skipped += 1;
            return false;
        }
        self.added_names.insert(name.to_string());
        true
    }

    pub fn build(self) -> StrategyChain {
        StrategyChain {
            entries: self.entries,
            middlewares: self.middlewares,
            retry_limits: self.retry_limits,
            backoff: self.backoff,
            duplicates_skipped: self.duplicates_skipped,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;

    use crate::extraction::chain::{BeforeAction, ChainMiddleware, StrategyChain};
    use crate::extraction::models::{ExtractionContext, ExtractionResult};
    use crate::extraction::test_utils::{context, items, MockStrategy};
    use crate::extraction::traits::ExtractionStrategy;

    fn dyn_strategy(s: &Arc<MockStrategy>) -> Arc<dyn ExtractionStrategy> {
        Arc::clone(s) as Arc<dyn ExtractionStrategy>
    }

    #[tokio::test]
    async fn test_duplicate_guard_skips_same_name() {
        let a = MockStrategy::failing("A", 1);
        let a_again = MockStrategy::succeeding("A", 1, 1);
        let chain = StrategyChain::builder()
            .with_duplicate_guard()
            .add(dyn_strategy(&a))
            .add(dyn_strategy(&a_again))
            .build();

        assert_eq!(chain.len(), 1);
        let outcome = chain.run(&context(), "cid").await;
        assert_eq!(outcome.metrics.duplicates_skipped, 1);
        assert!(!outcome.result.success);
        assert_eq!(a_again.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_with_backoff_until_success() {
        let flaky = MockStrategy::flaky("flaky", 1, 2);
        let chain = StrategyChain::builder()
            .with_retry("flaky", 3)
            .with_backoff(Duration::from_millis(100))
            .add(dyn_strategy(&flaky))
            .build();

        let started = tokio::time::Instant::now();
        let outcome = chain.run(&context(), "cid").await;

        assert!(outcome.result.success);
        assert_eq!(flaky.calls(), 3);
        assert_eq!(outcome.metrics.strategy_retries.get("flaky"), Some(&2));
        assert!(started.elapsed() >= Duration::from_millis(200));
    }

    #[tokio::test]
    async fn test_permanent_failure_is_not_retried() {
        let gone = MockStrategy::raising("gone", 1, "HTTP 404 not found");
        let chain = StrategyChain::builder()
            .with_retry("gone", 5)
            .add(dyn_strategy(&gone))
            .build();

        let outcome = chain.run(&context(), "cid").await;
        assert!(!outcome.result.success);
        assert_eq!(gone.calls(), 1);
        assert!(outcome.metrics.strategy_retries.is_empty());
    }

    struct SkipNamed(&'static str);

    #[async_trait]
    impl ChainMiddleware for SkipNamed {
        async fn before(&self, _ctx: &ExtractionContext, strategy: &str) -> BeforeAction {
            if strategy == self.0 {
                BeforeAction::Skip {
                    reason: "disabled".to_string(),
                }
            } else {
                BeforeAction::Proceed
            }
        }
    }

    #[derive(Default)]
    struct CountAfter(AtomicU32);

    #[async_trait]
    impl ChainMiddleware for CountAfter {
        async fn after(&self, _ctx: &ExtractionContext, _strategy: &str, _result: &ExtractionResult) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn test_middleware_skip_and_after_hooks() {
        let a = MockStrategy::succeeding("A", 1, 1);
        let b = MockStrategy::succeeding("B", 2, 3);
        let counter = Arc::new(CountAfter::default());
        let chain = StrategyChain::builder()
            .with_middleware(Arc::new(SkipNamed("A")))
            .with_middleware(Arc::clone(&counter) as Arc<dyn ChainMiddleware>)
            .add(dyn_strategy(&a))
            .add(dyn_strategy(&b))
            .build();

        let outcome = chain.run(&context(), "cid").await;
        assert_eq!(outcome.metrics.success_strategy.as_deref(), Some("B"));
        assert_eq!(outcome.metrics.attempted_strategies, vec!["B"]);
        assert_eq!(a.calls(), 0);
        assert_eq!(counter.0.load(Ordering::SeqCst), 1);
        assert_eq!(outcome.metrics.middleware_calls.before, 4);
        assert_eq!(outcome.metrics.middleware_calls.after, 2);
    }

    struct Cached(ExtractionResult);

    #[async_trait]
    impl ChainMiddleware for Cached {
        async fn before(&self, _ctx: &ExtractionContext, _strategy: &str) -> BeforeAction {
            BeforeAction::ShortCircuit(self.0.clone())
        }
    }

    #[tokio::test]
    async fn test_middleware_short_circuit() {
        let a = MockStrategy::succeeding("A", 1, 1);
        let cached = ExtractionResult::success(items("cached", 2), 1, "memo", "memo");
        let chain = StrategyChain::builder()
            .with_middleware(Arc::new(Cached(cached.clone())))
            .add(dyn_strategy(&a))
            .build();

        let outcome = chain.run(&context(), "cid").await;
        assert!(outcome.metrics.short_circuited);
        assert_eq!(outcome.metrics.total_tried, 0);
        assert_eq!(outcome.result.items, cached.items);
        assert_eq!(a.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_parallel_group_first_success_wins() {
        let slow = MockStrategy::succeeding("slow", 1, 1).with_delay(Duration::from_secs(5));
        let fast = MockStrategy::succeeding("fast", 1, 2).with_delay(Duration::from_millis(10));
        let broken = MockStrategy::failing("broken", 1);
        let chain = StrategyChain::builder()
            .add_parallel(vec![
                dyn_strategy(&slow),
                dyn_strategy(&fast),
                dyn_strategy(&broken),
            ])
            .build();

        let outcome = chain.run(&context(), "cid").await;
        assert!(outcome.result.success);
        assert_eq!(outcome.metrics.success_strategy.as_deref(), Some("fast"));
        assert_eq!(outcome.metrics.group_size, Some(3));
        assert_eq!(outcome.metrics.failed_strategies, vec!["broken"]);
        assert_eq!(outcome.metrics.losing_cancel_count, Some(1));
        assert_eq!(
            outcome.metrics.attempted_strategies,
            vec!["slow", "fast", "broken"]
        );
    }
}
