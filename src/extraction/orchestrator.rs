// Media extraction orchestrator - caching and fallback around the strategy chain
//
// Per call, in this order:
// 1. Cooldown: a repeat inside the click window reuses the cached result
// 2. Success cache: live element-keyed result
// 3. Content cache (opt-in per call): live content-keyed result
// 4. Preferred strategy: last winner for elements with the same signature
// 5. Full chain over every registered, non-blacklisted strategy
//
// State lives behind one mutex that is never held across an `.await`.
// Writes after a strategy settles re-check the session they started in.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::cache::{ResultCache, SuccessResultCache};
use super::chain::{ChainMiddleware, StrategyChain};
use super::config::OrchestratorConfig;
use super::element::{ElementId, ElementRef};
use super::errors::{ConfigError, ExtractionError};
use super::metrics::{
    ExtractionSummary, OrchestratorCounters, OrchestratorMetrics, Outcome, ResultSource,
    TracingSummarySink,
};
use super::models::{ContentInfo, ExtractionContext, ExtractionOptions, ExtractionResult};
use super::traits::{ContentInfoResolver, ExtractionStrategy, SummarySink};

struct OrchestratorState {
    session_id: u64,
    /// Membership only; re-processing is allowed unless the strict guard is on
    processed: HashSet<ElementId>,
    /// element signature -> last winning strategy
    strategy_memo: HashMap<String, String>,
    blacklist: BTreeSet<String>,
    last_extraction: HashMap<ElementId, Instant>,
    success_cache: SuccessResultCache,
    click_cooldown: Option<Duration>,
    counters: OrchestratorCounters,
}

enum Gate {
    Proceed { session: u64 },
    Done(ExtractionResult, ResultSource),
}

/// Per-call bookkeeping for the summary
struct Call {
    correlation_id: String,
    element_id: ElementId,
    content_id: Option<String>,
    started: Instant,
}

/// Façade coordinating strategies, both cache tiers and metrics
pub struct MediaExtractionOrchestrator {
    strategies: RwLock<Vec<Arc<dyn ExtractionStrategy>>>,
    middlewares: RwLock<Vec<Arc<dyn ChainMiddleware>>>,
    content_cache: ResultCache,
    state: Mutex<OrchestratorState>,
    resolver: Option<Arc<dyn ContentInfoResolver>>,
    sink: Arc<dyn SummarySink>,
    strict_duplicate_guard: bool,
}

impl MediaExtractionOrchestrator {
    pub fn new(config: OrchestratorConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::from_config(config))
    }

    fn from_config(config: OrchestratorConfig) -> Self {
        let content_cache = ResultCache::new(&config.content_cache);
        if config.content_cache.auto_purge {
            content_cache.start_purge_timer();
        }

        Self {
            strategies: RwLock::new(Vec::new()),
            middlewares: RwLock::new(Vec::new()),
            content_cache,
            state: Mutex::new(OrchestratorState {
                session_id: 0,
                processed: HashSet::new(),
                strategy_memo: HashMap::new(),
                blacklist: BTreeSet::new(),
                last_extraction: HashMap::new(),
                success_cache: SuccessResultCache::new(
                    config.success_cache_max_entries,
                    config.success_cache_ttl(),
                ),
                click_cooldown: config.click_cooldown(),
                counters: OrchestratorCounters::default(),
            }),
            resolver: None,
            sink: Arc::new(TracingSummarySink),
            strict_duplicate_guard: config.strict_duplicate_guard,
        }
    }

    /// Resolve content identity when the caller does not supply it
    pub fn with_resolver(mut self, resolver: Arc<dyn ContentInfoResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    pub fn with_summary_sink(mut self, sink: Arc<dyn SummarySink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn with_strategies<I>(self, strategies: I) -> Self
    where
        I: IntoIterator<Item = Arc<dyn ExtractionStrategy>>,
    {
        for strategy in strategies {
            self.add_strategy(strategy);
        }
        self
    }

    /// Register a strategy, replacing any with the same name, and re-sort by priority
    pub fn add_strategy(&self, strategy: Arc<dyn ExtractionStrategy>) {
        let mut strategies = self.strategies.write();
        strategies.retain(|existing| existing.name() != strategy.name());
        debug!(strategy = strategy.name(), priority = strategy.priority(), "strategy registered");
        strategies.push(strategy);
        // stable: equal priorities keep registration order
        strategies.sort_by_key(|s| s.priority());
    }

    pub fn remove_strategy(&self, name: &str) -> bool {
        let mut strategies = self.strategies.write();
        let before = strategies.len();
        strategies.retain(|s| s.name() != name);
        strategies.len() != before
    }

    pub fn strategy_names(&self) -> Vec<String> {
        self.strategies
            .read()
            .iter()
            .map(|s| s.name().to_string())
            .collect()
    }

    /// Middleware wrapping every strategy attempt
    pub fn add_middleware(&self, middleware: Arc<dyn ChainMiddleware>) {
        self.middlewares.write().push(middleware);
    }

    /// Extract media for an interacted element. Never fails: every failure mode
    /// comes back as a result with `success: false`.
    pub async fn extract(
        &self,
        element: &ElementRef,
        options: ExtractionOptions,
        correlation_id: Option<String>,
        content_info: Option<ContentInfo>,
    ) -> ExtractionResult {
        let content_info = content_info.or_else(|| {
            self.resolver
                .as_ref()
                .and_then(|resolver| resolver.resolve(element))
        });
        let call = Call {
            correlation_id: correlation_id.unwrap_or_else(|| Uuid::new_v4().to_string()),
            element_id: element.id(),
            content_id: content_info.as_ref().map(|c| c.content_id.clone()),
            started: Instant::now(),
        };
        debug!(
            correlation_id = %call.correlation_id,
            element = %call.element_id,
            content_id = call.content_id.as_deref().unwrap_or("-"),
            "extraction requested"
        );

        let session = match self.gate(element) {
            Gate::Proceed { session } => session,
            Gate::Done(result, source) => {
                debug!(correlation_id = %call.correlation_id, ?source, "served without running strategies");
                return self.finish(&call, result, source, Vec::new(), None);
            }
        };

        if options.prefer_content_cache {
            if let Some(hit) = call
                .content_id
                .as_deref()
                .and_then(|id| self.content_cache.get(id))
            {
                return self.finish(
                    &call,
                    hit.as_cache_hit("content"),
                    ResultSource::ContentCache,
                    Vec::new(),
                    None,
                );
            }
        }

        let ctx = ExtractionContext::new(element.clone(), options).with_content_info(content_info);
        let middlewares = self.middlewares.read().clone();
        let mut tried = Vec::new();

        if let Some(preferred) = self.preferred_strategy(element, &ctx) {
            let name = preferred.name().to_string();
            debug!(correlation_id = %call.correlation_id, strategy = %name, "trying preferred strategy");

            let outcome = StrategyChain::new(vec![preferred])
                .with_middlewares(middlewares.clone())
                .run(&ctx, &call.correlation_id)
                .await;
            tried.extend(outcome.metrics.attempted_strategies.iter().cloned());

            if outcome.result.success {
                let mut result = outcome.result;
                result.metadata.attempted_strategies = tried.clone();
                let result = self.commit_success(session, element, &ctx, result, &name);
                return self.finish(&call, result, ResultSource::PreferredStrategy, tried, None);
            }

            debug!(strategy = %name, "preferred strategy failed, falling back to full chain");
            self.blacklist(session, &outcome.metrics.failed_strategies);
        }

        let chain = StrategyChain::new(self.active_strategies()).with_middlewares(middlewares);
        let outcome = chain.run(&ctx, &call.correlation_id).await;
        tried.extend(outcome.metrics.attempted_strategies.iter().cloned());
        let duration = outcome.metrics.duration;

        let mut result = outcome.result;
        result.metadata.attempted_strategies = tried.clone();

        if result.success {
            let winner = outcome
                .metrics
                .success_strategy
                .clone()
                .or_else(|| result.metadata.success_strategy.clone())
                .unwrap_or_else(|| result.metadata.strategy_name.clone());
            let result = self.commit_success(session, element, &ctx, result, &winner);
            return self.finish(&call, result, ResultSource::Chain, tried, Some(duration));
        }

        warn!(
            correlation_id = %call.correlation_id,
            failed = ?outcome.metrics.failed_strategies,
            "no strategy produced media"
        );
        self.blacklist(session, &outcome.metrics.failed_strategies);
        self.finish(&call, result, ResultSource::Chain, tried, Some(duration))
    }

    /// Cooldown, success cache and duplicate checks under one lock
    fn gate(&self, element: &ElementRef) -> Gate {
        let mut state = self.state.lock();
        let id = element.id();

        let mut within_cooldown = false;
        if let Some(window) = state.click_cooldown {
            if let Some(last) = state.last_extraction.get(&id).copied() {
                if last.elapsed() < window {
                    within_cooldown = true;
                } else {
                    debug!(element = %id, "cooldown elapsed, dropping cached result");
                    state.last_extraction.remove(&id);
                    state.success_cache.remove(element);
                }
            }
        }

        if let Some(hit) = state.success_cache.get(element) {
            let source = if within_cooldown {
                ResultSource::Cooldown
            } else {
                ResultSource::SuccessCache
            };
            return Gate::Done(hit, source);
        }

        if self.strict_duplicate_guard && state.processed.contains(&id) {
            let error = ExtractionError::duplicate_processing(format!(
                "element {} already processed in session {}",
                id, state.session_id
            ));
            return Gate::Done(
                ExtractionResult::failure(error, "duplicate-guard", "orchestrator"),
                ResultSource::Rejected,
            );
        }

        state.processed.insert(id);
        Gate::Proceed {
            session: state.session_id,
        }
    }

    fn preferred_strategy(
        &self,
        element: &ElementRef,
        ctx: &ExtractionContext,
    ) -> Option<Arc<dyn ExtractionStrategy>> {
        let name = {
            let state = self.state.lock();
            let name = state.strategy_memo.get(element.signature())?;
            if state.blacklist.contains(name) {
                return None;
            }
            name.clone()
        };

        let strategy = self
            .strategies
            .read()
            .iter()
            .find(|s| s.name() == name)
            .cloned()?;
        strategy.can_handle(ctx).then_some(strategy)
    }

    fn active_strategies(&self) -> Vec<Arc<dyn ExtractionStrategy>> {
        let blacklist = self.state.lock().blacklist.clone();
        self.strategies
            .read()
            .iter()
            .filter(|s| !blacklist.contains(s.name()))
            .cloned()
            .collect()
    }

    fn commit_success(
        &self,
        session: u64,
        element: &ElementRef,
        ctx: &ExtractionContext,
        mut result: ExtractionResult,
        winner: &str,
    ) -> ExtractionResult {
        if result.content_info.is_none() {
            result.content_info = ctx.content_info.clone();
        }
        if result.metadata.success_strategy.is_none() {
            result.metadata.success_strategy = Some(winner.to_string());
        }

        let shared = Arc::new(result.clone());
        // content identity outlives sessions
        if let Some(content_id) = result.content_id() {
            self.content_cache.set(content_id, Arc::clone(&shared));
        }

        let mut state = self.state.lock();
        if state.session_id != session {
            debug!(
                element = %element.id(),
                started_in = session,
                current = state.session_id,
                "session changed during extraction, skipping session-scoped writes"
            );
            return result;
        }

        state.success_cache.store(element, shared);
        state.last_extraction.insert(element.id(), Instant::now());
        state
            .strategy_memo
            .insert(element.signature().to_string(), winner.to_string());
        result
    }

    fn blacklist(&self, session: u64, names: &[String]) {
        if names.is_empty() {
            return;
        }
        let mut state = self.state.lock();
        if state.session_id != session {
            return;
        }
        for name in names {
            if state.blacklist.insert(name.clone()) {
                debug!(strategy = %name, session, "strategy blacklisted for session");
            }
        }
    }

    fn finish(
        &self,
        call: &Call,
        result: ExtractionResult,
        source: ResultSource,
        strategies_tried: Vec<String>,
        chain_duration: Option<Duration>,
    ) -> ExtractionResult {
        let content_cache = self.content_cache.metrics();
        let summary = {
            let mut state = self.state.lock();
            state.counters.total_extractions += 1;
            if result.success {
                state.counters.record_source(source);
            } else {
                state.counters.total_failures += 1;
            }
            if let Some(duration) = chain_duration {
                state.counters.record_chain_duration(duration);
            }

            ExtractionSummary {
                correlation_id: call.correlation_id.clone(),
                session_id: state.session_id,
                element_id: call.element_id.as_u64(),
                content_id: call.content_id.clone(),
                outcome: if result.success {
                    Outcome::Success
                } else {
                    Outcome::Failure
                },
                source,
                item_count: result.items.len(),
                strategies_tried,
                success_strategy: result.metadata.success_strategy.clone(),
                error_code: result.errors.first().map(|e| e.code),
                chain_duration_ms: chain_duration.map(as_millis_f64),
                total_elapsed_ms: as_millis_f64(call.started.elapsed()),
                success_cache: state.success_cache.metrics(),
                content_cache,
                counters: state.counters.clone(),
            }
        };

        self.sink.emit(&summary);
        result
    }

    /// Start a new session.
    ///
    /// Clears the blacklist, processed set, strategy memo and cooldown times.
    /// With `None` the whole success cache is dropped; with a list only those
    /// elements are invalidated. The content cache is left alone.
    pub fn begin_new_session(&self, elements_to_invalidate: Option<&[ElementRef]>) {
        let mut state = self.state.lock();
        state.session_id += 1;
        state.counters.sessions_started += 1;
        state.blacklist.clear();
        state.processed.clear();
        state.strategy_memo.clear();
        state.last_extraction.clear();

        match elements_to_invalidate {
            None => state.success_cache.clear(),
            Some(elements) => {
                for element in elements {
                    state.success_cache.remove(element);
                }
            }
        }

        info!(
            session_id = state.session_id,
            retained = state.success_cache.len(),
            "new extraction session"
        );
    }

    /// `None` (or zero) disables the cooldown
    pub fn set_click_cooldown(&self, cooldown: Option<Duration>) {
        self.state.lock().click_cooldown = cooldown.filter(|d| !d.is_zero());
    }

    pub fn set_success_cache_ttl(&self, ttl: Option<Duration>) {
        self.state
            .lock()
            .success_cache
            .set_ttl(ttl.filter(|d| !d.is_zero()));
    }

    /// Change the success cache bound; evicts down to it immediately
    pub fn set_success_result_cache_max_entries(&self, max_entries: Option<usize>) {
        self.state.lock().success_cache.set_max_entries(max_entries);
    }

    pub fn get_metrics(&self) -> OrchestratorMetrics {
        let content_cache = self.content_cache.metrics();
        let strategies = self.strategy_names();
        let state = self.state.lock();
        OrchestratorMetrics {
            session_id: state.session_id,
            strategies,
            blacklisted_strategies: state.blacklist.iter().cloned().collect(),
            processed_elements: state.processed.len(),
            remembered_signatures: state.strategy_memo.len(),
            click_cooldown_ms: state.click_cooldown.map(|d| d.as_millis() as u64),
            counters: state.counters.clone(),
            success_cache: state.success_cache.metrics(),
            content_cache,
        }
    }

    /// Full reset of transient state, both caches and every counter.
    /// The session id is kept.
    pub fn clear_cache(&self) {
        self.content_cache.clear();
        self.content_cache.reset_metrics();

        let mut state = self.state.lock();
        state.blacklist.clear();
        state.processed.clear();
        state.strategy_memo.clear();
        state.last_extraction.clear();
        state.success_cache.clear();
        state.success_cache.reset_metrics();
        state.counters = OrchestratorCounters::default();
        debug!("orchestrator caches cleared");
    }

    pub fn content_cache(&self) -> &ResultCache {
        &self.content_cache
    }

    /// Forget everything recorded for an element the UI has disposed
    pub fn release_element(&self, element: &ElementRef) {
        let mut state = self.state.lock();
        state.success_cache.remove(element);
        state.processed.remove(&element.id());
        state.last_extraction.remove(&element.id());
    }

    pub fn is_processed(&self, element: &ElementRef) -> bool {
        self.state.lock().processed.contains(&element.id())
    }

    pub fn session_id(&self) -> u64 {
        self.state.lock().session_id
    }

    /// Stop background work (the content cache purge timer)
    pub fn dispose(&self) {
        self.content_cache.dispose();
    }
}

impl Default for MediaExtractionOrchestrator {
    fn default() -> Self {
        Self::from_config(OrchestratorConfig::default())
    }
}

fn as_millis_f64(duration: Duration) -> f64 {
    duration.as_secs_f64() * 1000.0
}
