// Per-call summaries and cumulative orchestrator counters

use std::time::Duration;

use serde::Serialize;
use tracing::info;

use super::cache::{ResultCacheMetrics, SuccessCacheMetrics};
use super::errors::ExtractionErrorCode;
use super::traits::SummarySink;

/// Which stage produced the returned result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultSource {
    /// Repeat interaction inside the click-cooldown window
    Cooldown,
    SuccessCache,
    ContentCache,
    PreferredStrategy,
    Chain,
    /// Refused before any strategy ran (strict duplicate guard)
    Rejected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Success,
    Failure,
}

/// Cumulative counters, reset only by `clear_cache`
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct OrchestratorCounters {
    pub sessions_started: u64,
    pub total_extractions: u64,
    pub total_failures: u64,
    pub cooldown_short_circuits: u64,
    pub success_cache_hits: u64,
    pub content_cache_hits: u64,
    pub preferred_strategy_hits: u64,
    pub chain_runs: u64,
    pub average_chain_duration_ms: f64,
    pub max_chain_duration_ms: f64,
}

impl OrchestratorCounters {
    /// Fold one full-chain duration into the running average and maximum
    pub fn record_chain_duration(&mut self, duration: Duration) {
        let ms = duration.as_secs_f64() * 1000.0;
        self.chain_runs += 1;
        self.average_chain_duration_ms +=
            (ms - self.average_chain_duration_ms) / self.chain_runs as f64;
        if ms > self.max_chain_duration_ms {
            self.max_chain_duration_ms = ms;
        }
    }

    pub(crate) fn record_source(&mut self, source: ResultSource) {
        match source {
            ResultSource::Cooldown => self.cooldown_short_circuits += 1,
            ResultSource::SuccessCache => self.success_cache_hits += 1,
            ResultSource::ContentCache => self.content_cache_hits += 1,
            ResultSource::PreferredStrategy => self.preferred_strategy_hits += 1,
            ResultSource::Chain | ResultSource::Rejected => {}
        }
    }
}

/// The single summary emitted for every `extract` call
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExtractionSummary {
    pub correlation_id: String,
    pub session_id: u64,
    pub element_id: u64,
    pub content_id: Option<String>,
    pub outcome: Outcome,
    pub source: ResultSource,
    pub item_count: usize,
    pub strategies_tried: Vec<String>,
    pub success_strategy: Option<String>,
    pub error_code: Option<ExtractionErrorCode>,
    /// Present only when the full chain ran
    pub chain_duration_ms: Option<f64>,
    pub total_elapsed_ms: f64,
    pub success_cache: SuccessCacheMetrics,
    pub content_cache: ResultCacheMetrics,
    pub counters: OrchestratorCounters,
}

/// Point-in-time view of the orchestrator
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrchestratorMetrics {
    pub session_id: u64,
    pub strategies: Vec<String>,
    pub blacklisted_strategies: Vec<String>,
    pub processed_elements: usize,
    pub remembered_signatures: usize,
    pub click_cooldown_ms: Option<u64>,
    pub counters: OrchestratorCounters,
    pub success_cache: SuccessCacheMetrics,
    pub content_cache: ResultCacheMetrics,
}

/// Default sink: one structured `info!` event per call
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSummarySink;

impl SummarySink for TracingSummarySink {
    fn emit(&self, summary: &ExtractionSummary) {
        info!(
            target: crate::telemetry::SUMMARY_TARGET,
            correlation_id = %summary.correlation_id,
            session_id = summary.session_id,
            element_id = summary.element_id,
            content_id = summary.content_id.as_deref().unwrap_or("-"),
            outcome = ?summary.outcome,
            source = ?summary.source,
            items = summary.item_count,
            strategies_tried = ?summary.strategies_tried,
            success_strategy = summary.success_strategy.as_deref().unwrap_or("-"),
            chain_duration_ms = summary.chain_duration_ms,
            total_elapsed_ms = summary.total_elapsed_ms,
            success_cache_size = summary.success_cache.size,
            success_cache_hit_ratio = summary.success_cache.hit_ratio,
            content_cache_size = summary.content_cache.size,
            content_cache_hit_ratio = summary.content_cache.hit_ratio,
            total_extractions = summary.counters.total_extractions,
            total_failures = summary.counters.total_failures,
            "extraction finished"
        );
    }
}
