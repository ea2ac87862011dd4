// Orchestrator and cache configuration
//
// All durations are stored as milliseconds so configs round-trip through JSON.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::errors::ConfigError;

/// Lower bound for the default background purge interval
pub const MIN_PURGE_INTERVAL_MS: u64 = 5_000;

/// Configuration for the content-keyed result cache
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResultCacheConfig {
    /// Maximum number of entries before LRU eviction
    pub capacity: usize,
    /// Entry lifetime in milliseconds
    pub ttl_ms: u64,
    /// Background sweep interval; `None` means `max(5000, ttl / 2)`
    pub purge_interval_ms: Option<u64>,
    /// Start the background sweep when the owning orchestrator is created
    pub auto_purge: bool,
}

impl Default for ResultCacheConfig {
    fn default() -> Self {
        Self {
            capacity: 200,
            ttl_ms: 60_000,
            purge_interval_ms: None,
            auto_purge: true,
        }
    }
}

impl ResultCacheConfig {
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl_ms = ttl.as_millis() as u64;
        self
    }

    pub fn with_purge_interval(mut self, interval: Duration) -> Self {
        self.purge_interval_ms = Some(interval.as_millis() as u64);
        self
    }

    pub fn with_auto_purge(mut self, enabled: bool) -> Self {
        self.auto_purge = enabled;
        self
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_millis(self.ttl_ms)
    }

    /// Effective sweep interval
    pub fn purge_interval(&self) -> Duration {
        let ms = self
            .purge_interval_ms
            .unwrap_or_else(|| MIN_PURGE_INTERVAL_MS.max(self.ttl_ms / 2));
        Duration::from_millis(ms)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.capacity == 0 {
            return Err(ConfigError::Invalid(
                "content_cache.capacity must be greater than zero".to_string(),
            ));
        }
        if self.ttl_ms == 0 {
            return Err(ConfigError::Invalid(
                "content_cache.ttl_ms must be greater than zero".to_string(),
            ));
        }
        if self.purge_interval_ms == Some(0) {
            return Err(ConfigError::Invalid(
                "content_cache.purge_interval_ms must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Configuration for `MediaExtractionOrchestrator`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Repeated interactions within this window reuse the cached result
    pub click_cooldown_ms: Option<u64>,
    /// Lifetime of element-keyed success entries; `None` keeps them until evicted
    pub success_cache_ttl_ms: Option<u64>,
    /// Bound on element-keyed success entries; `None` is unbounded
    pub success_cache_max_entries: Option<usize>,
    /// Content-keyed cache settings
    pub content_cache: ResultCacheConfig,
    /// Refuse to re-process an element already seen this session
    pub strict_duplicate_guard: bool,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            click_cooldown_ms: None,
            success_cache_ttl_ms: None,
            success_cache_max_entries: Some(200),
            content_cache: ResultCacheConfig::default(),
            strict_duplicate_guard: false,
        }
    }
}

impl OrchestratorConfig {
    /// Parse a JSON document; missing fields take their defaults
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_click_cooldown(mut self, cooldown: Option<Duration>) -> Self {
        self.click_cooldown_ms = cooldown.map(|d| d.as_millis() as u64);
        self
    }

    pub fn with_success_cache_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.success_cache_ttl_ms = ttl.map(|d| d.as_millis() as u64);
        self
    }

    pub fn with_success_cache_max_entries(mut self, max_entries: Option<usize>) -> Self {
        self.success_cache_max_entries = max_entries;
        self
    }

    pub fn with_content_cache(mut self, content_cache: ResultCacheConfig) -> Self {
        self.content_cache = content_cache;
        self
    }

    pub fn with_strict_duplicate_guard(mut self, enabled: bool) -> Self {
        self.strict_duplicate_guard = enabled;
        self
    }

    pub fn click_cooldown(&self) -> Option<Duration> {
        self.click_cooldown_ms
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis)
    }

    pub fn success_cache_ttl(&self) -> Option<Duration> {
        self.success_cache_ttl_ms
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.success_cache_max_entries == Some(0) {
            return Err(ConfigError::Invalid(
                "success_cache_max_entries must be greater than zero".to_string(),
            ));
        }
        self.content_cache.validate()
    }
}
