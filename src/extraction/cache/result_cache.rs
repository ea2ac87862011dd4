//! # Result Cache
//!
//! Content-keyed cache of extraction results with two independent eviction
//! policies: capacity (least-recently-used) and time (TTL). Expired entries
//! are dropped lazily on lookup and eagerly by `purge_stale`, which can run
//! on a background timer.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::extraction::config::ResultCacheConfig;
use crate::extraction::models::ExtractionResult;

/// Outcome of a lookup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheStatus {
    /// Entry found and still fresh
    Hit,
    /// No entry for the key
    Miss,
    /// Entry was present but had expired; it has been removed
    Expired,
}

/// Snapshot of result cache counters
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ResultCacheMetrics {
    pub hits: u64,
    pub misses: u64,
    pub lru_evictions: u64,
    pub ttl_evictions: u64,
    pub size: usize,
    pub hit_ratio: f64,
    pub ttl_ms: u64,
    pub capacity: usize,
    pub purge_runs: u64,
    pub purged_entries: u64,
    pub timer_active: bool,
}

struct Entry {
    value: Arc<ExtractionResult>,
    expires_at: Instant,
    tick: u64,
}

#[derive(Default)]
struct State {
    entries: HashMap<String, Entry>,
    /// access tick -> key, oldest first
    recency: BTreeMap<u64, String>,
    next_tick: u64,
    hits: u64,
    misses: u64,
    lru_evictions: u64,
    ttl_evictions: u64,
    purge_runs: u64,
    purged_entries: u64,
}

impl State {
    fn bump(&mut self) -> u64 {
        self.next_tick += 1;
        self.next_tick
    }

    fn lookup(&mut self, key: &str, now: Instant) -> (CacheStatus, Option<Arc<ExtractionResult>>) {
        let Some(entry) = self.entries.get(key) else {
            self.misses += 1;
            return (CacheStatus::Miss, None);
        };

        if now > entry.expires_at {
            let old_tick = entry.tick;
            self.entries.remove(key);
            self.recency.remove(&old_tick);
            self.misses += 1;
            self.ttl_evictions += 1;
            return (CacheStatus::Expired, None);
        }

        let old_tick = entry.tick;
        let value = Arc::clone(&entry.value);
        let tick = self.bump();
        self.recency.remove(&old_tick);
        self.recency.insert(tick, key.to_string());
        if let Some(entry) = self.entries.get_mut(key) {
            entry.tick = tick;
        }
        self.hits += 1;
        (CacheStatus::Hit, Some(value))
    }

    fn insert(&mut self, key: String, value: Arc<ExtractionResult>, expires_at: Instant, capacity: usize) {
        let tick = self.bump();
        if let Some(previous) = self.entries.insert(
            key.clone(),
            Entry {
                value,
                expires_at,
                tick,
            },
        ) {
            self.recency.remove(&previous.tick);
        }
        self.recency.insert(tick, key);

        while self.entries.len() > capacity {
            let Some((_, oldest)) = self.recency.pop_first() else {
                break;
            };
            self.entries.remove(&oldest);
            self.lru_evictions += 1;
            debug!(key = %oldest, "result cache LRU eviction");
        }
    }

    fn remove(&mut self, key: &str) -> bool {
        match self.entries.remove(key) {
            Some(entry) => {
                self.recency.remove(&entry.tick);
                true
            }
            None => false,
        }
    }

    fn purge_expired(&mut self, now: Instant) -> usize {
        let expired: Vec<(String, u64)> = self
            .entries
            .iter()
            .filter(|(_, entry)| now > entry.expires_at)
            .map(|(key, entry)| (key.clone(), entry.tick))
            .collect();

        for (key, tick) in &expired {
            self.entries.remove(key);
            self.recency.remove(tick);
        }

        let purged = expired.len();
        self.ttl_evictions += purged as u64;
        self.purged_entries += purged as u64;
        self.purge_runs += 1;
        purged
    }
}

/// Content-keyed LRU + TTL cache
pub struct ResultCache {
    state: Arc<Mutex<State>>,
    capacity: usize,
    ttl: Duration,
    purge_interval: Duration,
    purge_token: Mutex<Option<CancellationToken>>,
}

impl ResultCache {
    pub fn new(config: &ResultCacheConfig) -> Self {
        Self {
            state: Arc::new(Mutex::new(State::default())),
            capacity: config.capacity.max(1),
            ttl: config.ttl(),
            purge_interval: config.purge_interval(),
            purge_token: Mutex::new(None),
        }
    }

    pub fn with_limits(capacity: usize, ttl: Duration) -> Self {
        Self::new(
            &ResultCacheConfig::default()
                .with_capacity(capacity)
                .with_ttl(ttl),
        )
    }

    /// Fetch a fresh entry, refreshing its recency
    pub fn get(&self, key: &str) -> Option<Arc<ExtractionResult>> {
        self.state.lock().lookup(key, Instant::now()).1
    }

    /// Same bookkeeping as `get`, returning only the classification
    pub fn get_status(&self, key: &str) -> CacheStatus {
        self.state.lock().lookup(key, Instant::now()).0
    }

    pub fn set(&self, key: impl Into<String>, value: Arc<ExtractionResult>) {
        let expires_at = Instant::now() + self.ttl;
        self.state
            .lock()
            .insert(key.into(), value, expires_at, self.capacity);
    }

    /// Presence check without touching recency or counters
    pub fn contains(&self, key: &str) -> bool {
        self.state.lock().entries.contains_key(key)
    }

    pub fn remove(&self, key: &str) -> bool {
        self.state.lock().remove(key)
    }

    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.entries.clear();
        state.recency.clear();
    }

    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove every expired entry now. Returns how many were removed.
    pub fn purge_stale(&self) -> usize {
        self.state.lock().purge_expired(Instant::now())
    }

    pub fn purge_interval(&self) -> Duration {
        self.purge_interval
    }

    /// Start the background purge task on the current tokio runtime.
    ///
    /// Returns false when no runtime is available. The task only holds a weak
    /// reference to the cache state.
    pub fn start_purge_timer(&self) -> bool {
        let mut slot = self.purge_token.lock();
        if slot.as_ref().is_some_and(|token| !token.is_cancelled()) {
            return true;
        }

        let handle = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                warn!("no tokio runtime, result cache purge timer not started");
                return false;
            }
        };

        let token = CancellationToken::new();
        let cancelled = token.clone();
        let state = Arc::downgrade(&self.state);
        let period = self.purge_interval;
        handle.spawn(purge_loop(state, period, cancelled));

        debug!(interval_ms = period.as_millis() as u64, "result cache purge timer started");
        *slot = Some(token);
        true
    }

    /// Cancel the background purge task, if any
    pub fn dispose(&self) {
        if let Some(token) = self.purge_token.lock().take() {
            token.cancel();
            debug!("result cache purge timer stopped");
        }
    }

    pub fn timer_active(&self) -> bool {
        self.purge_token
            .lock()
            .as_ref()
            .is_some_and(|token| !token.is_cancelled())
    }

    pub fn metrics(&self) -> ResultCacheMetrics {
        let timer_active = self.timer_active();
        let state = self.state.lock();
        let lookups = state.hits + state.misses;
        ResultCacheMetrics {
            hits: state.hits,
            misses: state.misses,
            lru_evictions: state.lru_evictions,
            ttl_evictions: state.ttl_evictions,
            size: state.entries.len(),
            hit_ratio: if lookups > 0 {
                state.hits as f64 / lookups as f64
            } else {
                0.0
            },
            ttl_ms: self.ttl.as_millis() as u64,
            capacity: self.capacity,
            purge_runs: state.purge_runs,
            purged_entries: state.purged_entries,
            timer_active,
        }
    }

    /// Reset hit/miss/eviction counters, keeping entries
    pub fn reset_metrics(&self) {
        let mut state = self.state.lock();
        state.hits = 0;
        state.misses = 0;
        state.lru_evictions = 0;
        state.ttl_evictions = 0;
        state.purge_runs = 0;
        state.purged_entries = 0;
    }
}

impl Drop for ResultCache {
    fn drop(&mut self) {
        self.dispose();
    }
}

async fn purge_loop(state: Weak<Mutex<State>>, period: Duration, cancelled: CancellationToken) {
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancelled.cancelled() => break,
            _ = ticker.tick() => {
                let Some(state) = state.upgrade() else {
                    break;
                };
                let purged = state.lock().purge_expired(Instant::now());
                if purged > 0 {
                    debug!(purged, "result cache purged stale entries");
                }
            }
        }
    }
}
