//! # Success-Result Cache
//!
//! Element-keyed cache of the last successful result. Entries hold only a
//! weak handle to the element, so a cached result never keeps a UI element
//! alive. Eviction is driven by an insertion-order queue; a queue slot is
//! stale once its element was evicted or stored again, and stale slots are
//! skipped instead of evicting an unrelated entry.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;
use tracing::debug;

use crate::extraction::element::{ElementId, ElementRef, WeakElement};
use crate::extraction::models::ExtractionResult;

/// Why an entry left the cache
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvictionKind {
    Lru,
    Ttl,
    /// The element itself was released by its owner
    Dropped,
}

/// Snapshot of success cache counters
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SuccessCacheMetrics {
    pub size: usize,
    pub max_entries: Option<usize>,
    pub ttl_ms: Option<u64>,
    pub hits: u64,
    pub misses: u64,
    pub hit_ratio: f64,
    pub lru_evictions: u64,
    pub ttl_evictions: u64,
    pub dropped: u64,
}

struct SuccessEntry {
    element: WeakElement,
    result: Arc<ExtractionResult>,
    stored_at: Instant,
    seq: u64,
}

/// Element-keyed, weakly owned success cache.
///
/// Not internally synchronized; the orchestrator guards it with its own lock.
pub struct SuccessResultCache {
    entries: HashMap<ElementId, SuccessEntry>,
    order: VecDeque<(ElementId, u64)>,
    max_entries: Option<usize>,
    ttl: Option<Duration>,
    next_seq: u64,
    hits: u64,
    misses: u64,
    lru_evictions: u64,
    ttl_evictions: u64,
    dropped: u64,
}

impl SuccessResultCache {
    pub fn new(max_entries: Option<usize>, ttl: Option<Duration>) -> Self {
        Self {
            entries: HashMap::new(),
            order: VecDeque::new(),
            max_entries,
            ttl,
            next_seq: 0,
            hits: 0,
            misses: 0,
            lru_evictions: 0,
            ttl_evictions: 0,
            dropped: 0,
        }
    }

    /// Store the result for `element`, evicting down to the bound afterwards
    pub fn store(&mut self, element: &ElementRef, result: Arc<ExtractionResult>) {
        self.prune_dropped();

        self.next_seq += 1;
        let seq = self.next_seq;
        self.entries.insert(
            element.id(),
            SuccessEntry {
                element: element.downgrade(),
                result,
                stored_at: Instant::now(),
                seq,
            },
        );
        self.order.push_back((element.id(), seq));

        self.enforce_bound();
        self.compact_order();
    }

    /// Live result for `element`, marked as a cache hit
    pub fn get(&mut self, element: &ElementRef) -> Option<ExtractionResult> {
        let id = element.id();
        let Some(entry) = self.entries.get(&id) else {
            self.misses += 1;
            return None;
        };

        if let Some(ttl) = self.ttl {
            if entry.stored_at.elapsed() > ttl {
                self.entries.remove(&id);
                self.misses += 1;
                self.record(EvictionKind::Ttl, id);
                return None;
            }
        }

        self.hits += 1;
        Some(entry.result.as_cache_hit("success"))
    }

    /// Presence check that touches neither TTL nor counters
    pub fn contains(&self, element: &ElementRef) -> bool {
        self.entries.contains_key(&element.id())
    }

    pub fn remove(&mut self, element: &ElementRef) -> bool {
        self.remove_id(element.id())
    }

    pub fn remove_id(&mut self, id: ElementId) -> bool {
        // queue slots for this id become stale and are skipped later
        self.entries.remove(&id).is_some()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
    }

    /// Change the entry bound, evicting down to it immediately
    pub fn set_max_entries(&mut self, max_entries: Option<usize>) {
        self.max_entries = max_entries;
        self.enforce_bound();
        self.compact_order();
    }

    pub fn set_ttl(&mut self, ttl: Option<Duration>) {
        self.ttl = ttl;
    }

    pub fn max_entries(&self) -> Option<usize> {
        self.max_entries
    }

    pub fn ttl(&self) -> Option<Duration> {
        self.ttl
    }

    /// Reclaim entries whose element has been released. Returns the count.
    pub fn prune_dropped(&mut self) -> usize {
        let dead: Vec<ElementId> = self
            .entries
            .iter()
            .filter(|(_, entry)| !entry.element.is_alive())
            .map(|(id, _)| *id)
            .collect();

        for id in &dead {
            self.entries.remove(id);
            self.record(EvictionKind::Dropped, *id);
        }
        dead.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn metrics(&self) -> SuccessCacheMetrics {
        let lookups = self.hits + self.misses;
        SuccessCacheMetrics {
            size: self.entries.len(),
            max_entries: self.max_entries,
            ttl_ms: self.ttl.map(|ttl| ttl.as_millis() as u64),
            hits: self.hits,
            misses: self.misses,
            hit_ratio: if lookups > 0 {
                self.hits as f64 / lookups as f64
            } else {
                0.0
            },
            lru_evictions: self.lru_evictions,
            ttl_evictions: self.ttl_evictions,
            dropped: self.dropped,
        }
    }

    pub fn reset_metrics(&mut self) {
        self.hits = 0;
        self.misses = 0;
        self.lru_evictions = 0;
        self.ttl_evictions = 0;
        self.dropped = 0;
    }

    fn enforce_bound(&mut self) {
        let Some(max) = self.max_entries else {
            return;
        };

        while self.entries.len() > max {
            let Some((id, seq)) = self.order.pop_front() else {
                break;
            };
            let genuine = self.entries.get(&id).is_some_and(|entry| entry.seq == seq);
            if !genuine {
                continue;
            }
            if let Some(entry) = self.entries.remove(&id) {
                let kind = if entry.element.is_alive() {
                    EvictionKind::Lru
                } else {
                    EvictionKind::Dropped
                };
                self.record(kind, id);
            }
        }
    }

    /// Drop stale queue slots once they dominate the queue
    fn compact_order(&mut self) {
        if self.order.len() <= self.entries.len() * 2 + 16 {
            return;
        }
        let entries = &self.entries;
        self.order
            .retain(|(id, seq)| entries.get(id).is_some_and(|entry| entry.seq == *seq));
    }

    fn record(&mut self, kind: EvictionKind, id: ElementId) {
        match kind {
            EvictionKind::Lru => self.lru_evictions += 1,
            EvictionKind::Ttl => self.ttl_evictions += 1,
            EvictionKind::Dropped => self.dropped += 1,
        }
        debug!(element = %id, ?kind, "success cache eviction");
    }
}

impl Default for SuccessResultCache {
    fn default() -> Self {
        Self::new(None, None)
    }
}
