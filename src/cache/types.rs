use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Answers shorter than this (after trimming) are never cached.
pub const MIN_CACHEABLE_CHARS: usize = 60;

/// Lower bound applied to any configured TTL.
pub const MIN_TTL_SECS: u64 = 60;

/// Upper bound applied to any configured TTL (365 days).
pub const MAX_TTL_SECS: u64 = 365 * 24 * 60 * 60;

// ---------------------------------------------------------------------------
// Write request
// ---------------------------------------------------------------------------

/// Fields of an answer to store under its fingerprint.
#[derive(Debug, Clone)]
pub struct CacheWrite<'a> {
    pub kind: &'a str,
    pub prompt: &'a str,
    pub locale: &'a str,
    pub response_text: &'a str,
    pub model: &'a str,
    pub source: &'a str,
    pub tokens_in: u32,
    pub tokens_out: u32,
    pub usd_cost: f64,
}

/// Outcome of [`ResponseCache::set`](super::ResponseCache::set).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheWriteOutcome {
    Stored,
    TooShort,
}

// ---------------------------------------------------------------------------
// Stats (atomic counters + per-kind hits)
// ---------------------------------------------------------------------------

/// Runtime cache statistics.
#[derive(Default)]
pub struct CacheStats {
    pub hits: AtomicU64,
    pub misses: AtomicU64,
    pub writes: AtomicU64,
    pub rejected_short: AtomicU64,
    hits_by_kind: Mutex<HashMap<String, u64>>,
}

impl CacheStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_hit(&self, kind: &str) {
        self.hits.fetch_add(1, Ordering::Relaxed);
        let mut by_kind = self.hits_by_kind.lock().expect("stats mutex poisoned");
        *by_kind.entry(kind.to_string()).or_default() += 1;
    }

    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_write(&self) {
        self.writes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rejected_short(&self) {
        self.rejected_short.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> CacheStatsSnapshot {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        let hit_rate = if total > 0 {
            hits as f64 / total as f64
        } else {
            0.0
        };
        let hits_by_kind = self
            .hits_by_kind
            .lock()
            .expect("stats mutex poisoned")
            .iter()
            .map(|(kind, count)| (kind.clone(), *count))
            .collect();
        CacheStatsSnapshot {
            hits,
            misses,
            writes: self.writes.load(Ordering::Relaxed),
            rejected_short: self.rejected_short.load(Ordering::Relaxed),
            hit_rate,
            hits_by_kind,
        }
    }
}

/// Serializable snapshot of cache statistics.
#[derive(Debug, Clone, Serialize)]
pub struct CacheStatsSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub writes: u64,
    pub rejected_short: u64,
    pub hit_rate: f64,
    pub hits_by_kind: BTreeMap<String, u64>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
