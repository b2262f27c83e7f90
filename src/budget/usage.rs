use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use serde::Serialize;

use super::ledger::{BudgetLedger, Clock};
use crate::store::{StoreError, UsageRecord, UsageRepository};

pub const SOURCE_CACHE: &str = "cache";

// ---------------------------------------------------------------------------
// UsageCounters (in-process metrics)
// ---------------------------------------------------------------------------

/// Process-local request, token and cost counters.
///
/// Token and hit totals are lock-free atomics. Tagged counters and the cost
/// accumulator sit behind a mutex.
#[derive(Default)]
pub struct UsageCounters {
    tokens_in: AtomicU64,
    tokens_out: AtomicU64,
    tagged: Mutex<TaggedCounters>,
}

#[derive(Default)]
struct TaggedCounters {
    requests: HashMap<(String, String, String), u64>,
    cache_hits: HashMap<String, u64>,
    cost_usd: f64,
}

impl UsageCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&self, record: &UsageRecord) {
        self.tokens_in
            .fetch_add(u64::from(record.tokens_in), Ordering::Relaxed);
        self.tokens_out
            .fetch_add(u64::from(record.tokens_out), Ordering::Relaxed);

        let mut tagged = self.tagged.lock().expect("counters mutex poisoned");
        *tagged
            .requests
            .entry((
                record.source.clone(),
                record.kind.clone(),
                record.model.clone(),
            ))
            .or_default() += 1;
        if record.usd_cost > 0.0 {
            tagged.cost_usd += record.usd_cost;
        }
        if record.source == SOURCE_CACHE {
            *tagged.cache_hits.entry(record.kind.clone()).or_default() += 1;
        }
    }

    pub fn snapshot(&self) -> UsageCountersSnapshot {
        let tagged = self.tagged.lock().expect("counters mutex poisoned");
        let mut requests: Vec<RequestCount> = tagged
            .requests
            .iter()
            .map(|((source, kind, model), count)| RequestCount {
                source: source.clone(),
                kind: kind.clone(),
                model: model.clone(),
                count: *count,
            })
            .collect();
        requests.sort_by(|a, b| {
            (&a.source, &a.kind, &a.model).cmp(&(&b.source, &b.kind, &b.model))
        });

        let cache_hits: BTreeMap<String, u64> = tagged
            .cache_hits
            .iter()
            .map(|(kind, count)| (kind.clone(), *count))
            .collect();

        UsageCountersSnapshot {
            requests_total: requests.iter().map(|r| r.count).sum(),
            requests,
            tokens_in: self.tokens_in.load(Ordering::Relaxed),
            tokens_out: self.tokens_out.load(Ordering::Relaxed),
            cost_usd: tagged.cost_usd,
            cache_hits,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RequestCount {
    pub source: String,
    pub kind: String,
    pub model: String,
    pub count: u64,
}

/// Serializable snapshot of [`UsageCounters`].
#[derive(Debug, Clone, Serialize)]
pub struct UsageCountersSnapshot {
    pub requests_total: u64,
    pub requests: Vec<RequestCount>,
    pub tokens_in: u64,
    pub tokens_out: u64,
    pub cost_usd: f64,
    pub cache_hits: BTreeMap<String, u64>,
}

// ---------------------------------------------------------------------------
// UsageRecorder
// ---------------------------------------------------------------------------

/// Fields of a served request; the recorder stamps the timestamp.
#[derive(Debug, Clone)]
pub struct UsageEntry {
    pub user_id: Option<i64>,
    pub kind: String,
    pub model: String,
    pub source: String,
    pub tokens_in: u32,
    pub tokens_out: u32,
    pub usd_cost: f64,
}

/// Single path through which served answers reach the usage log, the
/// counters and the ledger.
pub struct UsageRecorder {
    repo: Arc<dyn UsageRepository>,
    ledger: Arc<BudgetLedger>,
    counters: Arc<UsageCounters>,
    clock: Arc<dyn Clock>,
}

impl UsageRecorder {
    pub fn new(
        repo: Arc<dyn UsageRepository>,
        ledger: Arc<BudgetLedger>,
        counters: Arc<UsageCounters>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            repo,
            ledger,
            counters,
            clock,
        }
    }

    /// Persist a paid usage record and charge its cost to the ledger.
    ///
    /// The ledger is charged even when the write fails: the money was spent
    /// either way. The write error is still returned.
    pub async fn record(&self, entry: UsageEntry) -> Result<UsageRecord, StoreError> {
        let record = self.stamp(entry);
        let persisted = self.repo.record_usage(&record).await;
        self.ledger.register(record.usd_cost);
        if let Err(err) = persisted {
            tracing::error!(
                kind = %record.kind,
                model = %record.model,
                cost = record.usd_cost,
                error = %err,
                "Failed to persist usage record"
            );
            return Err(err);
        }
        self.counters.observe(&record);
        Ok(record)
    }

    /// Zero-cost record for an answer served from the cache.
    pub async fn record_cache_hit(
        &self,
        kind: &str,
        model: &str,
        user_id: Option<i64>,
    ) -> Result<UsageRecord, StoreError> {
        self.record_zero_cost(kind, model, SOURCE_CACHE, user_id).await
    }

    /// Zero-cost record for template, local and fallback answers. Never
    /// touches the ledger.
    pub async fn record_zero_cost(
        &self,
        kind: &str,
        model: &str,
        source: &str,
        user_id: Option<i64>,
    ) -> Result<UsageRecord, StoreError> {
        let record = self.stamp(UsageEntry {
            user_id,
            kind: kind.to_string(),
            model: model.to_string(),
            source: source.to_string(),
            tokens_in: 0,
            tokens_out: 0,
            usd_cost: 0.0,
        });
        self.repo.record_usage(&record).await?;
        self.counters.observe(&record);
        Ok(record)
    }

    pub fn counters(&self) -> &UsageCounters {
        &self.counters
    }

    fn stamp(&self, entry: UsageEntry) -> UsageRecord {
        UsageRecord {
            ts: self.clock.now(),
            user_id: entry.user_id,
            model: entry.model,
            kind: entry.kind,
            source: entry.source,
            tokens_in: entry.tokens_in,
            tokens_out: entry.tokens_out,
            usd_cost: if entry.usd_cost > 0.0 { entry.usd_cost } else { 0.0 },
        }
    }
}
