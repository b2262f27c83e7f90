//! In-memory repository backend.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};

use super::types::{CacheEntry, CacheKeyInfo, StoredRouterConfig, UsageRecord, clamp_limits};
use super::{CacheRepository, SettingsRepository, StoreFuture, UsageRepository};
use crate::router::policy::RouterMode;

/// Audit row for a mode or limit change.
#[derive(Debug, Clone, PartialEq)]
pub enum SettingsChange {
    Mode { mode: RouterMode, actor: String },
    Limits { soft: f64, hard: f64, actor: String },
}

#[derive(Debug, Default)]
struct MemoryState {
    usage: Vec<UsageRecord>,
    cache: HashMap<String, CacheEntry>,
    config: Option<StoredRouterConfig>,
    changes: Vec<SettingsChange>,
}

/// In-memory implementation of all three repositories.
///
/// Uses `Arc<RwLock<..>>` so clones share state. Useful for tests and for
/// embedding the router without a database file.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<MemoryState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every usage record, in insertion order.
    pub fn usage_records(&self) -> Vec<UsageRecord> {
        self.inner.read().expect("lock poisoned").usage.clone()
    }

    /// Number of cache rows currently held, expired or not.
    pub fn cache_len(&self) -> usize {
        self.inner.read().expect("lock poisoned").cache.len()
    }

    /// Snapshot of the settings audit trail.
    pub fn settings_changes(&self) -> Vec<SettingsChange> {
        self.inner.read().expect("lock poisoned").changes.clone()
    }
}

impl UsageRepository for MemoryStore {
    fn record_usage<'a>(&'a self, record: &'a UsageRecord) -> StoreFuture<'a, ()> {
        let mut guard = self.inner.write().expect("lock poisoned");
        guard.usage.push(record.clone());
        Box::pin(std::future::ready(Ok(())))
    }

    fn usage_total_since(&self, since: DateTime<Utc>) -> StoreFuture<'_, f64> {
        let guard = self.inner.read().expect("lock poisoned");
        let total = guard
            .usage
            .iter()
            .filter(|r| r.ts >= since)
            .map(|r| r.usd_cost)
            .sum();
        Box::pin(std::future::ready(Ok(total)))
    }

    fn usage_since(&self, since: DateTime<Utc>) -> StoreFuture<'_, Vec<UsageRecord>> {
        let guard = self.inner.read().expect("lock poisoned");
        let mut rows: Vec<_> = guard.usage.iter().filter(|r| r.ts >= since).cloned().collect();
        rows.sort_by_key(|r| r.ts);
        Box::pin(std::future::ready(Ok(rows)))
    }

    fn usage_history(&self, limit: usize) -> StoreFuture<'_, Vec<UsageRecord>> {
        let guard = self.inner.read().expect("lock poisoned");
        // Stable sort keeps later inserts first among equal timestamps.
        let mut rows: Vec<_> = guard.usage.iter().rev().cloned().collect();
        rows.sort_by(|a, b| b.ts.cmp(&a.ts));
        rows.truncate(limit);
        Box::pin(std::future::ready(Ok(rows)))
    }
}

impl CacheRepository for MemoryStore {
    fn get_by_key<'a>(
        &'a self,
        key: &'a str,
        now: DateTime<Utc>,
    ) -> StoreFuture<'a, Option<CacheEntry>> {
        let mut guard = self.inner.write().expect("lock poisoned");
        let entry = match guard.cache.get(key) {
            Some(entry) if entry.is_expired(now) => {
                guard.cache.remove(key);
                None
            }
            other => other.cloned(),
        };
        Box::pin(std::future::ready(Ok(entry)))
    }

    fn upsert<'a>(&'a self, entry: &'a CacheEntry) -> StoreFuture<'a, ()> {
        let mut guard = self.inner.write().expect("lock poisoned");
        guard.cache.insert(entry.cache_key.clone(), entry.clone());
        Box::pin(std::future::ready(Ok(())))
    }

    fn purge_expired(&self, now: DateTime<Utc>) -> StoreFuture<'_, u64> {
        let mut guard = self.inner.write().expect("lock poisoned");
        let before = guard.cache.len();
        guard.cache.retain(|_, entry| !entry.is_expired(now));
        let removed = (before - guard.cache.len()) as u64;
        Box::pin(std::future::ready(Ok(removed)))
    }

    fn recent_keys(&self, limit: usize) -> StoreFuture<'_, Vec<CacheKeyInfo>> {
        let guard = self.inner.read().expect("lock poisoned");
        let mut keys: Vec<_> = guard
            .cache
            .values()
            .map(|entry| CacheKeyInfo {
                key: entry.cache_key.clone(),
                kind: entry.kind.clone(),
                locale: entry.locale.clone(),
                model: entry.model.clone(),
                expires_at: entry.expires_at,
            })
            .collect();
        keys.sort_by(|a, b| b.expires_at.cmp(&a.expires_at).then_with(|| a.key.cmp(&b.key)));
        keys.truncate(limit);
        Box::pin(std::future::ready(Ok(keys)))
    }
}

impl SettingsRepository for MemoryStore {
    fn ensure_router_config<'a>(
        &'a self,
        defaults: &'a StoredRouterConfig,
    ) -> StoreFuture<'a, StoredRouterConfig> {
        let mut guard = self.inner.write().expect("lock poisoned");
        let mut config = guard.config.unwrap_or(*defaults);
        if config.hard_limit < config.soft_limit {
            config.hard_limit = config.soft_limit.max(defaults.hard_limit);
        }
        let (soft, hard) = clamp_limits(config.soft_limit, config.hard_limit);
        config.soft_limit = soft;
        config.hard_limit = hard;
        guard.config = Some(config);

        if guard.changes.is_empty() {
            guard.changes.push(SettingsChange::Mode {
                mode: config.mode,
                actor: "bootstrap".to_string(),
            });
            guard.changes.push(SettingsChange::Limits {
                soft,
                hard,
                actor: "bootstrap".to_string(),
            });
        }
        Box::pin(std::future::ready(Ok(config)))
    }

    fn save_mode<'a>(&'a self, mode: RouterMode, actor: &'a str) -> StoreFuture<'a, ()> {
        let mut guard = self.inner.write().expect("lock poisoned");
        let current = guard.config.get_or_insert(StoredRouterConfig {
            mode,
            soft_limit: 0.0,
            hard_limit: 0.0,
        });
        current.mode = mode;
        guard.changes.push(SettingsChange::Mode {
            mode,
            actor: actor.to_string(),
        });
        Box::pin(std::future::ready(Ok(())))
    }

    fn save_limits<'a>(&'a self, soft: f64, hard: f64, actor: &'a str) -> StoreFuture<'a, ()> {
        let mut guard = self.inner.write().expect("lock poisoned");
        let current = guard.config.get_or_insert(StoredRouterConfig {
            mode: RouterMode::Auto,
            soft_limit: soft,
            hard_limit: hard,
        });
        current.soft_limit = soft;
        current.hard_limit = hard;
        guard.changes.push(SettingsChange::Limits {
            soft,
            hard,
            actor: actor.to_string(),
        });
        Box::pin(std::future::ready(Ok(())))
    }
}
