pub mod key;
pub mod types;

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};

use crate::budget::ledger::Clock;
use crate::store::{CacheEntry, CacheKeyInfo, CacheRepository, StoreError};

use self::types::{
    CacheStats, CacheStatsSnapshot, CacheWrite, CacheWriteOutcome, MAX_TTL_SECS,
    MIN_CACHEABLE_CHARS, MIN_TTL_SECS,
};

// ---------------------------------------------------------------------------
// ResponseCache -- public facade
// ---------------------------------------------------------------------------

/// Content-addressed cache of generated answers.
///
/// Keys are SHA-256 fingerprints of `kind:locale:normalized prompt`. Entries
/// past their expiry are treated as absent and deleted when read.
pub struct ResponseCache {
    repo: Arc<dyn CacheRepository>,
    clock: Arc<dyn Clock>,
    ttl_secs: u64,
    stats: CacheStats,
}

impl ResponseCache {
    pub fn new(repo: Arc<dyn CacheRepository>, clock: Arc<dyn Clock>, ttl_secs: u64) -> Self {
        Self {
            repo,
            clock,
            ttl_secs: ttl_secs.clamp(MIN_TTL_SECS, MAX_TTL_SECS),
            stats: CacheStats::new(),
        }
    }

    pub fn ttl_secs(&self) -> u64 {
        self.ttl_secs
    }

    /// Look up a live entry for the request.
    pub async fn get(
        &self,
        kind: &str,
        prompt: &str,
        locale: &str,
    ) -> Result<Option<CacheEntry>, StoreError> {
        let cache_key = key::fingerprint(kind, locale, prompt);
        let entry = self.repo.get_by_key(&cache_key, self.clock.now()).await?;

        match entry {
            Some(entry) => {
                self.stats.record_hit(kind);
                tracing::debug!(kind, locale, key = %cache_key, "Cache hit");
                Ok(Some(entry))
            }
            None => {
                self.stats.record_miss();
                Ok(None)
            }
        }
    }

    /// Store an answer under its fingerprint with expiry `now + ttl`.
    ///
    /// Answers shorter than [`MIN_CACHEABLE_CHARS`] after trimming are skipped.
    pub async fn set(&self, write: CacheWrite<'_>) -> Result<CacheWriteOutcome, StoreError> {
        if write.response_text.trim().chars().count() < MIN_CACHEABLE_CHARS {
            self.stats.record_rejected_short();
            tracing::debug!(kind = write.kind, "Answer too short to cache");
            return Ok(CacheWriteOutcome::TooShort);
        }

        let now = self.clock.now();
        let expires_at = self.expiry_from(now);
        let entry = CacheEntry {
            cache_key: key::fingerprint(write.kind, write.locale, write.prompt),
            kind: write.kind.to_string(),
            locale: write.locale.to_string(),
            prompt: write.prompt.to_string(),
            response_text: write.response_text.to_string(),
            model: write.model.to_string(),
            source: write.source.to_string(),
            tokens_in: write.tokens_in,
            tokens_out: write.tokens_out,
            usd_cost: write.usd_cost,
            created_at: now,
            expires_at,
        };
        self.repo.upsert(&entry).await?;
        self.stats.record_write();
        Ok(CacheWriteOutcome::Stored)
    }

    fn expiry_from(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        i64::try_from(self.ttl_secs)
            .ok()
            .and_then(Duration::try_seconds)
            .and_then(|ttl| now.checked_add_signed(ttl))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    /// Bulk-delete expired entries.
    pub async fn purge_expired(&self) -> Result<u64, StoreError> {
        let removed = self.repo.purge_expired(self.clock.now()).await?;
        if removed > 0 {
            tracing::info!(removed, "Purged expired cache entries");
        }
        Ok(removed)
    }

    pub async fn recent_keys(&self, limit: usize) -> Result<Vec<CacheKeyInfo>, StoreError> {
        self.repo.recent_keys(limit).await
    }

    pub fn stats(&self) -> CacheStatsSnapshot {
        self.stats.snapshot()
    }
}
