//! Durable storage for usage records, cached responses and router settings.
//!
//! The router only talks to the three repository traits below. Two backends
//! ship with the crate: [`SqliteStore`] over the shared [`Database`] handle,
//! and [`MemoryStore`] for tests and embedding.
//!
//! Methods return boxed futures so the traits stay dyn-compatible
//! (`Arc<dyn UsageRepository>`) without the `async_trait` macro.
//!
//! [`Database`]: crate::db::Database

pub mod memory;
pub mod sqlite;
pub mod types;

use std::future::Future;
use std::pin::Pin;

use chrono::{DateTime, Utc};

pub use self::memory::MemoryStore;
pub use self::sqlite::SqliteStore;
pub use self::types::{CacheEntry, CacheKeyInfo, StoredRouterConfig, UsageRecord, UsageTotal};

use crate::router::policy::RouterMode;

/// Boxed future returned by every repository method.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + Send + 'a>>;

// ---------------------------------------------------------------------------
// StoreError
// ---------------------------------------------------------------------------

/// Errors raised by repository backends.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Corrupt row: {0}")]
    Corrupt(String),

    #[error("{0}")]
    Other(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Database(err.to_string())
    }
}

// ---------------------------------------------------------------------------
// Repository traits
// ---------------------------------------------------------------------------

/// Append-only usage log plus the bulk queries used for reporting.
pub trait UsageRepository: Send + Sync {
    /// Persist one usage record.
    fn record_usage<'a>(&'a self, record: &'a UsageRecord) -> StoreFuture<'a, ()>;

    /// Sum of `usd_cost` for records at or after `since`.
    fn usage_total_since(&self, since: DateTime<Utc>) -> StoreFuture<'_, f64>;

    /// All records at or after `since`, oldest first.
    fn usage_since(&self, since: DateTime<Utc>) -> StoreFuture<'_, Vec<UsageRecord>>;

    /// The `limit` most recent records, newest first.
    fn usage_history(&self, limit: usize) -> StoreFuture<'_, Vec<UsageRecord>>;
}

/// Content-addressed response cache rows.
pub trait CacheRepository: Send + Sync {
    /// Fetch a live entry. An entry expired at `now` is deleted and reported
    /// as absent.
    fn get_by_key<'a>(&'a self, key: &'a str, now: DateTime<Utc>)
    -> StoreFuture<'a, Option<CacheEntry>>;

    /// Insert or overwrite the entry with the same `cache_key`.
    fn upsert<'a>(&'a self, entry: &'a CacheEntry) -> StoreFuture<'a, ()>;

    /// Delete every entry expired at `now`, returning how many were removed.
    fn purge_expired(&self, now: DateTime<Utc>) -> StoreFuture<'_, u64>;

    /// Most recently expiring keys first.
    fn recent_keys(&self, limit: usize) -> StoreFuture<'_, Vec<CacheKeyInfo>>;
}

/// Router mode and spend limits, with an actor-tagged audit trail.
pub trait SettingsRepository: Send + Sync {
    /// Load the persisted configuration, filling gaps from `defaults`, and
    /// write the merged result back. The first call also seeds the audit
    /// trail with a `bootstrap` entry.
    fn ensure_router_config<'a>(
        &'a self,
        defaults: &'a StoredRouterConfig,
    ) -> StoreFuture<'a, StoredRouterConfig>;

    /// Persist a mode change.
    fn save_mode<'a>(&'a self, mode: RouterMode, actor: &'a str) -> StoreFuture<'a, ()>;

    /// Persist a limit change. Callers pass already-clamped values.
    fn save_limits<'a>(&'a self, soft: f64, hard: f64, actor: &'a str) -> StoreFuture<'a, ()>;
}
