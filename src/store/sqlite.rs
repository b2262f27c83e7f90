use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row, params};

use super::types::{
    CacheEntry, CacheKeyInfo, StoredRouterConfig, UsageRecord, clamp_limits, format_ts, parse_ts,
};
use super::{CacheRepository, SettingsRepository, StoreError, StoreFuture, UsageRepository};
use crate::db::Database;
use crate::router::policy::RouterMode;

const KEY_MODE: &str = "ai_router_mode";
const KEY_SOFT_LIMIT: &str = "ai_soft_limit";
const KEY_HARD_LIMIT: &str = "ai_hard_limit";

const BOOTSTRAP_ACTOR: &str = "bootstrap";

/// Repository backend over the shared SQLite [`Database`].
///
/// All statements run synchronously under the connection mutex; the returned
/// futures are already resolved.
#[derive(Clone)]
pub struct SqliteStore {
    db: Database,
}

impl SqliteStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    fn insert_usage(&self, record: &UsageRecord) -> Result<(), StoreError> {
        let id = uuid::Uuid::new_v4().to_string();
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO usage_stats (id, ts, user_id, model, kind, source, tokens_in, tokens_out, usd_cost) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    id,
                    format_ts(record.ts),
                    record.user_id,
                    record.model,
                    record.kind,
                    record.source,
                    record.tokens_in,
                    record.tokens_out,
                    record.usd_cost,
                ],
            )?;
            Ok(())
        })?;
        Ok(())
    }

    fn total_since(&self, since: DateTime<Utc>) -> Result<f64, StoreError> {
        let total = self.db.with_conn(|conn| {
            conn.query_row(
                "SELECT COALESCE(SUM(usd_cost), 0.0) FROM usage_stats WHERE ts >= ?1",
                params![format_ts(since)],
                |row| row.get::<_, f64>(0),
            )
        })?;
        Ok(total)
    }

    fn select_usage(&self, sql: &str, param: &dyn rusqlite::ToSql) -> Result<Vec<UsageRecord>, StoreError> {
        let rows = self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(sql)?;
            let rows = stmt.query_map(&[param][..], usage_from_row)?;
            rows.collect::<Result<Vec<_>, _>>()
        })?;
        Ok(rows)
    }

    fn fetch_cache(&self, key: &str, now: DateTime<Utc>) -> Result<Option<CacheEntry>, StoreError> {
        let entry = self.db.with_conn(|conn| {
            let entry = conn
                .query_row(
                    "SELECT cache_key, kind, locale, prompt, response_text, model, source, \
                            tokens_in, tokens_out, usd_cost, created_at, expires_at \
                     FROM prompt_cache WHERE cache_key = ?1",
                    params![key],
                    cache_from_row,
                )
                .optional()?;

            match entry {
                Some(entry) if entry.is_expired(now) => {
                    conn.execute("DELETE FROM prompt_cache WHERE cache_key = ?1", params![key])?;
                    Ok(None)
                }
                other => Ok(other),
            }
        })?;
        Ok(entry)
    }

    fn write_cache(&self, entry: &CacheEntry) -> Result<(), StoreError> {
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO prompt_cache \
                   (cache_key, kind, locale, prompt, response_text, model, source, \
                    tokens_in, tokens_out, usd_cost, created_at, expires_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12) \
                 ON CONFLICT(cache_key) DO UPDATE SET \
                   kind = excluded.kind, \
                   locale = excluded.locale, \
                   prompt = excluded.prompt, \
                   response_text = excluded.response_text, \
                   model = excluded.model, \
                   source = excluded.source, \
                   tokens_in = excluded.tokens_in, \
                   tokens_out = excluded.tokens_out, \
                   usd_cost = excluded.usd_cost, \
                   created_at = excluded.created_at, \
                   expires_at = excluded.expires_at",
                params![
                    entry.cache_key,
                    entry.kind,
                    entry.locale,
                    entry.prompt,
                    entry.response_text,
                    entry.model,
                    entry.source,
                    entry.tokens_in,
                    entry.tokens_out,
                    entry.usd_cost,
                    format_ts(entry.created_at),
                    format_ts(entry.expires_at),
                ],
            )?;
            Ok(())
        })?;
        Ok(())
    }

    fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let removed = self.db.with_conn(|conn| {
            conn.execute(
                "DELETE FROM prompt_cache WHERE expires_at <= ?1",
                params![format_ts(now)],
            )
        })?;
        Ok(removed as u64)
    }

    fn select_recent_keys(&self, limit: usize) -> Result<Vec<CacheKeyInfo>, StoreError> {
        let keys = self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT cache_key, kind, locale, model, expires_at FROM prompt_cache \
                 ORDER BY expires_at DESC LIMIT ?1",
            )?;
            let rows = stmt.query_map(params![limit as i64], |row| {
                Ok(CacheKeyInfo {
                    key: row.get(0)?,
                    kind: row.get(1)?,
                    locale: row.get(2)?,
                    model: row.get(3)?,
                    expires_at: ts_column(row, 4)?,
                })
            })?;
            rows.collect::<Result<Vec<_>, _>>()
        })?;
        Ok(keys)
    }

    fn load_or_seed(&self, defaults: &StoredRouterConfig) -> Result<StoredRouterConfig, StoreError> {
        let config = self.db.with_conn(|conn| {
            let tx = conn.unchecked_transaction()?;

            let mode = read_setting(&tx, KEY_MODE)?
                .map(|raw| RouterMode::parse_lenient(&raw))
                .unwrap_or(defaults.mode);
            let soft = read_setting(&tx, KEY_SOFT_LIMIT)?
                .and_then(|raw| raw.parse::<f64>().ok())
                .unwrap_or(defaults.soft_limit);
            let mut hard = read_setting(&tx, KEY_HARD_LIMIT)?
                .and_then(|raw| raw.parse::<f64>().ok())
                .unwrap_or(defaults.hard_limit);
            if hard < soft {
                hard = soft.max(defaults.hard_limit);
            }
            let (soft, hard) = clamp_limits(soft, hard);

            write_setting(&tx, KEY_MODE, mode.as_str())?;
            write_setting(&tx, KEY_SOFT_LIMIT, &soft.to_string())?;
            write_setting(&tx, KEY_HARD_LIMIT, &hard.to_string())?;

            let switches: i64 =
                tx.query_row("SELECT COUNT(*) FROM model_switches", [], |row| row.get(0))?;
            if switches == 0 {
                tx.execute(
                    "INSERT INTO model_switches (mode, actor) VALUES (?1, ?2)",
                    params![mode.as_str(), BOOTSTRAP_ACTOR],
                )?;
            }
            let limits: i64 = tx.query_row("SELECT COUNT(*) FROM ai_limits", [], |row| row.get(0))?;
            if limits == 0 {
                tx.execute(
                    "INSERT INTO ai_limits (soft_limit, hard_limit, actor) VALUES (?1, ?2, ?3)",
                    params![soft, hard, BOOTSTRAP_ACTOR],
                )?;
            }

            tx.commit()?;
            Ok(StoredRouterConfig {
                mode,
                soft_limit: soft,
                hard_limit: hard,
            })
        })?;
        Ok(config)
    }

    fn persist_mode(&self, mode: RouterMode, actor: &str) -> Result<(), StoreError> {
        self.db.with_conn(|conn| {
            let tx = conn.unchecked_transaction()?;
            write_setting(&tx, KEY_MODE, mode.as_str())?;
            tx.execute(
                "INSERT INTO model_switches (mode, actor) VALUES (?1, ?2)",
                params![mode.as_str(), actor],
            )?;
            tx.commit()
        })?;
        Ok(())
    }

    fn persist_limits(&self, soft: f64, hard: f64, actor: &str) -> Result<(), StoreError> {
        self.db.with_conn(|conn| {
            let tx = conn.unchecked_transaction()?;
            write_setting(&tx, KEY_SOFT_LIMIT, &soft.to_string())?;
            write_setting(&tx, KEY_HARD_LIMIT, &hard.to_string())?;
            tx.execute(
                "INSERT INTO ai_limits (soft_limit, hard_limit, actor) VALUES (?1, ?2, ?3)",
                params![soft, hard, actor],
            )?;
            tx.commit()
        })?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Trait impls
// ---------------------------------------------------------------------------

impl UsageRepository for SqliteStore {
    fn record_usage<'a>(&'a self, record: &'a UsageRecord) -> StoreFuture<'a, ()> {
        Box::pin(std::future::ready(self.insert_usage(record)))
    }

    fn usage_total_since(&self, since: DateTime<Utc>) -> StoreFuture<'_, f64> {
        Box::pin(std::future::ready(self.total_since(since)))
    }

    fn usage_since(&self, since: DateTime<Utc>) -> StoreFuture<'_, Vec<UsageRecord>> {
        let since = format_ts(since);
        Box::pin(std::future::ready(self.select_usage(
            "SELECT ts, user_id, model, kind, source, tokens_in, tokens_out, usd_cost \
             FROM usage_stats WHERE ts >= ?1 ORDER BY ts ASC",
            &since,
        )))
    }

    fn usage_history(&self, limit: usize) -> StoreFuture<'_, Vec<UsageRecord>> {
        let limit = limit as i64;
        Box::pin(std::future::ready(self.select_usage(
            "SELECT ts, user_id, model, kind, source, tokens_in, tokens_out, usd_cost \
             FROM usage_stats ORDER BY ts DESC, rowid DESC LIMIT ?1",
            &limit,
        )))
    }
}

impl CacheRepository for SqliteStore {
    fn get_by_key<'a>(
        &'a self,
        key: &'a str,
        now: DateTime<Utc>,
    ) -> StoreFuture<'a, Option<CacheEntry>> {
        Box::pin(std::future::ready(self.fetch_cache(key, now)))
    }

    fn upsert<'a>(&'a self, entry: &'a CacheEntry) -> StoreFuture<'a, ()> {
        Box::pin(std::future::ready(self.write_cache(entry)))
    }

    fn purge_expired(&self, now: DateTime<Utc>) -> StoreFuture<'_, u64> {
        Box::pin(std::future::ready(self.delete_expired(now)))
    }

    fn recent_keys(&self, limit: usize) -> StoreFuture<'_, Vec<CacheKeyInfo>> {
        Box::pin(std::future::ready(self.select_recent_keys(limit)))
    }
}

impl SettingsRepository for SqliteStore {
    fn ensure_router_config<'a>(
        &'a self,
        defaults: &'a StoredRouterConfig,
    ) -> StoreFuture<'a, StoredRouterConfig> {
        Box::pin(std::future::ready(self.load_or_seed(defaults)))
    }

    fn save_mode<'a>(&'a self, mode: RouterMode, actor: &'a str) -> StoreFuture<'a, ()> {
        Box::pin(std::future::ready(self.persist_mode(mode, actor)))
    }

    fn save_limits<'a>(&'a self, soft: f64, hard: f64, actor: &'a str) -> StoreFuture<'a, ()> {
        Box::pin(std::future::ready(self.persist_limits(soft, hard, actor)))
    }
}

// ---------------------------------------------------------------------------
// Row helpers
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct BadTimestamp(String);

impl std::fmt::Display for BadTimestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid timestamp {:?}", self.0)
    }
}

impl std::error::Error for BadTimestamp {}

fn ts_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    parse_ts(&raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(BadTimestamp(raw)))
    })
}

fn usage_from_row(row: &Row<'_>) -> rusqlite::Result<UsageRecord> {
    Ok(UsageRecord {
        ts: ts_column(row, 0)?,
        user_id: row.get(1)?,
        model: row.get(2)?,
        kind: row.get(3)?,
        source: row.get(4)?,
        tokens_in: row.get(5)?,
        tokens_out: row.get(6)?,
        usd_cost: row.get(7)?,
    })
}

fn cache_from_row(row: &Row<'_>) -> rusqlite::Result<CacheEntry> {
    Ok(CacheEntry {
        cache_key: row.get(0)?,
        kind: row.get(1)?,
        locale: row.get(2)?,
        prompt: row.get(3)?,
        response_text: row.get(4)?,
        model: row.get(5)?,
        source: row.get(6)?,
        tokens_in: row.get(7)?,
        tokens_out: row.get(8)?,
        usd_cost: row.get(9)?,
        created_at: ts_column(row, 10)?,
        expires_at: ts_column(row, 11)?,
    })
}

fn read_setting(conn: &Connection, key: &str) -> rusqlite::Result<Option<String>> {
    conn.query_row(
        "SELECT value FROM settings WHERE key = ?1",
        params![key],
        |row| row.get(0),
    )
    .optional()
}

fn write_setting(conn: &Connection, key: &str, value: &str) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO settings (key, value) VALUES (?1, ?2) \
         ON CONFLICT(key) DO UPDATE SET value = excluded.value, \
           updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')",
        params![key, value],
    )?;
    Ok(())
}
