use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::router::policy::RouterMode;

// ---------------------------------------------------------------------------
// Usage records
// ---------------------------------------------------------------------------

/// One served request, as written to the append-only usage log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageRecord {
    pub ts: DateTime<Utc>,
    pub user_id: Option<i64>,
    pub model: String,
    pub kind: String,
    pub source: String,
    pub tokens_in: u32,
    pub tokens_out: u32,
    pub usd_cost: f64,
}

/// Aggregate of usage rows for a single (day, model) pair.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UsageTotal {
    pub day: String,
    pub model: String,
    pub tokens_in: u64,
    pub tokens_out: u64,
    pub usd_cost: f64,
    pub requests: u64,
}

// ---------------------------------------------------------------------------
// Cache rows
// ---------------------------------------------------------------------------

/// A persisted prompt-cache row, keyed by fingerprint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub cache_key: String,
    pub kind: String,
    pub locale: String,
    pub prompt: String,
    pub response_text: String,
    pub model: String,
    pub source: String,
    pub tokens_in: u32,
    pub tokens_out: u32,
    pub usd_cost: f64,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl CacheEntry {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// Lightweight cache row description for reporting.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheKeyInfo {
    pub key: String,
    pub kind: String,
    pub locale: String,
    pub model: String,
    pub expires_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Router settings
// ---------------------------------------------------------------------------

/// Persisted router configuration (mode + spend limits).
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct StoredRouterConfig {
    pub mode: RouterMode,
    pub soft_limit: f64,
    pub hard_limit: f64,
}

/// Clamp a soft/hard pair: soft is non-negative and hard never below soft.
pub fn clamp_limits(soft: f64, hard: f64) -> (f64, f64) {
    let soft = non_negative(soft);
    let hard = non_negative(hard).max(soft);
    (soft, hard)
}

fn non_negative(value: f64) -> f64 {
    // NaN compares false and lands on zero as well.
    if value >= 0.0 { value } else { 0.0 }
}

/// Fixed-width RFC 3339 rendering so stored timestamps sort lexically.
pub fn format_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn parse_ts(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_clamp_limits() {
        assert_eq!(clamp_limits(0.35, 0.5), (0.35, 0.5));
        assert_eq!(clamp_limits(0.5, 0.2), (0.5, 0.5));
        assert_eq!(clamp_limits(-1.0, -2.0), (0.0, 0.0));
        assert_eq!(clamp_limits(-1.0, 0.3), (0.0, 0.3));
        assert_eq!(clamp_limits(f64::NAN, 0.3), (0.0, 0.3));
    }

    #[test]
    fn test_timestamp_roundtrip_and_ordering() {
        let a = Utc.with_ymd_and_hms(2026, 3, 1, 9, 5, 0).unwrap();
        let b = Utc.with_ymd_and_hms(2026, 3, 1, 10, 0, 0).unwrap();
        assert_eq!(parse_ts(&format_ts(a)), Some(a));
        assert!(format_ts(a) < format_ts(b));
        assert_eq!(parse_ts("not a timestamp"), None);
    }

    #[test]
    fn test_cache_entry_expiry_boundary() {
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        let entry = CacheEntry {
            cache_key: "k".into(),
            kind: "mood_reply".into(),
            locale: "en".into(),
            prompt: "p".into(),
            response_text: "r".into(),
            model: "m".into(),
            source: "mini".into(),
            tokens_in: 1,
            tokens_out: 1,
            usd_cost: 0.0,
            created_at: now,
            expires_at: now,
        };
        assert!(entry.is_expired(now));
        assert!(!entry.is_expired(now - chrono::Duration::seconds(1)));
    }
}
