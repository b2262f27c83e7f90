//! Read-only aggregations over usage rows.

use std::collections::{BTreeMap, HashMap};

use chrono::NaiveDate;
use serde::Serialize;

use super::usage::SOURCE_CACHE;
use crate::store::{CacheKeyInfo, UsageRecord, UsageTotal};

/// Totals per (day, model), sorted by day then model.
pub fn daily_totals(records: &[UsageRecord]) -> Vec<UsageTotal> {
    let mut buckets: HashMap<(NaiveDate, &str), UsageTotal> = HashMap::new();
    for record in records {
        let day = record.ts.date_naive();
        let bucket = buckets
            .entry((day, record.model.as_str()))
            .or_insert_with(|| UsageTotal {
                day: day.to_string(),
                model: record.model.clone(),
                tokens_in: 0,
                tokens_out: 0,
                usd_cost: 0.0,
                requests: 0,
            });
        bucket.tokens_in += u64::from(record.tokens_in);
        bucket.tokens_out += u64::from(record.tokens_out);
        bucket.usd_cost += record.usd_cost;
        bucket.requests += 1;
    }

    let mut totals: Vec<_> = buckets.into_values().collect();
    totals.sort_by(|a, b| (&a.day, &a.model).cmp(&(&b.day, &b.model)));
    totals
}

/// Request volume summary over a window.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UsageOverview {
    pub requests: u64,
    pub tokens_in: u64,
    pub tokens_out: u64,
    pub usd_cost: f64,
    pub cache_hits: u64,
    pub cache_rate: f64,
    pub requests_by_kind: BTreeMap<String, u64>,
    pub requests_by_model: BTreeMap<String, u64>,
}

pub fn overview(records: &[UsageRecord]) -> UsageOverview {
    let mut summary = UsageOverview {
        requests: records.len() as u64,
        tokens_in: 0,
        tokens_out: 0,
        usd_cost: 0.0,
        cache_hits: 0,
        cache_rate: 0.0,
        requests_by_kind: BTreeMap::new(),
        requests_by_model: BTreeMap::new(),
    };

    for record in records {
        summary.tokens_in += u64::from(record.tokens_in);
        summary.tokens_out += u64::from(record.tokens_out);
        summary.usd_cost += record.usd_cost;
        if record.source == SOURCE_CACHE {
            summary.cache_hits += 1;
        }
        *summary
            .requests_by_kind
            .entry(record.kind.clone())
            .or_default() += 1;
        *summary
            .requests_by_model
            .entry(record.model.clone())
            .or_default() += 1;
    }

    summary.cache_rate = ratio(summary.cache_hits, summary.requests);
    summary
}

/// Cache effectiveness over a window plus the most recent keys.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheOverview {
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
    pub keys: Vec<CacheKeyInfo>,
}

pub fn cache_overview(records: &[UsageRecord], keys: Vec<CacheKeyInfo>) -> CacheOverview {
    let total = records.len() as u64;
    let hits = records
        .iter()
        .filter(|record| record.source == SOURCE_CACHE)
        .count() as u64;
    CacheOverview {
        hits,
        misses: total.saturating_sub(hits),
        hit_rate: ratio(hits, total),
        keys,
    }
}

fn ratio(part: u64, total: u64) -> f64 {
    if total > 0 {
        part as f64 / total as f64
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};

    fn record(ts: DateTime<Utc>, model: &str, kind: &str, source: &str, cost: f64) -> UsageRecord {
        UsageRecord {
            ts,
            user_id: None,
            model: model.into(),
            kind: kind.into(),
            source: source.into(),
            tokens_in: 10,
            tokens_out: 20,
            usd_cost: cost,
        }
    }

    fn day(d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 7, d, h, 0, 0).unwrap()
    }

    #[test]
    fn test_daily_totals_group_and_sort() {
        let rows = vec![
            record(day(2, 9), "gpt-4-turbo", "deep_insight", "turbo", 0.002),
            record(day(1, 9), "gpt-4-mini", "mood_reply", "mini", 0.001),
            record(day(1, 15), "gpt-4-mini", "mood_reply", "mini", 0.001),
            record(day(1, 10), "template", "quick_tip", "template", 0.0),
        ];

        let totals = daily_totals(&rows);
        let keys: Vec<_> = totals.iter().map(|t| (t.day.as_str(), t.model.as_str())).collect();
        assert_eq!(
            keys,
            vec![
                ("2026-07-01", "gpt-4-mini"),
                ("2026-07-01", "template"),
                ("2026-07-02", "gpt-4-turbo"),
            ]
        );
        assert_eq!(totals[0].requests, 2);
        assert_eq!(totals[0].tokens_in, 20);
        assert!((totals[0].usd_cost - 0.002).abs() < 1e-12);
    }

    #[test]
    fn test_overview_counts_cache_hits() {
        let rows = vec![
            record(day(1, 9), "gpt-4-mini", "mood_reply", "mini", 0.001),
            record(day(1, 10), "gpt-4-mini", "mood_reply", "cache", 0.0),
            record(day(1, 11), "local", "deep_insight", "local", 0.0),
            record(day(1, 12), "gpt-4-mini", "mood_reply", "cache", 0.0),
        ];

        let summary = overview(&rows);
        assert_eq!(summary.requests, 4);
        assert_eq!(summary.cache_hits, 2);
        assert_eq!(summary.cache_rate, 0.5);
        assert_eq!(summary.requests_by_kind.get("mood_reply"), Some(&3));
        assert_eq!(summary.requests_by_model.get("local"), Some(&1));
    }

    #[test]
    fn test_empty_window() {
        let summary = overview(&[]);
        assert_eq!(summary.requests, 0);
        assert_eq!(summary.cache_rate, 0.0);

        let cache = cache_overview(&[], Vec::new());
        assert_eq!(cache.hits, 0);
        assert_eq!(cache.misses, 0);
        assert_eq!(cache.hit_rate, 0.0);
    }

    #[test]
    fn test_cache_overview_misses() {
        let rows = vec![
            record(day(1, 9), "gpt-4-mini", "mood_reply", "mini", 0.001),
            record(day(1, 10), "gpt-4-mini", "mood_reply", "cache", 0.0),
            record(day(1, 11), "gpt-4-mini", "mood_reply", "mini", 0.001),
        ];
        let cache = cache_overview(&rows, Vec::new());
        assert_eq!(cache.hits, 1);
        assert_eq!(cache.misses, 2);
        assert!((cache.hit_rate - 1.0 / 3.0).abs() < 1e-12);
    }
}
