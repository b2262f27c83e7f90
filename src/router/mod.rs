//! The AI router: cache probe, budget gate, route resolution, generation with
//! local fallback, and the admin operations around them.

pub mod policy;

use std::sync::{Arc, RwLock};
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::budget::ledger::{AdmissionMode, BudgetLedger, Clock, LedgerInfo};
use crate::budget::report::{self, CacheOverview, UsageOverview};
use crate::budget::usage::{SOURCE_CACHE, UsageCounters, UsageCountersSnapshot, UsageEntry, UsageRecorder};
use crate::cache::ResponseCache;
use crate::cache::types::{CacheStatsSnapshot, CacheWrite};
use crate::config::AiConfig;
use crate::generators::{LocalGenerator, OfflineGenerator, Route, TemplateGenerator};
use crate::providers::{Completion, CompletionProvider, ProviderError};
use crate::store::types::clamp_limits;
use crate::store::{
    CacheRepository, SettingsRepository, StoreError, StoredRouterConfig, UsageRecord,
    UsageRepository, UsageTotal,
};

use self::policy::{RouterMode, resolve_route};

/// Number of cache keys listed in the cache overview.
pub const RECENT_CACHE_KEYS: usize = 50;

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

/// Static router configuration, derived from the `[ai]` config section.
#[derive(Debug, Clone)]
pub struct RouterSettings {
    pub default_mode: RouterMode,
    pub model_primary: String,
    pub model_deep: String,
    pub max_tokens_quick: u32,
    pub max_tokens_deep: u32,
    pub soft_limit_usd: f64,
    pub daily_limit_usd: f64,
    pub cache_ttl_secs: u64,
    pub provider_timeout: Duration,
    pub default_locale: String,
    pub supported_locales: Vec<String>,
}

fn canonical_locale(raw: &str) -> String {
    raw.trim().to_lowercase()
}

impl RouterSettings {
    /// Locales are canonicalized here so cache keys match request locales.
    /// A default outside the supported list falls back to the first
    /// supported locale.
    pub fn from_config(ai: &AiConfig) -> Self {
        let mut supported_locales: Vec<String> = Vec::new();
        for code in ai.supported_locales.iter().map(|raw| canonical_locale(raw)) {
            if !code.is_empty() && !supported_locales.contains(&code) {
                supported_locales.push(code);
            }
        }
        let mut default_locale = canonical_locale(&ai.default_locale);
        if !supported_locales.contains(&default_locale) {
            match supported_locales.first() {
                Some(first) if !default_locale.is_empty() => {
                    warn!(
                        configured = %default_locale,
                        fallback = %first,
                        "Default locale is not supported, using the first supported locale"
                    );
                    default_locale = first.clone();
                }
                Some(first) => default_locale = first.clone(),
                None => supported_locales.push(default_locale.clone()),
            }
        }

        Self {
            default_mode: RouterMode::parse_lenient(&ai.router_mode),
            model_primary: ai.model_primary.clone(),
            model_deep: ai.model_deep.clone(),
            max_tokens_quick: ai.max_tokens_quick,
            max_tokens_deep: ai.max_tokens_deep,
            soft_limit_usd: ai.soft_limit_usd,
            daily_limit_usd: ai.daily_limit_usd,
            cache_ttl_secs: ai.cache_ttl_secs,
            provider_timeout: Duration::from_secs(ai.request_timeout_secs),
            default_locale,
            supported_locales,
        }
    }

    /// Lowercased, trimmed locale if supported, otherwise the default.
    pub fn normalize_locale(&self, locale: Option<&str>) -> String {
        locale
            .map(canonical_locale)
            .filter(|code| self.supported_locales.iter().any(|s| s == code))
            .unwrap_or_else(|| self.default_locale.clone())
    }
}

impl Default for RouterSettings {
    fn default() -> Self {
        Self::from_config(&AiConfig::default())
    }
}

// ---------------------------------------------------------------------------
// Request / response
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct AskRequest {
    pub user_id: Option<i64>,
    pub kind: String,
    pub text: String,
    pub locale: Option<String>,
    pub use_cache: bool,
}

impl AskRequest {
    pub fn new(kind: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            user_id: None,
            kind: kind.into(),
            text: text.into(),
            locale: None,
            use_cache: true,
        }
    }

    pub fn locale(mut self, locale: impl Into<String>) -> Self {
        self.locale = Some(locale.into());
        self
    }

    pub fn user(mut self, user_id: i64) -> Self {
        self.user_id = Some(user_id);
        self
    }

    pub fn without_cache(mut self) -> Self {
        self.use_cache = false;
        self
    }
}

/// Answer returned to the caller.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoutedAnswer {
    pub text: String,
    pub source: String,
    pub model: String,
    pub tokens_in: u32,
    pub tokens_out: u32,
    pub usd_cost: f64,
    pub cached: bool,
}

impl RoutedAnswer {
    fn free(text: String, route: Route) -> Self {
        Self {
            text,
            source: route.as_str().to_string(),
            model: route.as_str().to_string(),
            tokens_in: 0,
            tokens_out: 0,
            usd_cost: 0.0,
            cached: false,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AskError {
    #[error("Daily AI budget exhausted (spent {today_spend:.4} of {hard_limit:.4} USD)")]
    BudgetExhausted { today_spend: f64, hard_limit: f64 },

    #[error("Failed to record usage: {0}")]
    Store(#[from] StoreError),
}

/// In-process metrics for the admin API.
#[derive(Debug, Clone, Serialize)]
pub struct RouterMetrics {
    pub mode: RouterMode,
    pub limiter: LedgerInfo,
    pub usage: UsageCountersSnapshot,
    pub cache: CacheStatsSnapshot,
}

// ---------------------------------------------------------------------------
// AiRouter
// ---------------------------------------------------------------------------

/// Collaborators the router is built from.
pub struct RouterParts {
    pub usage: Arc<dyn UsageRepository>,
    pub cache: Arc<dyn CacheRepository>,
    pub settings: Arc<dyn SettingsRepository>,
    /// `None` when no provider credential is configured.
    pub provider: Option<Arc<dyn CompletionProvider>>,
    pub clock: Arc<dyn Clock>,
}

pub struct AiRouter {
    settings: RouterSettings,
    mode: RwLock<RouterMode>,
    ledger: Arc<BudgetLedger>,
    cache: ResponseCache,
    recorder: UsageRecorder,
    usage: Arc<dyn UsageRepository>,
    settings_repo: Arc<dyn SettingsRepository>,
    provider: Option<Arc<dyn CompletionProvider>>,
    clock: Arc<dyn Clock>,
    templates: TemplateGenerator,
    local: LocalGenerator,
}

impl AiRouter {
    pub fn new(settings: RouterSettings, parts: RouterParts) -> Self {
        let ledger = Arc::new(BudgetLedger::new(
            settings.soft_limit_usd,
            settings.daily_limit_usd,
            parts.clock.clone(),
        ));
        let recorder = UsageRecorder::new(
            parts.usage.clone(),
            ledger.clone(),
            Arc::new(UsageCounters::new()),
            parts.clock.clone(),
        );
        let cache = ResponseCache::new(parts.cache, parts.clock.clone(), settings.cache_ttl_secs);

        Self {
            mode: RwLock::new(settings.default_mode),
            settings,
            ledger,
            cache,
            recorder,
            usage: parts.usage,
            settings_repo: parts.settings,
            provider: parts.provider,
            clock: parts.clock,
            templates: TemplateGenerator,
            local: LocalGenerator,
        }
    }

    /// Build a router whose three repositories are the same store.
    pub fn with_store<S>(
        settings: RouterSettings,
        store: Arc<S>,
        provider: Option<Arc<dyn CompletionProvider>>,
        clock: Arc<dyn Clock>,
    ) -> Self
    where
        S: UsageRepository + CacheRepository + SettingsRepository + 'static,
    {
        Self::new(
            settings,
            RouterParts {
                usage: store.clone(),
                cache: store.clone(),
                settings: store,
                provider,
                clock,
            },
        )
    }

    /// Merge persisted mode and limits with the configured defaults, apply
    /// them, then reconcile the ledger against today's usage.
    pub async fn initialize(&self) -> Result<StoredRouterConfig, StoreError> {
        let defaults = StoredRouterConfig {
            mode: self.settings.default_mode,
            soft_limit: self.settings.soft_limit_usd,
            hard_limit: self.settings.daily_limit_usd,
        };
        let config = self.settings_repo.ensure_router_config(&defaults).await?;

        *self.mode.write().expect("mode lock poisoned") = config.mode;
        self.ledger.set_limits(config.soft_limit, config.hard_limit);
        self.refresh_or_keep().await;

        info!(
            mode = %config.mode,
            soft_limit = config.soft_limit,
            hard_limit = config.hard_limit,
            "AI router initialized"
        );
        Ok(config)
    }

    // -----------------------------------------------------------------------
    // Hot path
    // -----------------------------------------------------------------------

    pub async fn ask(&self, request: AskRequest) -> Result<RoutedAnswer, AskError> {
        let kind = request.kind.as_str();
        let text = request.text.as_str();
        let user_id = request.user_id;
        let locale = self.settings.normalize_locale(request.locale.as_deref());

        if request.use_cache {
            match self.cache.get(kind, text, &locale).await {
                Ok(Some(entry)) => {
                    self.recorder
                        .record_cache_hit(kind, &entry.model, user_id)
                        .await?;
                    return Ok(RoutedAnswer {
                        text: entry.response_text,
                        source: SOURCE_CACHE.to_string(),
                        model: entry.model,
                        tokens_in: entry.tokens_in,
                        tokens_out: entry.tokens_out,
                        usd_cost: 0.0,
                        cached: true,
                    });
                }
                Ok(None) => {}
                Err(err) => warn!(kind, error = %err, "Cache lookup failed, treating as miss"),
            }
        }

        let admission = self.ledger.mode();
        if admission == AdmissionMode::Hard {
            let info = self.ledger.info();
            warn!(
                ?user_id,
                kind,
                mode = %self.current_mode(),
                today_spend = info.today_spend,
                "Daily AI budget exhausted"
            );
            return Err(AskError::BudgetExhausted {
                today_spend: info.today_spend,
                hard_limit: info.hard_limit,
            });
        }

        let mode = self.current_mode();
        let route = resolve_route(kind, mode, admission, self.provider.is_some());
        debug!(kind, %route, %mode, admission = %admission, "AI route selected");

        match route {
            Route::Template => {
                let reply = self.templates.generate(kind, text, &locale);
                self.recorder
                    .record_zero_cost(kind, route.as_str(), route.as_str(), user_id)
                    .await?;
                Ok(RoutedAnswer::free(reply, route))
            }
            Route::Local => self.answer_locally(kind, text, &locale, user_id).await,
            Route::Mini | Route::Turbo => {
                self.answer_paid(route, kind, text, &locale, user_id).await
            }
        }
    }

    async fn answer_locally(
        &self,
        kind: &str,
        text: &str,
        locale: &str,
        user_id: Option<i64>,
    ) -> Result<RoutedAnswer, AskError> {
        let reply = self.local.generate(kind, text, locale);
        let route = Route::Local;
        self.recorder
            .record_zero_cost(kind, route.as_str(), route.as_str(), user_id)
            .await?;
        Ok(RoutedAnswer::free(reply, route))
    }

    async fn answer_paid(
        &self,
        route: Route,
        kind: &str,
        text: &str,
        locale: &str,
        user_id: Option<i64>,
    ) -> Result<RoutedAnswer, AskError> {
        let (model, max_tokens) = match route {
            Route::Turbo => (self.settings.model_deep.as_str(), self.settings.max_tokens_deep),
            _ => (self.settings.model_primary.as_str(), self.settings.max_tokens_quick),
        };

        let completion = match self.call_provider(model, text, max_tokens).await {
            Ok(completion) => completion,
            Err(err) => {
                warn!(kind, %route, model, error = %err, "Provider call failed, falling back to local");
                return self.answer_locally(kind, text, locale, user_id).await;
            }
        };

        self.recorder
            .record(UsageEntry {
                user_id,
                kind: kind.to_string(),
                model: model.to_string(),
                source: route.as_str().to_string(),
                tokens_in: completion.tokens_in,
                tokens_out: completion.tokens_out,
                usd_cost: completion.usd_cost,
            })
            .await?;

        let trimmed = completion.text.trim();
        let reply = if trimmed.is_empty() {
            debug!(kind, model, "Empty completion, substituting local answer");
            self.local.generate(kind, text, locale)
        } else {
            trimmed.to_string()
        };

        let write = CacheWrite {
            kind,
            prompt: text,
            locale,
            response_text: &reply,
            model,
            source: route.as_str(),
            tokens_in: completion.tokens_in,
            tokens_out: completion.tokens_out,
            usd_cost: completion.usd_cost,
        };
        if let Err(err) = self.cache.set(write).await {
            warn!(kind, error = %err, "Cache write failed, skipping");
        }

        Ok(RoutedAnswer {
            text: reply,
            source: route.as_str().to_string(),
            model: model.to_string(),
            tokens_in: completion.tokens_in,
            tokens_out: completion.tokens_out,
            usd_cost: completion.usd_cost,
            cached: false,
        })
    }

    async fn call_provider(
        &self,
        model: &str,
        prompt: &str,
        max_tokens: u32,
    ) -> Result<Completion, ProviderError> {
        let provider = self.provider.as_ref().ok_or(ProviderError::NoCredential)?;
        let timeout = self.settings.provider_timeout;
        match tokio::time::timeout(timeout, provider.complete(model, prompt, max_tokens)).await {
            Ok(result) => result,
            Err(_) => Err(ProviderError::Timeout(timeout.as_secs())),
        }
    }

    // -----------------------------------------------------------------------
    // Admin
    // -----------------------------------------------------------------------

    pub fn current_mode(&self) -> RouterMode {
        *self.mode.read().expect("mode lock poisoned")
    }

    /// Persist and apply a mode change. Unknown names become `auto`.
    pub async fn set_mode(&self, raw: &str, actor: &str) -> Result<RouterMode, StoreError> {
        let mode = RouterMode::parse_lenient(raw);
        self.settings_repo.save_mode(mode, actor).await?;
        *self.mode.write().expect("mode lock poisoned") = mode;
        info!(%mode, actor, "AI router mode changed");
        Ok(mode)
    }

    /// Persist and apply new limits, returning the clamped pair.
    pub async fn set_limits(
        &self,
        soft: f64,
        hard: f64,
        actor: &str,
    ) -> Result<(f64, f64), StoreError> {
        let (soft, hard) = clamp_limits(soft, hard);
        self.settings_repo.save_limits(soft, hard, actor).await?;
        self.ledger.set_limits(soft, hard);
        info!(soft_limit = soft, hard_limit = hard, actor, "AI spend limits changed");
        Ok((soft, hard))
    }

    /// Re-derive today's spend from the usage store.
    pub async fn refresh_limits(&self) -> Result<AdmissionMode, StoreError> {
        self.ledger.refresh(self.usage.as_ref()).await
    }

    /// Refresh, keeping the previous state if the store is unavailable.
    pub async fn refresh_or_keep(&self) -> AdmissionMode {
        match self.refresh_limits().await {
            Ok(mode) => mode,
            Err(err) => {
                let mode = self.ledger.mode();
                warn!(error = %err, mode = %mode, "Ledger refresh failed, keeping previous state");
                mode
            }
        }
    }

    pub fn limiter_info(&self) -> LedgerInfo {
        self.ledger.info()
    }

    pub fn ledger(&self) -> &BudgetLedger {
        &self.ledger
    }

    pub fn cache(&self) -> &ResponseCache {
        &self.cache
    }

    pub fn has_provider(&self) -> bool {
        self.provider.is_some()
    }

    async fn usage_window(&self, days: u32) -> Result<Vec<UsageRecord>, StoreError> {
        let since = self.clock.now() - chrono::Duration::days(i64::from(days));
        self.usage.usage_since(since).await
    }

    /// Per-day, per-model totals over the last `days` days.
    pub async fn usage_stats(&self, days: u32) -> Result<Vec<UsageTotal>, StoreError> {
        Ok(report::daily_totals(&self.usage_window(days).await?))
    }

    pub async fn usage_overview(&self, days: u32) -> Result<UsageOverview, StoreError> {
        Ok(report::overview(&self.usage_window(days).await?))
    }

    pub async fn usage_history(&self, limit: usize) -> Result<Vec<UsageRecord>, StoreError> {
        self.usage.usage_history(limit).await
    }

    pub async fn cache_overview(&self, days: u32) -> Result<CacheOverview, StoreError> {
        let (records, keys) = futures::try_join!(
            self.usage_window(days),
            self.cache.recent_keys(RECENT_CACHE_KEYS)
        )?;
        Ok(report::cache_overview(&records, keys))
    }

    pub async fn purge_expired_cache(&self) -> Result<u64, StoreError> {
        self.cache.purge_expired().await
    }

    pub fn metrics(&self) -> RouterMetrics {
        RouterMetrics {
            mode: self.current_mode(),
            limiter: self.ledger.info(),
            usage: self.recorder.counters().snapshot(),
            cache: self.cache.stats(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::budget::ledger::ManualClock;
    use crate::store::MemoryStore;
    use crate::store::memory::SettingsChange;
    use chrono::{TimeZone, Utc};
    use std::future::Future;
    use std::pin::Pin;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const LONG_ANSWER: &str =
        "Notice three things you can see, two you can hear, and one you can feel right now.";

    struct ScriptedProvider {
        reply: Result<String, ()>,
        calls: AtomicUsize,
    }

    impl ScriptedProvider {
        fn ok(text: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: Ok(text.to_string()),
                calls: AtomicUsize::new(0),
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                reply: Err(()),
                calls: AtomicUsize::new(0),
            })
        }
    }

    impl CompletionProvider for ScriptedProvider {
        fn id(&self) -> &str {
            "scripted"
        }

        fn complete<'a>(
            &'a self,
            _model: &'a str,
            _prompt: &'a str,
            _max_tokens: u32,
        ) -> Pin<Box<dyn Future<Output = Result<Completion, ProviderError>> + Send + 'a>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let result = match &self.reply {
                Ok(text) => Ok(Completion {
                    text: text.clone(),
                    tokens_in: 10,
                    tokens_out: 50,
                    usd_cost: 0.004,
                }),
                Err(()) => Err(ProviderError::Api {
                    status: 503,
                    message: "unavailable".into(),
                }),
            };
            Box::pin(async move { result })
        }
    }

    fn settings() -> RouterSettings {
        RouterSettings {
            soft_limit_usd: 0.005,
            daily_limit_usd: 0.01,
            ..RouterSettings::default()
        }
    }

    fn router(provider: Option<Arc<ScriptedProvider>>) -> (AiRouter, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2026, 9, 14, 8, 30, 0).unwrap(),
        ));
        let provider = provider.map(|p| p as Arc<dyn CompletionProvider>);
        (AiRouter::with_store(settings(), store.clone(), provider, clock), store)
    }

    #[test]
    fn test_normalize_locale() {
        let settings = RouterSettings::default();
        assert_eq!(settings.normalize_locale(Some(" EN ")), "en");
        assert_eq!(settings.normalize_locale(Some("ru")), "ru");
        assert_eq!(settings.normalize_locale(Some("de")), "ru");
        assert_eq!(settings.normalize_locale(None), "ru");
    }

    #[test]
    fn test_configured_locales_are_canonicalized() {
        let ai = AiConfig {
            default_locale: " RU ".into(),
            supported_locales: vec!["ru".into(), "EN".into(), " en".into(), "".into()],
            ..AiConfig::default()
        };
        let settings = RouterSettings::from_config(&ai);
        assert_eq!(settings.default_locale, "ru");
        assert_eq!(settings.supported_locales, vec!["ru".to_string(), "en".to_string()]);
        assert_eq!(settings.normalize_locale(Some("En")), "en");
        assert_eq!(settings.normalize_locale(None), "ru");

        let ai = AiConfig {
            default_locale: "de".into(),
            supported_locales: vec!["en".into(), "ru".into()],
            ..AiConfig::default()
        };
        let settings = RouterSettings::from_config(&ai);
        assert_eq!(settings.default_locale, "en");
        assert_eq!(settings.normalize_locale(Some("de")), "en");
    }

    #[tokio::test]
    async fn test_uppercase_default_locale_shares_cache_with_explicit_locale() {
        let provider = ScriptedProvider::ok(LONG_ANSWER);
        let ai = AiConfig {
            default_locale: "RU".into(),
            ..AiConfig::default()
        };
        let settings = RouterSettings {
            soft_limit_usd: 0.005,
            daily_limit_usd: 0.01,
            ..RouterSettings::from_config(&ai)
        };
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2026, 9, 14, 8, 30, 0).unwrap(),
        ));
        let router = AiRouter::with_store(
            settings,
            store,
            Some(provider.clone() as Arc<dyn CompletionProvider>),
            clock,
        );

        router.ask(AskRequest::new("mood_reply", "tired")).await.unwrap();
        let again = router
            .ask(AskRequest::new("mood_reply", "tired").locale("ru"))
            .await
            .unwrap();
        assert!(again.cached);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_template_route_is_free_and_uncached() {
        let provider = ScriptedProvider::ok(LONG_ANSWER);
        let (router, store) = router(Some(provider.clone()));

        let answer = router
            .ask(AskRequest::new("quick_tip", "I can't focus").locale("en"))
            .await
            .unwrap();
        assert_eq!(answer.source, "template");
        assert_eq!(answer.model, "template");
        assert_eq!(answer.usd_cost, 0.0);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
        assert_eq!(store.cache_len(), 0);
        assert_eq!(store.usage_records().len(), 1);
    }

    #[tokio::test]
    async fn test_paid_answer_is_recorded_and_cached() {
        let provider = ScriptedProvider::ok(LONG_ANSWER);
        let (router, store) = router(Some(provider.clone()));

        let answer = router
            .ask(AskRequest::new("mood_reply", "I feel anxious").user(9))
            .await
            .unwrap();
        assert_eq!(answer.source, "mini");
        assert_eq!(answer.model, "gpt-4-mini");
        assert_eq!(answer.usd_cost, 0.004);
        assert!(!answer.cached);
        assert_eq!(store.cache_len(), 1);

        let records = store.usage_records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].user_id, Some(9));
        assert_eq!(records[0].source, "mini");
        assert!((router.ledger().today_spend() - 0.004).abs() < 1e-12);

        let again = router
            .ask(AskRequest::new("mood_reply", "  i feel ANXIOUS "))
            .await
            .unwrap();
        assert!(again.cached);
        assert_eq!(again.source, "cache");
        assert_eq!(again.usd_cost, 0.0);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_use_cache_false_skips_probe() {
        let provider = ScriptedProvider::ok(LONG_ANSWER);
        let (router, _) = router(Some(provider.clone()));

        router.ask(AskRequest::new("mood_reply", "hello")).await.unwrap();
        let answer = router
            .ask(AskRequest::new("mood_reply", "hello").without_cache())
            .await
            .unwrap();
        assert_eq!(answer.source, "mini");
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_empty_completion_is_replaced_by_local() {
        let provider = ScriptedProvider::ok("   ");
        let (router, _) = router(Some(provider));

        let answer = router
            .ask(AskRequest::new("mood_reply", "hello").locale("en"))
            .await
            .unwrap();
        assert_eq!(answer.source, "mini");
        assert!(!answer.text.trim().is_empty());
        assert_eq!(answer.text, LocalGenerator.generate("mood_reply", "hello", "en"));
    }

    #[tokio::test]
    async fn test_soft_budget_downgrades_turbo_to_mini() {
        let provider = ScriptedProvider::ok(LONG_ANSWER);
        let (router, _) = router(Some(provider));
        router.ledger().register(0.006);

        let answer = router
            .ask(AskRequest::new("deep_insight", "what now"))
            .await
            .unwrap();
        assert_eq!(answer.source, "mini");
        assert_eq!(answer.model, "gpt-4-mini");
    }

    #[tokio::test]
    async fn test_no_credential_routes_paid_kinds_locally() {
        let (router, store) = router(None);
        let answer = router
            .ask(AskRequest::new("deep_insight", "what now"))
            .await
            .unwrap();
        assert_eq!(answer.source, "local");
        assert_eq!(store.usage_records()[0].source, "local");
    }

    #[tokio::test]
    async fn test_hard_budget_denies() {
        let provider = ScriptedProvider::ok(LONG_ANSWER);
        let (router, store) = router(Some(provider.clone()));
        router.ledger().register(0.01);

        let err = router
            .ask(AskRequest::new("quick_tip", "hi"))
            .await
            .unwrap_err();
        match err {
            AskError::BudgetExhausted { hard_limit, .. } => assert_eq!(hard_limit, 0.01),
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(store.usage_records().is_empty());
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_set_mode_persists_with_actor() {
        let (router, store) = router(None);
        assert_eq!(router.set_mode("turbo_only", "admin:5").await.unwrap(), RouterMode::TurboOnly);
        assert_eq!(router.current_mode(), RouterMode::TurboOnly);
        assert_eq!(router.set_mode("bogus", "admin:5").await.unwrap(), RouterMode::Auto);
        assert_eq!(
            store.settings_changes().last(),
            Some(&SettingsChange::Mode {
                mode: RouterMode::Auto,
                actor: "admin:5".into()
            })
        );
    }

    #[tokio::test]
    async fn test_set_limits_clamps_and_applies() {
        let (router, store) = router(None);
        assert_eq!(router.set_limits(0.4, 0.1, "admin").await.unwrap(), (0.4, 0.4));
        let info = router.limiter_info();
        assert_eq!(info.soft_limit, 0.4);
        assert_eq!(info.hard_limit, 0.4);
        assert!(matches!(
            store.settings_changes().last(),
            Some(SettingsChange::Limits { soft, hard, .. }) if *soft == 0.4 && *hard == 0.4
        ));
    }

    #[tokio::test]
    async fn test_initialize_applies_persisted_config() {
        let (router, store) = router(None);
        store.save_mode(RouterMode::LocalOnly, "admin").await.unwrap();
        store.save_limits(0.2, 0.3, "admin").await.unwrap();

        let config = router.initialize().await.unwrap();
        assert_eq!(config.mode, RouterMode::LocalOnly);
        assert_eq!(router.current_mode(), RouterMode::LocalOnly);
        assert_eq!(router.limiter_info().hard_limit, 0.3);
    }

    #[tokio::test]
    async fn test_reports() {
        let provider = ScriptedProvider::ok(LONG_ANSWER);
        let (router, _) = router(Some(provider));
        router.ask(AskRequest::new("mood_reply", "a")).await.unwrap();
        router.ask(AskRequest::new("mood_reply", "a")).await.unwrap();
        router.ask(AskRequest::new("quick_tip", "b")).await.unwrap();

        let totals = router.usage_stats(7).await.unwrap();
        assert_eq!(totals.len(), 2);
        let mini = totals.iter().find(|t| t.model == "gpt-4-mini").unwrap();
        assert_eq!(mini.requests, 2);

        let overview = router.usage_overview(7).await.unwrap();
        assert_eq!(overview.requests, 3);
        assert_eq!(overview.cache_hits, 1);

        let cache = router.cache_overview(7).await.unwrap();
        assert_eq!(cache.hits, 1);
        assert_eq!(cache.misses, 2);
        assert_eq!(cache.keys.len(), 1);

        assert_eq!(router.usage_history(2).await.unwrap().len(), 2);

        let metrics = router.metrics();
        assert_eq!(metrics.usage.requests_total, 3);
        assert_eq!(metrics.cache.hits, 1);
    }
}
