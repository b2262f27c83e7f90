use axum::Json;
use axum::extract::{Query, State};
use serde::{Deserialize, Serialize};

use crate::AppState;
use crate::budget::AdmissionMode;
use crate::budget::report::{CacheOverview, UsageOverview};
use crate::config::SettingEntry;
use crate::error::AppError;
use crate::router::RouterMetrics;
use crate::router::policy::RouterMode;
use crate::store::{UsageRecord, UsageTotal};

const DEFAULT_DAYS: u32 = 7;
const MAX_DAYS: u32 = 365;
const DEFAULT_HISTORY: usize = 50;
const MAX_HISTORY: usize = 500;
const DEFAULT_ACTOR: &str = "admin";

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct WindowQuery {
    #[serde(default)]
    pub days: Option<u32>,
}

impl WindowQuery {
    fn days(&self) -> u32 {
        self.days.unwrap_or(DEFAULT_DAYS).clamp(1, MAX_DAYS)
    }
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    #[serde(default)]
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct SetModeRequest {
    pub mode: String,
    #[serde(default)]
    pub actor: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SetLimitsRequest {
    pub soft_limit: f64,
    pub hard_limit: f64,
    #[serde(default)]
    pub actor: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct LimiterResponse {
    pub router_mode: RouterMode,
    pub mode: AdmissionMode,
    pub soft_limit: f64,
    pub hard_limit: f64,
    pub today_spend: f64,
    pub provider_configured: bool,
}

#[derive(Debug, Serialize)]
pub struct ModeResponse {
    pub mode: RouterMode,
}

#[derive(Debug, Serialize)]
pub struct UsageStatsResponse {
    pub days: u32,
    pub totals: Vec<UsageTotal>,
}

#[derive(Debug, Serialize)]
pub struct OverviewResponse {
    pub days: u32,
    #[serde(flatten)]
    pub overview: UsageOverview,
}

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub records: Vec<UsageRecord>,
}

#[derive(Debug, Serialize)]
pub struct CacheResponse {
    pub days: u32,
    #[serde(flatten)]
    pub overview: CacheOverview,
}

#[derive(Debug, Serialize)]
pub struct PurgedResponse {
    pub purged: u64,
}

fn actor_or_default(actor: Option<String>) -> String {
    actor
        .map(|a| a.trim().to_string())
        .filter(|a| !a.is_empty())
        .unwrap_or_else(|| DEFAULT_ACTOR.to_string())
}

fn limiter_response(state: &AppState) -> LimiterResponse {
    let info = state.router.limiter_info();
    LimiterResponse {
        router_mode: state.router.current_mode(),
        mode: info.mode,
        soft_limit: info.soft_limit,
        hard_limit: info.hard_limit,
        today_spend: info.today_spend,
        provider_configured: state.router.has_provider(),
    }
}

// ---------------------------------------------------------------------------
// Mode and limits
// ---------------------------------------------------------------------------

/// GET /admin/ai/limiter
pub async fn get_limiter(State(state): State<AppState>) -> Json<LimiterResponse> {
    Json(limiter_response(&state))
}

/// PUT /admin/ai/mode
pub async fn set_mode(
    State(state): State<AppState>,
    Json(body): Json<SetModeRequest>,
) -> Result<Json<ModeResponse>, AppError> {
    let actor = actor_or_default(body.actor);
    let mode = state.router.set_mode(&body.mode, &actor).await?;
    Ok(Json(ModeResponse { mode }))
}

/// PUT /admin/ai/limits
pub async fn set_limits(
    State(state): State<AppState>,
    Json(body): Json<SetLimitsRequest>,
) -> Result<Json<LimiterResponse>, AppError> {
    if !body.soft_limit.is_finite() || !body.hard_limit.is_finite() {
        return Err(AppError::BadRequest("limits must be finite numbers".into()));
    }
    let actor = actor_or_default(body.actor);
    state
        .router
        .set_limits(body.soft_limit, body.hard_limit, &actor)
        .await?;
    Ok(Json(limiter_response(&state)))
}

/// POST /admin/ai/limits/refresh
pub async fn refresh_limits(
    State(state): State<AppState>,
) -> Result<Json<LimiterResponse>, AppError> {
    state.router.refresh_limits().await?;
    Ok(Json(limiter_response(&state)))
}

// ---------------------------------------------------------------------------
// Reporting
// ---------------------------------------------------------------------------

/// GET /admin/ai/usage?days=N
pub async fn usage_stats(
    State(state): State<AppState>,
    Query(query): Query<WindowQuery>,
) -> Result<Json<UsageStatsResponse>, AppError> {
    let days = query.days();
    let totals = state.router.usage_stats(days).await?;
    Ok(Json(UsageStatsResponse { days, totals }))
}

/// GET /admin/ai/overview?days=N
pub async fn usage_overview(
    State(state): State<AppState>,
    Query(query): Query<WindowQuery>,
) -> Result<Json<OverviewResponse>, AppError> {
    let days = query.days();
    let overview = state.router.usage_overview(days).await?;
    Ok(Json(OverviewResponse { days, overview }))
}

/// GET /admin/ai/history?limit=N
pub async fn usage_history(
    State(state): State<AppState>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<HistoryResponse>, AppError> {
    let limit = query.limit.unwrap_or(DEFAULT_HISTORY).clamp(1, MAX_HISTORY);
    let records = state.router.usage_history(limit).await?;
    Ok(Json(HistoryResponse { records }))
}

/// GET /admin/ai/cache?days=N
pub async fn cache_overview(
    State(state): State<AppState>,
    Query(query): Query<WindowQuery>,
) -> Result<Json<CacheResponse>, AppError> {
    let days = query.days();
    let overview = state.router.cache_overview(days).await?;
    Ok(Json(CacheResponse { days, overview }))
}

/// DELETE /admin/ai/cache
pub async fn purge_cache(State(state): State<AppState>) -> Result<Json<PurgedResponse>, AppError> {
    let purged = state.router.purge_expired_cache().await?;
    Ok(Json(PurgedResponse { purged }))
}

/// GET /admin/ai/metrics
pub async fn metrics(State(state): State<AppState>) -> Json<RouterMetrics> {
    Json(state.router.metrics())
}

/// GET /admin/settings
pub async fn get_settings(State(state): State<AppState>) -> Json<Vec<SettingEntry>> {
    Json(state.config.settings_report())
}
