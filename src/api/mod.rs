pub mod admin;
pub mod ask;
pub mod health;

use axum::Router;
use axum::extract::OriginalUri;
use axum::routing::{get, post, put};

use crate::AppState;
use crate::error::AppError;

/// Build the full API router.
///
/// Route layout:
/// ```text
/// /health                        GET
/// /v1/ask                        POST
/// /admin/settings                GET
/// /admin/ai/limiter              GET
/// /admin/ai/mode                 PUT
/// /admin/ai/limits               PUT
/// /admin/ai/limits/refresh       POST
/// /admin/ai/usage                GET    ?days
/// /admin/ai/overview             GET    ?days
/// /admin/ai/history              GET    ?limit
/// /admin/ai/cache                GET    ?days
/// /admin/ai/cache                DELETE (purge expired)
/// /admin/ai/metrics              GET
/// ```
///
/// Unknown paths get a JSON 404.
pub fn build_api_router() -> Router<AppState> {
    let ai_routes = Router::new()
        .route("/limiter", get(admin::get_limiter))
        .route("/mode", put(admin::set_mode))
        .route("/limits", put(admin::set_limits))
        .route("/limits/refresh", post(admin::refresh_limits))
        .route("/usage", get(admin::usage_stats))
        .route("/overview", get(admin::usage_overview))
        .route("/history", get(admin::usage_history))
        .route("/cache", get(admin::cache_overview).delete(admin::purge_cache))
        .route("/metrics", get(admin::metrics));

    let admin_routes = Router::new()
        .route("/settings", get(admin::get_settings))
        .nest("/ai", ai_routes);

    Router::new()
        .route("/health", get(health::health_check))
        .route("/v1/ask", post(ask::ask))
        .nest("/admin", admin_routes)
        .fallback(not_found)
}

async fn not_found(OriginalUri(uri): OriginalUri) -> AppError {
    AppError::NotFound(uri.path().to_string())
}
