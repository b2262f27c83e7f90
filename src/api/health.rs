use axum::Json;
use axum::extract::State;
use serde::Serialize;

use crate::AppState;
use crate::budget::AdmissionMode;
use crate::router::policy::RouterMode;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub database: bool,
    pub provider_configured: bool,
    pub router_mode: RouterMode,
    pub admission: AdmissionMode,
}

/// GET /health
///
/// `status` is `degraded` when the database cannot be reached.
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let database = state
        .db
        .with_conn(|conn| conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0)))
        .is_ok();

    Json(HealthResponse {
        status: if database { "ok" } else { "degraded" }.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        database,
        provider_configured: state.router.has_provider(),
        router_mode: state.router.current_mode(),
        admission: state.router.ledger().mode(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_health_response_serialization() {
        let response = HealthResponse {
            status: "ok".to_string(),
            version: "0.1.0".to_string(),
            database: true,
            provider_configured: false,
            router_mode: RouterMode::LocalOnly,
            admission: AdmissionMode::Soft,
        };

        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["status"], "ok");
        assert_eq!(json["router_mode"], "local_only");
        assert_eq!(json["admission"], "soft");
        assert_eq!(json["provider_configured"], false);
    }
}
