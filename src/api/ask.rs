use axum::Json;
use axum::extract::State;
use serde::Deserialize;

use crate::AppState;
use crate::error::AppError;
use crate::router::{AskRequest, RoutedAnswer};

#[derive(Debug, Deserialize)]
pub struct AskBody {
    pub kind: String,
    pub text: String,
    #[serde(default)]
    pub locale: Option<String>,
    #[serde(default)]
    pub user_id: Option<i64>,
    #[serde(default = "default_use_cache")]
    pub use_cache: bool,
}

fn default_use_cache() -> bool {
    true
}

impl AskBody {
    fn into_request(self) -> Result<AskRequest, AppError> {
        let kind = self.kind.trim();
        if kind.is_empty() {
            return Err(AppError::BadRequest("kind must not be empty".into()));
        }
        if self.text.trim().is_empty() {
            return Err(AppError::BadRequest("text must not be empty".into()));
        }
        Ok(AskRequest {
            user_id: self.user_id,
            kind: kind.to_string(),
            text: self.text,
            locale: self.locale,
            use_cache: self.use_cache,
        })
    }
}

/// POST /v1/ask
///
/// Every non-budget failure still produces an answer; only an exhausted
/// daily budget (429) or a failed usage write (500) surfaces as an error.
pub async fn ask(
    State(state): State<AppState>,
    Json(body): Json<AskBody>,
) -> Result<Json<RoutedAnswer>, AppError> {
    let request = body.into_request()?;
    let answer = state.router.ask(request).await?;
    Ok(Json(answer))
}
