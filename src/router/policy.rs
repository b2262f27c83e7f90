//! Route resolution: forced mode, kind baseline, budget and credential
//! downgrades.

use serde::{Deserialize, Serialize};

use crate::budget::AdmissionMode;
use crate::generators::Route;

// ---------------------------------------------------------------------------
// RouterMode
// ---------------------------------------------------------------------------

/// Operator override for route selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouterMode {
    #[default]
    Auto,
    MiniOnly,
    LocalOnly,
    TurboOnly,
}

impl RouterMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::MiniOnly => "mini_only",
            Self::LocalOnly => "local_only",
            Self::TurboOnly => "turbo_only",
        }
    }

    /// Parse a mode name. Unknown values fall back to `auto`.
    pub fn parse_lenient(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "mini_only" => Self::MiniOnly,
            "local_only" => Self::LocalOnly,
            "turbo_only" => Self::TurboOnly,
            _ => Self::Auto,
        }
    }
}

impl std::fmt::Display for RouterMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Resolution
// ---------------------------------------------------------------------------

/// Default route for a request kind. Unknown kinds go to the low-cost tier.
pub fn baseline_for_kind(kind: &str) -> Route {
    match kind {
        "quick_tip" | "breathing_hint" => Route::Template,
        "mood_reply" => Route::Mini,
        "deep_insight" | "weekly_review" => Route::Turbo,
        _ => Route::Mini,
    }
}

/// Resolve the route for a request that already passed the budget gate.
///
/// Precedence: `local_only` wins outright; otherwise the forced tier or the
/// kind baseline, downgraded from turbo to mini in soft mode, then downgraded
/// toward local when no provider credential is configured.
pub fn resolve_route(
    kind: &str,
    mode: RouterMode,
    admission: AdmissionMode,
    has_credential: bool,
) -> Route {
    let mut route = match mode {
        RouterMode::LocalOnly => return Route::Local,
        RouterMode::MiniOnly => Route::Mini,
        RouterMode::TurboOnly => Route::Turbo,
        RouterMode::Auto => baseline_for_kind(kind),
    };

    match admission {
        AdmissionMode::Hard => return Route::Local,
        AdmissionMode::Soft if route == Route::Turbo => route = Route::Mini,
        _ => {}
    }

    if route.is_paid() && !has_credential {
        route = Route::Local;
    }
    route
}
