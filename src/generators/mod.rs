//! Answer sources and the closed set of routes that select them.

pub mod local;
pub mod templates;

use serde::Serialize;

pub use self::local::LocalGenerator;
pub use self::templates::TemplateGenerator;

// ---------------------------------------------------------------------------
// Route
// ---------------------------------------------------------------------------

/// Where an answer is produced. The set is fixed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Route {
    /// Static phrase table lookup.
    Template,
    /// Deterministic offline responder.
    Local,
    /// Low-cost paid tier.
    Mini,
    /// High-cost paid tier.
    Turbo,
}

impl Route {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Template => "template",
            Self::Local => "local",
            Self::Mini => "mini",
            Self::Turbo => "turbo",
        }
    }

    pub fn is_paid(self) -> bool {
        matches!(self, Self::Mini | Self::Turbo)
    }
}

impl std::fmt::Display for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Locale
// ---------------------------------------------------------------------------

/// Languages the phrase tables are written in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Locale {
    Ru,
    En,
}

impl Locale {
    /// Anything other than `en` reads as Russian, the primary audience.
    pub fn from_code(code: &str) -> Self {
        if code.eq_ignore_ascii_case("en") {
            Self::En
        } else {
            Self::Ru
        }
    }
}

/// Free, offline answer source.
pub trait OfflineGenerator: Send + Sync {
    fn generate(&self, kind: &str, prompt: &str, locale: &str) -> String;
}
