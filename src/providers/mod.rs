//! Paid completion providers.
//!
//! Defines the `CompletionProvider` contract and its error type, plus the
//! OpenAI-compatible HTTP client and the pricing table used to cost calls.

pub mod openai;
pub mod pricing;

use std::future::Future;
use std::pin::Pin;

pub use self::openai::{OpenAiClient, OpenAiConfig};
pub use self::pricing::PricingTable;

// ---------------------------------------------------------------------------
// ProviderError
// ---------------------------------------------------------------------------

/// Errors that can occur during a completion call.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("No API key configured")]
    NoCredential,

    #[error("Request timed out after {0}s")]
    Timeout(u64),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Malformed response: {0}")]
    Malformed(String),

    #[error("{0}")]
    Other(String),
}

// ---------------------------------------------------------------------------
// Completion
// ---------------------------------------------------------------------------

/// Result of a paid completion: text, token counts and cost in USD.
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub text: String,
    pub tokens_in: u32,
    pub tokens_out: u32,
    pub usd_cost: f64,
}

// ---------------------------------------------------------------------------
// CompletionProvider trait
// ---------------------------------------------------------------------------

/// Contract for a paid model backend.
///
/// Returns a boxed future so the trait is dyn-compatible (can be used as
/// `Arc<dyn CompletionProvider>`). Implementations estimate token counts and
/// cost when the upstream does not report usage.
pub trait CompletionProvider: Send + Sync {
    /// Identifier used in logs.
    fn id(&self) -> &str;

    fn complete<'a>(
        &'a self,
        model: &'a str,
        prompt: &'a str,
        max_tokens: u32,
    ) -> Pin<Box<dyn Future<Output = Result<Completion, ProviderError>> + Send + 'a>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_error_display() {
        assert_eq!(ProviderError::NoCredential.to_string(), "No API key configured");
        assert_eq!(ProviderError::Timeout(10).to_string(), "Request timed out after 10s");
        assert_eq!(
            ProviderError::Malformed("no choices".into()).to_string(),
            "Malformed response: no choices"
        );
    }

    #[test]
    fn test_provider_error_api() {
        let err = ProviderError::Api {
            status: 429,
            message: "Too many requests".into(),
        };
        assert_eq!(err.to_string(), "API error (429): Too many requests");
    }

    #[test]
    fn test_provider_error_other() {
        let err = ProviderError::Other("something went wrong".into());
        assert_eq!(err.to_string(), "something went wrong");
    }
}
