//! OpenAI-compatible completion client.
//!
//! Sends a single-turn chat completion to `{base_url}/v1/chat/completions`
//! and costs the call from the reported usage, or from the heuristic token
//! estimate when the upstream omits usage.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use reqwest::Client;
use tracing::debug;
use url::Url;

use super::pricing::{PricingTable, estimate_tokens};
use super::{Completion, CompletionProvider, ProviderError};

pub const SYSTEM_PROMPT: &str = "You are a concise, empathetic wellbeing companion.";

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    /// Base URL, e.g. `https://api.openai.com`.
    pub base_url: String,
    pub api_key: String,
    pub timeout_secs: u64,
}

// ---------------------------------------------------------------------------
// OpenAI-compatible response types for deserialization
// ---------------------------------------------------------------------------

#[derive(Debug, serde::Deserialize)]
struct OaiResponse {
    #[serde(default)]
    choices: Vec<OaiChoice>,
    #[serde(default)]
    usage: Option<OaiUsage>,
}

#[derive(Debug, serde::Deserialize)]
struct OaiChoice {
    #[serde(default)]
    message: Option<OaiMessage>,
}

#[derive(Debug, serde::Deserialize)]
struct OaiMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, serde::Deserialize)]
struct OaiUsage {
    #[serde(default)]
    prompt_tokens: Option<u32>,
    #[serde(default)]
    completion_tokens: Option<u32>,
}

// ---------------------------------------------------------------------------
// OpenAiClient
// ---------------------------------------------------------------------------

pub struct OpenAiClient {
    config: OpenAiConfig,
    client: Client,
    pricing: PricingTable,
}

impl OpenAiClient {
    pub fn new(config: OpenAiConfig) -> Result<Self, ProviderError> {
        if config.api_key.trim().is_empty() {
            return Err(ProviderError::NoCredential);
        }
        Url::parse(&config.base_url)
            .map_err(|e| ProviderError::Other(format!("Invalid base URL {}: {e}", config.base_url)))?;
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ProviderError::Other(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            config,
            client,
            pricing: PricingTable::new(),
        })
    }

    fn build_request_body(model: &str, prompt: &str, max_tokens: u32) -> serde_json::Value {
        serde_json::json!({
            "model": model,
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                { "role": "user", "content": prompt },
            ],
            "max_tokens": max_tokens,
        })
    }

    /// Turn a parsed response into a costed completion.
    fn convert_response(
        &self,
        oai: OaiResponse,
        model: &str,
        prompt: &str,
        max_tokens: u32,
    ) -> Result<Completion, ProviderError> {
        let choice = oai
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::Malformed("response has no choices".into()))?;
        let text = choice
            .message
            .and_then(|m| m.content)
            .unwrap_or_default()
            .trim()
            .to_string();

        let (estimated_in, estimated_out) = estimate_tokens(prompt, max_tokens);
        let usage = oai.usage;
        let tokens_in = usage
            .as_ref()
            .and_then(|u| u.prompt_tokens)
            .unwrap_or(estimated_in);
        let tokens_out = usage
            .as_ref()
            .and_then(|u| u.completion_tokens)
            .unwrap_or(estimated_out);

        Ok(Completion {
            text,
            tokens_in,
            tokens_out,
            usd_cost: self.pricing.cost(model, tokens_in, tokens_out),
        })
    }
}

impl CompletionProvider for OpenAiClient {
    fn id(&self) -> &str {
        "openai"
    }

    fn complete<'a>(
        &'a self,
        model: &'a str,
        prompt: &'a str,
        max_tokens: u32,
    ) -> Pin<Box<dyn Future<Output = Result<Completion, ProviderError>> + Send + 'a>> {
        Box::pin(async move {
            let url = format!(
                "{}/v1/chat/completions",
                self.config.base_url.trim_end_matches('/')
            );
            let body = Self::build_request_body(model, prompt, max_tokens);

            let resp = self
                .client
                .post(&url)
                .bearer_auth(&self.config.api_key)
                .json(&body)
                .send()
                .await
                .map_err(|e| {
                    if e.is_timeout() {
                        ProviderError::Timeout(self.config.timeout_secs)
                    } else {
                        ProviderError::Http(e)
                    }
                })?;

            let status = resp.status();
            if !status.is_success() {
                let code = status.as_u16();
                let body = resp.text().await.unwrap_or_default();
                return Err(ProviderError::Api {
                    status: code,
                    message: body,
                });
            }

            let oai: OaiResponse = resp
                .json()
                .await
                .map_err(|e| ProviderError::Malformed(format!("Failed to parse response: {e}")))?;

            let completion = self.convert_response(oai, model, prompt, max_tokens)?;
            debug!(
                model,
                tokens_in = completion.tokens_in,
                tokens_out = completion.tokens_out,
                cost = completion.usd_cost,
                "Completion received"
            );
            Ok(completion)
        })
    }
}
