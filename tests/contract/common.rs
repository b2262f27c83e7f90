use calmgate::providers::{CompletionProvider, OpenAiClient, OpenAiConfig};

pub const API_KEY: &str = "sk-contract";

pub fn client(base_url: &str, timeout_secs: u64) -> OpenAiClient {
    OpenAiClient::new(OpenAiConfig {
        base_url: base_url.to_string(),
        api_key: API_KEY.to_string(),
        timeout_secs,
    })
    .unwrap()
}

pub fn completion_body(text: &str, usage: Option<(u32, u32)>) -> serde_json::Value {
    let mut body = serde_json::json!({
        "id": "chatcmpl-1",
        "object": "chat.completion",
        "choices": [{
            "index": 0,
            "message": { "role": "assistant", "content": text },
            "finish_reason": "stop"
        }]
    });
    if let Some((prompt, completion)) = usage {
        body["usage"] = serde_json::json!({
            "prompt_tokens": prompt,
            "completion_tokens": completion,
            "total_tokens": prompt + completion
        });
    }
    body
}

/// Any provider must return a non-empty, positively costed completion for a
/// well-formed upstream reply.
pub async fn assert_completion_basic<P: CompletionProvider>(provider: &P, model: &str) {
    let result = provider.complete(model, "Hello", 120).await;
    let completion = result.unwrap_or_else(|e| panic!("completion failed: {e}"));
    assert!(!completion.text.is_empty());
    assert!(completion.usd_cost > 0.0);
}
