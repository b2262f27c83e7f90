use std::sync::Arc;
use std::time::Duration;

use calmgate::budget::SystemClock;
use calmgate::providers::{CompletionProvider, ProviderError};
use calmgate::router::{AiRouter, AskRequest, RouterSettings};
use calmgate::store::MemoryStore;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::common::{self, API_KEY};

const ANSWER: &str = "Put one hand on your chest and breathe slowly until your shoulders drop a little.";

async fn mount(server: &MockServer, template: ResponseTemplate) {
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("authorization", format!("Bearer {API_KEY}").as_str()))
        .respond_with(template)
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_openai_instantiation() {
    let provider = common::client("http://localhost:1", 5);
    assert_eq!(provider.id(), "openai");
}

#[tokio::test]
async fn test_openai_completion_contract() {
    let server = MockServer::start().await;
    mount(
        &server,
        ResponseTemplate::new(200).set_body_json(common::completion_body(ANSWER, Some((2000, 400)))),
    )
    .await;

    let provider = common::client(&server.uri(), 5);
    common::assert_completion_basic(&provider, "gpt-4-turbo").await;

    let completion = provider.complete("gpt-4-turbo", "Hello", 400).await.unwrap();
    assert_eq!(completion.text, ANSWER);
    assert_eq!((completion.tokens_in, completion.tokens_out), (2000, 400));
    assert_eq!(completion.usd_cost, 0.0016);
}

#[tokio::test]
async fn test_openai_request_shape() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(body_partial_json(serde_json::json!({
            "model": "gpt-4-mini",
            "max_tokens": 120,
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(common::completion_body("ok", Some((3, 1)))))
        .expect(1)
        .mount(&server)
        .await;

    let provider = common::client(&server.uri(), 5);
    provider.complete("gpt-4-mini", "hi", 120).await.unwrap();
}

#[tokio::test]
async fn test_openai_missing_usage_is_estimated() {
    let server = MockServer::start().await;
    mount(
        &server,
        ResponseTemplate::new(200).set_body_json(common::completion_body(ANSWER, None)),
    )
    .await;

    let provider = common::client(&server.uri(), 5);
    let completion = provider
        .complete("gpt-4-mini", "one two three four five", 120)
        .await
        .unwrap();
    assert_eq!((completion.tokens_in, completion.tokens_out), (6, 72));
    assert!(completion.usd_cost > 0.0);
}

#[tokio::test]
async fn test_openai_upstream_error_status() {
    let server = MockServer::start().await;
    mount(&server, ResponseTemplate::new(503).set_body_string("overloaded")).await;

    let provider = common::client(&server.uri(), 5);
    let err = provider.complete("gpt-4-mini", "hi", 120).await.unwrap_err();
    match err {
        ProviderError::Api { status, message } => {
            assert_eq!(status, 503);
            assert_eq!(message, "overloaded");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_openai_malformed_body() {
    let server = MockServer::start().await;
    mount(&server, ResponseTemplate::new(200).set_body_string("not json")).await;

    let provider = common::client(&server.uri(), 5);
    let err = provider.complete("gpt-4-mini", "hi", 120).await.unwrap_err();
    assert!(matches!(err, ProviderError::Malformed(_)));
}

#[tokio::test]
async fn test_openai_timeout() {
    let server = MockServer::start().await;
    mount(
        &server,
        ResponseTemplate::new(200)
            .set_body_json(common::completion_body(ANSWER, None))
            .set_delay(Duration::from_secs(3)),
    )
    .await;

    let provider = common::client(&server.uri(), 1);
    let err = provider.complete("gpt-4-mini", "hi", 120).await.unwrap_err();
    assert!(matches!(err, ProviderError::Timeout(1)));
}

#[tokio::test]
async fn test_router_over_openai_falls_back_on_upstream_failure() {
    let server = MockServer::start().await;
    mount(&server, ResponseTemplate::new(500)).await;

    let store = Arc::new(MemoryStore::new());
    let provider: Arc<dyn CompletionProvider> = Arc::new(common::client(&server.uri(), 5));
    let router = AiRouter::with_store(
        RouterSettings::default(),
        store.clone(),
        Some(provider),
        Arc::new(SystemClock),
    );

    let answer = router
        .ask(AskRequest::new("weekly_review", "how was my week").locale("en"))
        .await
        .unwrap();
    assert_eq!(answer.source, "local");
    assert_eq!(store.usage_records().len(), 1);
    assert_eq!(router.ledger().today_spend(), 0.0);
}

#[tokio::test]
async fn test_router_over_openai_caches_paid_answer() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(common::completion_body(ANSWER, Some((1000, 1000)))),
        )
        .expect(1)
        .mount(&server)
        .await;

    let store = Arc::new(MemoryStore::new());
    let provider: Arc<dyn CompletionProvider> = Arc::new(common::client(&server.uri(), 5));
    let router = AiRouter::with_store(
        RouterSettings::default(),
        store.clone(),
        Some(provider),
        Arc::new(SystemClock),
    );

    let first = router.ask(AskRequest::new("mood_reply", "tired")).await.unwrap();
    assert_eq!(first.source, "mini");
    assert_eq!(first.usd_cost, 0.00075);

    let second = router.ask(AskRequest::new("mood_reply", "Tired")).await.unwrap();
    assert!(second.cached);
    assert_eq!(second.tokens_in, 1000);
}
