//! OpenAI-compatible backend against a local wiremock server.
//!
//! `cargo test -p tidy-inference --features openai --test openai_backend_test`

#![cfg(feature = "openai")]

use serde_json::json;
use tidy_core::{ClassificationService, Error};
use tidy_inference::openai::{OpenAIBackend, OpenAIConfig};
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn backend(server: &MockServer, api_key: Option<&str>) -> OpenAIBackend {
    OpenAIBackend::new(OpenAIConfig {
        base_url: format!("{}/v1", server.uri()),
        api_key: api_key.map(String::from),
        timeout_seconds: 10,
        json_mode: true,
    })
    .unwrap()
}

#[tokio::test]
async fn test_invoke_sends_model_and_json_mode() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("Authorization", "Bearer sk-test"))
        .and(body_partial_json(json!({
            "model": "gpt-4o-mini",
            "response_format": {"type": "json_object"}
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "chatcmpl-1",
            "choices": [{
                "index": 0,
                "message": {"role": "assistant", "content": "{\"chunks\":[]}"},
                "finish_reason": "stop"
            }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let text = backend(&server, Some("sk-test"))
        .invoke("route notes", "blocks", "gpt-4o-mini")
        .await
        .unwrap();
    assert_eq!(text, "{\"chunks\":[]}");
}

#[tokio::test]
async fn test_system_message_comes_first() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(body_partial_json(json!({
            "messages": [
                {"role": "system", "content": "sys"},
                {"role": "user", "content": "user"}
            ]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"index": 0, "message": {"role": "assistant", "content": "[]"}}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let text = backend(&server, None).invoke("sys", "user", "m").await.unwrap();
    assert_eq!(text, "[]");
}

#[tokio::test]
async fn test_missing_model_is_retryable_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "error": {"message": "model 'nope' not found", "type": "model_not_found"}
        })))
        .mount(&server)
        .await;

    let err = backend(&server, None)
        .invoke("", "p", "nope")
        .await
        .unwrap_err();
    assert!(err.is_retryable_classification());
    assert!(err.to_string().contains("not found"));
}

#[tokio::test]
async fn test_bad_credentials_are_config_errors() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "error": {"message": "invalid key", "type": "invalid_request_error"}
        })))
        .mount(&server)
        .await;

    let err = backend(&server, Some("bad"))
        .invoke("", "p", "m")
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Config(_)));
}

#[tokio::test]
async fn test_empty_choices_yield_empty_text() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"choices": []})))
        .mount(&server)
        .await;

    let text = backend(&server, None).invoke("", "p", "m").await.unwrap();
    assert!(text.is_empty());
}

#[tokio::test]
async fn test_health_check_uses_models_endpoint() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/models"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": []})))
        .mount(&server)
        .await;

    assert!(backend(&server, None).health_check().await.unwrap());
}
