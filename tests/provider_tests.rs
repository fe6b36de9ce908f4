//! Provider transports against mocked model APIs.

use std::sync::Arc;

use agentry::agent_loop::{AgentLoop, RunRequest};
use agentry::error::AgentryError;
use agentry::provider::anthropic::AnthropicProvider;
use agentry::provider::google::GoogleProvider;
use agentry::provider::{ModelProvider, ModelRequest, ToolDefinition};
use agentry::store::{ConversationStore, InMemoryConversationStore, ThreadId};
use agentry::tools::builtin::factorial_tool;
use agentry::tools::ToolRegistry;
use agentry::types::{FinishReason, Message};
use pretty_assertions::assert_eq;
use serde_json::json;
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn factorial_definition() -> ToolDefinition {
    ToolDefinition {
        name: "factorial".into(),
        description: "calculate the factorial of a given number".into(),
        parameters: json!({
            "type": "object",
            "properties": {"num": {"type": "integer"}},
            "required": ["num"]
        }),
    }
}

fn user_request(text: &str) -> ModelRequest {
    ModelRequest {
        messages: vec![Message::user(text)],
        tools: vec![factorial_definition()],
        ..Default::default()
    }
}

#[tokio::test]
async fn gemini_function_call_is_parsed() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/models/gemini-2.5-flash:generateContent"))
        .and(header("x-goog-api-key", "g-key"))
        .and(body_string_contains("functionDeclarations"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "candidates": [{
                "content": {"role": "model", "parts": [
                    {"functionCall": {"name": "factorial", "args": {"num": 5}}}
                ]},
                "finishReason": "STOP"
            }],
            "usageMetadata": {"promptTokenCount": 12, "candidatesTokenCount": 3, "totalTokenCount": 15}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let provider = GoogleProvider::new("gemini-2.5-flash".into(), "g-key".into(), Some(server.uri()));
    let response = provider
        .generate_text(&user_request("factorial of 5"))
        .await
        .unwrap();

    assert_eq!(response.tool_calls.len(), 1);
    assert_eq!(response.tool_calls[0].name, "factorial");
    assert_eq!(response.tool_calls[0].arguments, json!({"num": 5}));
    assert_eq!(response.finish_reason, Some(FinishReason::ToolCalls));
    assert_eq!(response.usage.total_tokens, 15);
}

#[tokio::test]
async fn gemini_errors_map_to_typed_failures() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(429).set_body_json(json!({
            "error": {"message": "quota", "retry_after": 2}
        })))
        .mount(&server)
        .await;

    let provider = GoogleProvider::new("gemini-2.5-flash".into(), "g-key".into(), Some(server.uri()));
    let err = provider.generate_text(&user_request("hi")).await.unwrap_err();

    assert!(matches!(
        err,
        AgentryError::RateLimited {
            retry_after_ms: Some(2000)
        }
    ));
    assert!(err.is_retryable());
}

#[tokio::test]
async fn gemini_without_candidates_is_malformed() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"candidates": []})))
        .mount(&server)
        .await;

    let provider = GoogleProvider::new("gemini-2.5-flash".into(), "g-key".into(), Some(server.uri()));
    let err = provider.generate_text(&user_request("hi")).await.unwrap_err();

    assert!(matches!(err, AgentryError::MalformedResponse(_)));
}

#[tokio::test]
async fn anthropic_tool_use_is_parsed() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/messages"))
        .and(header("x-api-key", "a-key"))
        .and(header("anthropic-version", "2023-06-01"))
        .and(body_string_contains("input_schema"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "content": [
                {"type": "text", "text": "Computing."},
                {"type": "tool_use", "id": "toolu_1", "name": "factorial", "input": {"num": 5}}
            ],
            "stop_reason": "tool_use",
            "usage": {"input_tokens": 20, "output_tokens": 8}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let provider =
        AnthropicProvider::new("claude-sonnet-4-5".into(), "a-key".into(), Some(server.uri()));
    let response = provider
        .generate_text(&user_request("factorial of 5"))
        .await
        .unwrap();

    assert_eq!(response.text, "Computing.");
    assert_eq!(response.tool_calls[0].id, "toolu_1");
    assert_eq!(response.finish_reason, Some(FinishReason::ToolCalls));
    assert_eq!(response.usage.total_tokens, 28);
}

#[tokio::test]
async fn anthropic_auth_failure_is_not_retryable() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(401).set_body_string("invalid x-api-key"))
        .mount(&server)
        .await;

    let provider =
        AnthropicProvider::new("claude-sonnet-4-5".into(), "bad".into(), Some(server.uri()));
    let err = provider.generate_text(&user_request("hi")).await.unwrap_err();

    assert!(matches!(err, AgentryError::Authentication(_)));
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn agent_loop_over_gemini_computes_factorial() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_string_contains("functionResponse"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "candidates": [{
                "content": {"role": "model", "parts": [{"text": "5! = 120"}]},
                "finishReason": "STOP"
            }]
        })))
        .with_priority(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "candidates": [{
                "content": {"role": "model", "parts": [
                    {"functionCall": {"name": "factorial", "args": {"num": 5}}}
                ]},
                "finishReason": "STOP"
            }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let store = Arc::new(InMemoryConversationStore::new());
    let agent = AgentLoop::new(
        Arc::new(GoogleProvider::new(
            "gemini-2.5-flash".into(),
            "g-key".into(),
            Some(server.uri()),
        )),
        Arc::new(ToolRegistry::new().with_tool(factorial_tool()).unwrap()),
        store.clone(),
    );

    let reply = agent
        .run(RunRequest::new("g1", "What is the factorial of 5?"))
        .await
        .unwrap();

    assert_eq!(reply.text, "5! = 120");
    let history = store.history(&ThreadId::new("g1")).await.unwrap();
    assert_eq!(history.len(), 4);
    assert_eq!(history[2].tool_results()[0].result, json!(120));
}
