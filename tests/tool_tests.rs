//! Tests for the tool registry and parameter schemas.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use agentry::error::{AgentryError, ErrorKind};
use agentry::tools::{AgentTool, ToolArguments, ToolExecutionContext, ToolParameters, ToolRegistry};
use common::counting_tool;
use pretty_assertions::assert_eq;
use serde_json::json;

#[test]
fn parameter_builder_constructs_schema() {
    let params = ToolParameters::object()
        .string("query", "Search query", true)
        .number("limit", "Max results", false)
        .boolean("verbose", "Enable verbose output", false)
        .build();

    let schema = &params.schema;
    assert_eq!(schema["type"], "object");
    assert_eq!(schema["properties"]["query"]["type"], "string");
    assert_eq!(schema["properties"]["limit"]["type"], "number");
    assert_eq!(schema["required"].as_array().unwrap().len(), 1);
}

#[test]
fn tool_arguments_accessors() {
    let args = ToolArguments::new(json!({"name": "Alice", "age": 30}));
    assert_eq!(args.get_str("name").unwrap(), "Alice");
    assert_eq!(args.get_i64("age").unwrap(), 30);
    assert!(args.get_str("missing").is_err());
    assert_eq!(args.get_str_opt("missing"), None);
}

#[test]
fn duplicate_names_are_rejected() {
    let calls = Arc::new(AtomicUsize::new(0));
    let mut registry = ToolRegistry::new();
    registry.register(counting_tool("echo", calls.clone())).unwrap();

    let err = registry.register(counting_tool("echo", calls)).unwrap_err();

    assert!(matches!(err, AgentryError::DuplicateTool(ref name) if name == "echo"));
    assert_eq!(err.kind(), ErrorKind::DuplicateTool);
    assert_eq!(registry.len(), 1);
}

#[tokio::test]
async fn handler_is_not_invoked_when_arguments_fail_the_schema() {
    let calls = Arc::new(AtomicUsize::new(0));
    let registry = ToolRegistry::new()
        .with_tool(counting_tool("echo", calls.clone()))
        .unwrap();
    let ctx = ToolExecutionContext::default();

    for bad in [json!({}), json!({"value": 7}), json!([1, 2]), json!("not json")] {
        let err = registry.dispatch("echo", bad, &ctx).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SchemaValidation);
    }
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    let ok = registry
        .dispatch("echo", json!({"value": "hi"}), &ctx)
        .await
        .unwrap();
    assert_eq!(ok, json!("hi"));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn unknown_tool_is_reported() {
    let registry = ToolRegistry::new();

    let err = registry
        .dispatch("ghost", json!({}), &ToolExecutionContext::default())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::UnknownTool);
}

#[tokio::test]
async fn handler_errors_are_wrapped_and_values_pass_through() {
    let tool = AgentTool::new(
        "lookup",
        "returns a structured value or fails",
        ToolParameters::object().boolean("fail", "whether to fail", true).build(),
        |args: ToolArguments, ctx: ToolExecutionContext| async move {
            if args.raw()["fail"].as_bool().unwrap_or(false) {
                return Err(AgentryError::api(502, "bad gateway"));
            }
            Ok(json!({"user": ctx.user_id, "items": [1, 2, 3]}))
        },
    );
    let registry = ToolRegistry::new().with_tool(Arc::new(tool)).unwrap();
    let ctx = ToolExecutionContext {
        user_id: Some("u7".into()),
        ..Default::default()
    };

    let value = registry
        .dispatch("lookup", json!({"fail": false}), &ctx)
        .await
        .unwrap();
    assert_eq!(value, json!({"user": "u7", "items": [1, 2, 3]}));

    let err = registry
        .dispatch("lookup", json!({"fail": true}), &ctx)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ToolExecution);
    assert!(err.is_retryable());
}
