//! `generate` / `upload` / `query` through the service layer.

mod common;

use std::io::Write;
use std::sync::Arc;

use agentry::config::AgentryConfig;
use agentry::error::ErrorKind;
use agentry::retrieval::{PlainTextExtractor, RetrievalIndex};
use agentry::service::{
    AgentService, GenerateRequest, QueryRequest, UploadRequest, UploadResponse, UPLOAD_OK,
};
use agentry::store::{ConversationStore, InMemoryConversationStore, ThreadId};
use common::ScriptedProvider;
use pretty_assertions::assert_eq;
use serde_json::json;

struct Harness {
    service: AgentService,
    provider: Arc<ScriptedProvider>,
    store: Arc<InMemoryConversationStore>,
}

fn harness(provider: ScriptedProvider) -> Harness {
    let provider = Arc::new(provider);
    let store = Arc::new(InMemoryConversationStore::new());
    let service = AgentService::from_parts(
        provider.clone(),
        store.clone(),
        Arc::new(RetrievalIndex::in_memory()),
        Arc::new(PlainTextExtractor),
        &AgentryConfig::default(),
    )
    .unwrap();
    Harness {
        service,
        provider,
        store,
    }
}

fn text_file(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(".txt").tempfile().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

#[tokio::test]
async fn generate_creates_and_continues_threads() {
    let h = harness(ScriptedProvider::new().text("Hi!").text("Still here."));

    let first = h
        .service
        .generate(GenerateRequest {
            prompt: "hello".into(),
            thread_id: None,
        })
        .await
        .unwrap();
    let second = h
        .service
        .generate(GenerateRequest {
            prompt: "again".into(),
            thread_id: Some(first.thread_id.to_string()),
        })
        .await
        .unwrap();

    assert_eq!(first.reply, "Hi!");
    assert_eq!(second.thread_id, first.thread_id);
    assert_eq!(h.store.history(&first.thread_id).await.unwrap().len(), 4);
}

#[tokio::test]
async fn generate_offers_standard_tools_and_rag() {
    let h = harness(ScriptedProvider::new().text("ok"));

    h.service
        .generate(GenerateRequest {
            prompt: "hello".into(),
            thread_id: Some("t".into()),
        })
        .await
        .unwrap();

    let names: Vec<String> = h.provider.requests()[0]
        .tools
        .iter()
        .map(|t| t.name.clone())
        .collect();
    assert_eq!(names, vec!["factorial", "sum", "Joke", "RAG"]);
}

#[tokio::test]
async fn generate_failure_is_reported_with_kind() {
    let h = harness(
        ScriptedProvider::new()
            .tool_call("teleport", json!({}))
            .tool_call("teleport", json!({}))
            .tool_call("teleport", json!({})),
    );

    let failure = h
        .service
        .generate(GenerateRequest {
            prompt: "beam me up".into(),
            thread_id: Some("t".into()),
        })
        .await
        .unwrap_err();

    assert_eq!(failure.kind, ErrorKind::UnknownTool);
    assert_eq!(failure.thread_id, ThreadId::new("t"));
}

#[tokio::test]
async fn upload_then_query_answers_from_the_document() {
    let h = harness(
        ScriptedProvider::new()
            .tool_call("RAG", json!({"query": "refund window"}))
            .text("Refunds are accepted within 14 days."),
    );
    let file = text_file("Our refund window is 14 days from delivery.");

    let upload = h
        .service
        .upload(UploadRequest {
            path: file.path().to_path_buf(),
            user_id: Some("u1".into()),
            document_id: Some("policy".into()),
        })
        .await;
    assert_eq!(
        upload,
        UploadResponse::Ok {
            message: UPLOAD_OK.into()
        }
    );

    let answer = h
        .service
        .query(QueryRequest {
            query: "What is the refund window?".into(),
            user_id: Some("u1".into()),
            thread_id: None,
        })
        .await
        .unwrap();

    assert_eq!(answer.result, "Refunds are accepted within 14 days.");
    let requests = h.provider.requests();
    assert_eq!(requests[0].tools.len(), 1);
    assert_eq!(requests[0].tools[0].name, "RAG");

    let history = h.store.history(&answer.thread_id).await.unwrap();
    let passage = history[2].tool_results()[0].result.clone();
    assert_eq!(passage, json!("Our refund window is 14 days from delivery."));
}

#[tokio::test]
async fn uploads_are_scoped_to_their_owner() {
    let h = harness(
        ScriptedProvider::new()
            .tool_call("RAG", json!({"query": "salary"}))
            .text("nothing found"),
    );
    let file = text_file("Salary bands for 2026.");
    assert!(h
        .service
        .upload(UploadRequest {
            path: file.path().to_path_buf(),
            user_id: Some("hr".into()),
            document_id: None,
        })
        .await
        .is_ok());

    let answer = h
        .service
        .query(QueryRequest {
            query: "salary?".into(),
            user_id: Some("intern".into()),
            thread_id: Some("q".into()),
        })
        .await
        .unwrap();

    let history = h.store.history(&answer.thread_id).await.unwrap();
    assert_eq!(
        history[2].tool_results()[0].result,
        json!(agentry::retrieval::tool::NO_RESULTS)
    );
}

#[tokio::test]
async fn upload_of_missing_file_reports_error() {
    let h = harness(ScriptedProvider::new());

    let response = h
        .service
        .upload(UploadRequest {
            path: "/definitely/not/here.txt".into(),
            user_id: None,
            document_id: None,
        })
        .await;

    assert!(matches!(response, UploadResponse::Error { .. }));
}

#[tokio::test]
async fn upload_of_empty_file_is_an_ingestion_error() {
    let h = harness(ScriptedProvider::new());
    let file = text_file("   ");

    let response = h
        .service
        .upload(UploadRequest {
            path: file.path().to_path_buf(),
            user_id: None,
            document_id: Some("blank".into()),
        })
        .await;

    match response {
        UploadResponse::Error { error } => assert!(error.contains("blank")),
        other => panic!("expected error, got {other:?}"),
    }
}

#[test]
fn from_config_requires_credentials() {
    let err = AgentService::from_config(&AgentryConfig::default())
        .err()
        .unwrap();

    assert!(err.to_string().contains("GEMINI_API_KEY"));
}
