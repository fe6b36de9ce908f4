//! Chroma backend over a mocked REST API.

use std::sync::Arc;

use agentry::error::ErrorKind;
use agentry::retrieval::{
    ChromaBackend, HashingEmbedder, MetadataFilter, RetrievalIndex, VectorBackend, VectorRecord,
};
use pretty_assertions::assert_eq;
use serde_json::json;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn mount_collection(server: &MockServer, times: u64) {
    Mock::given(method("POST"))
        .and(path("/api/v1/collections"))
        .and(body_partial_json(json!({
            "name": "user_pdfs",
            "get_or_create": true,
            "metadata": {"hnsw:space": "cosine"}
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "col-1",
            "name": "user_pdfs"
        })))
        .expect(times)
        .mount(server)
        .await;
}

#[tokio::test]
async fn upsert_then_query_reuses_the_collection() {
    let server = MockServer::start().await;
    mount_collection(&server, 1).await;
    Mock::given(method("POST"))
        .and(path("/api/v1/collections/col-1/upsert"))
        .and(body_partial_json(json!({
            "ids": ["doc-1-0"],
            "documents": ["hello world"],
            "metadatas": [{"user_id": "u1", "chunk": 0}]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!(true)))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/v1/collections/col-1/query"))
        .and(body_partial_json(json!({
            "n_results": 3,
            "where": {"user_id": "u1"}
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ids": [["doc-1-0"]],
            "documents": [["hello world"]],
            "metadatas": [[{"user_id": "u1", "chunk": 0, "document_id": "doc"}]],
            "distances": [[0.25]]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let backend = ChromaBackend::new(server.uri(), "user_pdfs");
    let mut metadata = agentry::retrieval::Metadata::new();
    metadata.insert("user_id".into(), json!("u1"));
    metadata.insert("chunk".into(), json!(0));
    backend
        .upsert(vec![VectorRecord {
            id: "doc-1-0".into(),
            embedding: vec![0.1, 0.2, 0.3],
            document: "hello world".into(),
            metadata,
        }])
        .await
        .unwrap();

    let hits = backend
        .query(&[0.1, 0.2, 0.3], 3, Some(&MetadataFilter::user("u1")))
        .await
        .unwrap();

    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].id, "doc-1-0");
    assert_eq!(hits[0].document, "hello world");
    assert!((hits[0].score - 0.75).abs() < 1e-6);
}

#[tokio::test]
async fn server_errors_are_backend_errors() {
    let server = MockServer::start().await;
    mount_collection(&server, 1).await;
    Mock::given(method("POST"))
        .and(path("/api/v1/collections/col-1/query"))
        .respond_with(ResponseTemplate::new(500).set_body_string("index corrupted"))
        .mount(&server)
        .await;

    let backend = ChromaBackend::new(server.uri(), "user_pdfs");
    let err = backend.query(&[1.0], 3, None).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::RetrievalBackend);
    assert!(err.to_string().contains("index corrupted"));
}

#[tokio::test]
async fn index_over_unreachable_chroma_returns_empty() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let index = RetrievalIndex::new(
        Arc::new(HashingEmbedder::default()),
        Arc::new(ChromaBackend::new(server.uri(), "user_pdfs")),
    );

    assert!(index.query("anything", 3, None).await.is_empty());
    let err = index.ingest("doc", "some text", Some("u1")).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Ingestion);
}
