//! Chroma vector database over its REST API.

use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::OnceCell;

use super::backend::{Metadata, MetadataFilter, VectorBackend, VectorMatch, VectorRecord};
use crate::error::{AgentryError, Result};
use crate::provider::http::shared_client;

/// A Chroma collection created on first use with cosine distance.
pub struct ChromaBackend {
    base_url: String,
    collection: String,
    collection_id: OnceCell<String>,
}

#[derive(Deserialize)]
struct CollectionResponse {
    id: String,
}

#[derive(Deserialize, Default)]
struct QueryResponse {
    #[serde(default)]
    ids: Vec<Vec<String>>,
    #[serde(default)]
    documents: Option<Vec<Vec<Option<String>>>>,
    #[serde(default)]
    metadatas: Option<Vec<Vec<Option<Metadata>>>>,
    #[serde(default)]
    distances: Option<Vec<Vec<Option<f32>>>>,
}

impl ChromaBackend {
    pub fn new(base_url: impl Into<String>, collection: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            collection: collection.into(),
            collection_id: OnceCell::new(),
        }
    }

    async fn collection_id(&self) -> Result<&str> {
        let id = self
            .collection_id
            .get_or_try_init(move || async move {
                let body = serde_json::json!({
                    "name": self.collection,
                    "metadata": { "hnsw:space": "cosine" },
                    "get_or_create": true,
                });
                let data: CollectionResponse = self
                    .post(&format!("{}/api/v1/collections", self.base_url), &body)
                    .await?;
                tracing::debug!(collection = %self.collection, id = %data.id, "chroma collection ready");
                Ok::<_, AgentryError>(data.id)
            })
            .await?;
        Ok(id.as_str())
    }

    async fn post<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        body: &serde_json::Value,
    ) -> Result<T> {
        let resp = shared_client()
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|e| AgentryError::RetrievalBackend(format!("chroma request failed: {e}")))?;
        let status = resp.status().as_u16();
        let text = resp
            .text()
            .await
            .map_err(|e| AgentryError::RetrievalBackend(format!("chroma response unreadable: {e}")))?;
        if !(200..300).contains(&status) {
            return Err(AgentryError::RetrievalBackend(format!(
                "chroma returned {status}: {text}"
            )));
        }
        // Upsert answers with an empty body or `true`.
        let text = if text.trim().is_empty() { "null" } else { text.as_str() };
        serde_json::from_str(text)
            .map_err(|e| AgentryError::RetrievalBackend(format!("unexpected chroma response: {e}")))
    }
}

/// Chroma `where` clause: a single condition or an `$and` of several.
fn where_clause(filter: &MetadataFilter) -> Option<serde_json::Value> {
    let mut conditions: Vec<serde_json::Value> = filter
        .conditions()
        .map(|(k, v)| {
            let mut condition = serde_json::Map::new();
            condition.insert(k.clone(), v.clone());
            serde_json::Value::Object(condition)
        })
        .collect();
    match conditions.len() {
        0 => None,
        1 => conditions.pop(),
        _ => Some(serde_json::json!({ "$and": conditions })),
    }
}

#[async_trait]
impl VectorBackend for ChromaBackend {
    async fn upsert(&self, records: Vec<VectorRecord>) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        let id = self.collection_id().await?;

        let mut ids = Vec::with_capacity(records.len());
        let mut embeddings = Vec::with_capacity(records.len());
        let mut documents = Vec::with_capacity(records.len());
        let mut metadatas = Vec::with_capacity(records.len());
        for record in records {
            ids.push(record.id);
            embeddings.push(record.embedding);
            documents.push(record.document);
            metadatas.push(record.metadata);
        }

        let body = serde_json::json!({
            "ids": ids,
            "embeddings": embeddings,
            "documents": documents,
            "metadatas": metadatas,
        });
        let _: serde_json::Value = self
            .post(
                &format!("{}/api/v1/collections/{id}/upsert", self.base_url),
                &body,
            )
            .await?;
        Ok(())
    }

    async fn query(
        &self,
        embedding: &[f32],
        k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<VectorMatch>> {
        let id = self.collection_id().await?;

        let mut body = serde_json::json!({
            "query_embeddings": [embedding],
            "n_results": k,
            "include": ["documents", "metadatas", "distances"],
        });
        if let Some(clause) = filter.and_then(where_clause) {
            body["where"] = clause;
        }

        let data: QueryResponse = self
            .post(
                &format!("{}/api/v1/collections/{id}/query", self.base_url),
                &body,
            )
            .await?;

        let ids = data.ids.into_iter().next().unwrap_or_default();
        let mut documents = data.documents.and_then(|d| d.into_iter().next()).unwrap_or_default();
        let mut metadatas = data.metadatas.and_then(|m| m.into_iter().next()).unwrap_or_default();
        let mut distances = data.distances.and_then(|d| d.into_iter().next()).unwrap_or_default();
        documents.resize(ids.len(), None);
        metadatas.resize(ids.len(), None);
        distances.resize(ids.len(), None);

        Ok(ids
            .into_iter()
            .zip(documents)
            .zip(metadatas)
            .zip(distances)
            .map(|(((id, document), metadata), distance)| VectorMatch {
                id,
                document: document.unwrap_or_default(),
                metadata: metadata.unwrap_or_default(),
                score: distance.map_or(0.0, |d| 1.0 - d),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn where_clause_shapes() {
        assert_eq!(where_clause(&MetadataFilter::new()), None);
        assert_eq!(
            where_clause(&MetadataFilter::user("u1")),
            Some(json!({ "user_id": "u1" }))
        );
        assert_eq!(
            where_clause(&MetadataFilter::user("u1").eq("document_id", "d")),
            Some(json!({ "$and": [{ "document_id": "d" }, { "user_id": "u1" }] }))
        );
    }
}
