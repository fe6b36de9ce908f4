//! Document retrieval: chunk, embed, store and search.
//!
//! [`RetrievalIndex::ingest`] splits a document into fixed character windows,
//! embeds every window and writes them to the [`VectorBackend`] in a single
//! upsert. [`RetrievalIndex::query`] embeds the question and returns the
//! top-k windows, best first. Query-side backend failures are logged and
//! reported as [`Retrieval::Empty`] so a flaky vector store degrades answers
//! instead of failing the conversation.

pub mod backend;
pub mod chroma;
pub mod chunking;
pub mod embedding;
pub mod extract;
pub mod tool;

pub use backend::{
    InMemoryVectorBackend, Metadata, MetadataFilter, VectorBackend, VectorMatch, VectorRecord,
};
pub use chroma::ChromaBackend;
pub use chunking::ChunkPolicy;
pub use embedding::{Embedder, Embedding, HashingEmbedder};
pub use extract::{AutoExtractor, PdftotextExtractor, PlainTextExtractor, TextExtractor};
pub use tool::RetrievalTool;

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{AgentryError, Result};

/// A stored chunk returned by a query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedChunk {
    pub document_id: String,
    pub chunk_index: usize,
    pub chunk_id: String,
    pub text: String,
    pub score: f32,
}

/// Query outcome. `Matches` is never empty.
#[derive(Debug, Clone, PartialEq)]
pub enum Retrieval {
    Matches(Vec<RetrievedChunk>),
    Empty,
}

impl Retrieval {
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }

    pub fn chunks(&self) -> &[RetrievedChunk] {
        match self {
            Self::Matches(chunks) => chunks,
            Self::Empty => &[],
        }
    }
}

/// Result of a successful ingest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestReport {
    pub document_id: String,
    pub chunk_ids: Vec<String>,
}

impl IngestReport {
    pub fn chunk_count(&self) -> usize {
        self.chunk_ids.len()
    }
}

pub struct RetrievalIndex {
    embedder: Arc<dyn Embedder>,
    backend: Arc<dyn VectorBackend>,
    policy: ChunkPolicy,
}

impl RetrievalIndex {
    pub fn new(embedder: Arc<dyn Embedder>, backend: Arc<dyn VectorBackend>) -> Self {
        Self {
            embedder,
            backend,
            policy: ChunkPolicy::default(),
        }
    }

    pub fn with_chunk_policy(mut self, policy: ChunkPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// In-memory index with the hashing embedder.
    pub fn in_memory() -> Self {
        Self::new(
            Arc::new(HashingEmbedder::default()),
            Arc::new(InMemoryVectorBackend::new()),
        )
    }

    pub fn chunk_policy(&self) -> ChunkPolicy {
        self.policy
    }

    /// Chunk, embed and upsert `text` as `document_id`.
    ///
    /// Chunk ids are `{document_id}-{ingest_millis}-{index}`. Nothing is
    /// written unless every chunk embedded successfully.
    pub async fn ingest(
        &self,
        document_id: &str,
        text: &str,
        owner: Option<&str>,
    ) -> Result<IngestReport> {
        if text.trim().is_empty() {
            return Err(AgentryError::ingestion(document_id, "document has no text"));
        }
        let chunks = self.policy.split(text);

        let stamp = chrono::Utc::now().timestamp_millis();
        let texts: Vec<String> = chunks.iter().map(|c| c.to_string()).collect();
        let embeddings = self
            .embedder
            .embed(&texts)
            .await
            .map_err(|err| AgentryError::ingestion(document_id, format!("embedding failed: {err}")))?;
        if embeddings.len() != texts.len() {
            return Err(AgentryError::ingestion(
                document_id,
                format!(
                    "embedder returned {} vectors for {} chunks",
                    embeddings.len(),
                    texts.len()
                ),
            ));
        }

        let records: Vec<VectorRecord> = texts
            .into_iter()
            .zip(embeddings)
            .enumerate()
            .map(|(index, (document, embedding))| {
                let mut metadata = Metadata::new();
                metadata.insert("document_id".into(), document_id.into());
                metadata.insert("chunk".into(), index.into());
                if let Some(owner) = owner {
                    metadata.insert("user_id".into(), owner.into());
                }
                VectorRecord {
                    id: format!("{document_id}-{stamp}-{index}"),
                    embedding,
                    document,
                    metadata,
                }
            })
            .collect();
        let chunk_ids: Vec<String> = records.iter().map(|r| r.id.clone()).collect();

        self.backend
            .upsert(records)
            .await
            .map_err(|err| AgentryError::ingestion(document_id, format!("upsert failed: {err}")))?;

        tracing::info!(
            document_id,
            owner = owner.unwrap_or("-"),
            chunks = chunk_ids.len(),
            "document ingested"
        );
        Ok(IngestReport {
            document_id: document_id.to_string(),
            chunk_ids,
        })
    }

    /// Top `k` chunks for `text`, best first.
    pub async fn query(&self, text: &str, k: usize, filter: Option<&MetadataFilter>) -> Retrieval {
        if text.trim().is_empty() || k == 0 {
            return Retrieval::Empty;
        }
        match self.try_query(text, k, filter).await {
            Ok(retrieval) => retrieval,
            Err(err) => {
                tracing::warn!(error = %err, "retrieval query failed; returning no results");
                Retrieval::Empty
            }
        }
    }

    async fn try_query(
        &self,
        text: &str,
        k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Retrieval> {
        let mut embeddings = self.embedder.embed(&[text.to_string()]).await?;
        let embedding = embeddings
            .pop()
            .ok_or_else(|| AgentryError::RetrievalBackend("embedder returned no vector".into()))?;

        let mut chunks: Vec<RetrievedChunk> = self
            .backend
            .query(&embedding, k, filter)
            .await?
            .into_iter()
            .map(into_chunk)
            .collect();
        chunks.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        chunks.truncate(k);

        if chunks.is_empty() {
            Ok(Retrieval::Empty)
        } else {
            Ok(Retrieval::Matches(chunks))
        }
    }
}

fn into_chunk(hit: VectorMatch) -> RetrievedChunk {
    let document_id = hit
        .metadata
        .get("document_id")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string();
    let chunk_index = hit
        .metadata
        .get("chunk")
        .and_then(|v| v.as_u64())
        .unwrap_or_default() as usize;
    RetrievedChunk {
        document_id,
        chunk_index,
        chunk_id: hit.id,
        text: hit.document,
        score: hit.score,
    }
}
