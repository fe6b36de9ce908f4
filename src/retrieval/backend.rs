//! Vector storage behind the retrieval index.

use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::embedding::{cosine_similarity, Embedding};
use crate::error::{AgentryError, Result};

/// Chunk metadata. Values are JSON scalars.
pub type Metadata = BTreeMap<String, serde_json::Value>;

/// Equality filter over metadata keys. An empty filter matches everything.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetadataFilter {
    equals: BTreeMap<String, serde_json::Value>,
}

impl MetadataFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eq(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.equals.insert(key.into(), value.into());
        self
    }

    /// Restrict to chunks owned by `user_id`.
    pub fn user(user_id: impl Into<String>) -> Self {
        Self::new().eq("user_id", user_id.into())
    }

    pub fn is_empty(&self) -> bool {
        self.equals.is_empty()
    }

    pub fn conditions(&self) -> impl Iterator<Item = (&String, &serde_json::Value)> {
        self.equals.iter()
    }

    pub fn matches(&self, metadata: &Metadata) -> bool {
        self.equals
            .iter()
            .all(|(key, value)| metadata.get(key) == Some(value))
    }
}

/// One chunk as written to a backend.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorRecord {
    pub id: String,
    pub embedding: Embedding,
    pub document: String,
    pub metadata: Metadata,
}

/// One backend hit.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorMatch {
    pub id: String,
    pub document: String,
    pub metadata: Metadata,
    /// Higher is more similar.
    pub score: f32,
}

/// Vector database contract.
#[async_trait]
pub trait VectorBackend: Send + Sync {
    /// Insert or replace records by id. All records are written or none are.
    async fn upsert(&self, records: Vec<VectorRecord>) -> Result<()>;

    /// Up to `k` nearest records matching `filter`.
    async fn query(
        &self,
        embedding: &[f32],
        k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<VectorMatch>>;
}

/// Brute-force cosine search over records held in memory.
#[derive(Default)]
pub struct InMemoryVectorBackend {
    records: RwLock<HashMap<String, VectorRecord>>,
}

impl InMemoryVectorBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.read().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl VectorBackend for InMemoryVectorBackend {
    async fn upsert(&self, records: Vec<VectorRecord>) -> Result<()> {
        let mut store = self
            .records
            .write()
            .map_err(|_| AgentryError::RetrievalBackend("record lock poisoned".into()))?;
        for record in records {
            store.insert(record.id.clone(), record);
        }
        Ok(())
    }

    async fn query(
        &self,
        embedding: &[f32],
        k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<VectorMatch>> {
        let store = self
            .records
            .read()
            .map_err(|_| AgentryError::RetrievalBackend("record lock poisoned".into()))?;

        let mut matches: Vec<VectorMatch> = store
            .values()
            .filter(|r| filter.map_or(true, |f| f.matches(&r.metadata)))
            .map(|r| VectorMatch {
                id: r.id.clone(),
                document: r.document.clone(),
                metadata: r.metadata.clone(),
                score: cosine_similarity(embedding, &r.embedding),
            })
            .collect();

        matches.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });
        matches.truncate(k);
        Ok(matches)
    }
}
