//! Request-level operations: `generate`, `upload` and `query`.
//!
//! [`AgentService`] owns two agent loops that share one provider and one
//! conversation store. The general loop carries every standard tool plus
//! `RAG`; the retrieval loop only carries `RAG`, so `query` answers from
//! uploaded documents rather than from arithmetic or web tools.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::agent_loop::{AgentFailure, AgentLoop, LoopLimits, RunRequest};
use crate::config::AgentryConfig;
use crate::error::Result;
use crate::provider::{create_provider, ModelProvider};
use crate::retrieval::{
    AutoExtractor, ChromaBackend, ChunkPolicy, HashingEmbedder, InMemoryVectorBackend,
    PdftotextExtractor, RetrievalIndex, RetrievalTool, TextExtractor, VectorBackend,
};
use crate::store::{
    ConversationStore, InMemoryConversationStore, JsonlConversationStore, ThreadId,
};
use crate::tools::builtin::standard_tools;
use crate::tools::ToolRegistry;

pub const UPLOAD_OK: &str = "PDF processed and embedded successfully.";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateRequest {
    pub prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateResponse {
    pub reply: String,
    pub thread_id: ThreadId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadRequest {
    pub path: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_id: Option<String>,
}

/// `{message}` on success, `{error}` otherwise.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum UploadResponse {
    Ok { message: String },
    Error { error: String },
}

impl UploadResponse {
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryRequest {
    pub query: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResponse {
    pub result: String,
    pub thread_id: ThreadId,
}

pub struct AgentService {
    agent: AgentLoop,
    rag_agent: AgentLoop,
    index: Arc<RetrievalIndex>,
    extractor: Arc<dyn TextExtractor>,
    default_user_id: String,
}

impl AgentService {
    /// Build everything `config` describes: the model provider, the
    /// conversation store (JSONL when `store.thread_dir` is set) and the
    /// vector backend (Chroma when `retrieval.chroma_url` is set).
    pub fn from_config(config: &AgentryConfig) -> Result<Self> {
        let provider = create_provider(&config.language_model()?, config)?;

        let store: Arc<dyn ConversationStore> = match &config.store.thread_dir {
            Some(dir) => Arc::new(JsonlConversationStore::new(dir.clone())),
            None => Arc::new(InMemoryConversationStore::new()),
        };

        let backend: Arc<dyn VectorBackend> = match &config.retrieval.chroma_url {
            Some(url) => Arc::new(ChromaBackend::new(
                url.clone(),
                config.retrieval.collection.clone(),
            )),
            None => Arc::new(InMemoryVectorBackend::new()),
        };
        let index = RetrievalIndex::new(
            Arc::new(HashingEmbedder::new(config.retrieval.embedding_dimensions)),
            backend,
        )
        .with_chunk_policy(ChunkPolicy::new(config.retrieval.chunk_size));

        let extractor = AutoExtractor::new(PdftotextExtractor::new(Duration::from_secs(
            config.retrieval.extract_timeout_secs,
        )));

        Self::from_parts(
            provider,
            store,
            Arc::new(index),
            Arc::new(extractor),
            config,
        )
    }

    /// Assemble a service from prebuilt collaborators; `config` supplies
    /// limits, tool settings and the default user.
    pub fn from_parts(
        provider: Arc<dyn ModelProvider>,
        store: Arc<dyn ConversationStore>,
        index: Arc<RetrievalIndex>,
        extractor: Arc<dyn TextExtractor>,
        config: &AgentryConfig,
    ) -> Result<Self> {
        let default_user_id = config.retrieval.default_user_id.clone();
        let rag_tool = Arc::new(
            RetrievalTool::new(index.clone(), default_user_id.clone())
                .with_top_k(config.retrieval.top_k),
        );

        let mut registry = ToolRegistry::new();
        for tool in standard_tools(&config.tools) {
            registry.register(tool)?;
        }
        registry.register(rag_tool.clone())?;
        let rag_registry = ToolRegistry::new().with_tool(rag_tool)?;

        let limits = LoopLimits::from(&config.agent);
        let build = |registry: ToolRegistry| {
            let agent = AgentLoop::new(provider.clone(), Arc::new(registry), store.clone())
                .with_limits(limits.clone())
                .with_settings(config.agent.generation_settings());
            match &config.agent.system_prompt {
                Some(prompt) => agent.with_system_prompt(prompt.clone()),
                None => agent,
            }
        };

        tracing::info!(
            provider = provider.provider_name(),
            model = provider.model_id(),
            tools = registry.len(),
            "agent service ready"
        );
        Ok(Self {
            agent: build(registry),
            rag_agent: build(rag_registry),
            index,
            extractor,
            default_user_id,
        })
    }

    pub fn agent(&self) -> &AgentLoop {
        &self.agent
    }

    pub fn index(&self) -> &Arc<RetrievalIndex> {
        &self.index
    }

    /// Run the general agent on `prompt`. A missing thread id starts a new thread.
    pub async fn generate(
        &self,
        request: GenerateRequest,
    ) -> std::result::Result<GenerateResponse, AgentFailure> {
        self.generate_with_cancel(request, CancellationToken::new())
            .await
    }

    pub async fn generate_with_cancel(
        &self,
        request: GenerateRequest,
        cancel: CancellationToken,
    ) -> std::result::Result<GenerateResponse, AgentFailure> {
        let thread_id = resolve_thread(request.thread_id);
        let reply = self
            .agent
            .run_with_cancel(RunRequest::new(thread_id, request.prompt), cancel)
            .await?;
        Ok(GenerateResponse {
            reply: reply.text,
            thread_id: reply.thread_id,
        })
    }

    /// Extract, chunk and index the file at `request.path` for the requesting user.
    pub async fn upload(&self, request: UploadRequest) -> UploadResponse {
        let user_id = request
            .user_id
            .unwrap_or_else(|| self.default_user_id.clone());
        let document_id = request
            .document_id
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        let outcome = async {
            let text = self.extractor.extract(&request.path).await?;
            self.index.ingest(&document_id, &text, Some(&user_id)).await
        }
        .await;

        match outcome {
            Ok(report) => {
                tracing::info!(
                    document_id = %report.document_id,
                    user_id = %user_id,
                    chunks = report.chunk_count(),
                    "upload indexed"
                );
                UploadResponse::Ok {
                    message: UPLOAD_OK.to_string(),
                }
            }
            Err(err) => {
                tracing::error!(
                    path = %request.path.display(),
                    document_id = %document_id,
                    error = %err,
                    "upload failed"
                );
                UploadResponse::Error {
                    error: err.to_string(),
                }
            }
        }
    }

    /// Answer `request.query` from the user's uploaded documents.
    pub async fn query(
        &self,
        request: QueryRequest,
    ) -> std::result::Result<QueryResponse, AgentFailure> {
        let thread_id = resolve_thread(request.thread_id);
        let user_id = request
            .user_id
            .unwrap_or_else(|| self.default_user_id.clone());
        let reply = self
            .rag_agent
            .run(RunRequest::new(thread_id, request.query).with_user(user_id))
            .await?;
        Ok(QueryResponse {
            result: reply.text,
            thread_id: reply.thread_id,
        })
    }
}

fn resolve_thread(thread_id: Option<String>) -> ThreadId {
    thread_id
        .filter(|id| !id.trim().is_empty())
        .map(ThreadId::new)
        .unwrap_or_else(ThreadId::generate)
}
