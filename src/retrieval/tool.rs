//! The `RAG` tool: searches the caller's uploaded documents.

use std::sync::Arc;

use async_trait::async_trait;

use super::{MetadataFilter, Retrieval, RetrievalIndex};
use crate::error::AgentryError;
use crate::tools::{Tool, ToolArguments, ToolExecutionContext, ToolParameters};

pub const NO_RESULTS: &str = "No relevant information found in your uploaded documents.";
const SEPARATOR: &str = "\n---\n";

pub struct RetrievalTool {
    index: Arc<RetrievalIndex>,
    top_k: usize,
    default_user_id: String,
    parameters: ToolParameters,
}

impl RetrievalTool {
    pub fn new(index: Arc<RetrievalIndex>, default_user_id: impl Into<String>) -> Self {
        Self {
            index,
            top_k: 3,
            default_user_id: default_user_id.into(),
            parameters: ToolParameters::object()
                .string("query", "The question to search in the uploaded documents", true)
                .string("userId", "The user's unique identifier", false)
                .build(),
        }
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k.max(1);
        self
    }
}

#[async_trait]
impl Tool for RetrievalTool {
    fn name(&self) -> &str {
        "RAG"
    }

    fn description(&self) -> &str {
        "Retrieves relevant information from the user's uploaded documents using vector search."
    }

    fn parameters(&self) -> &ToolParameters {
        &self.parameters
    }

    async fn execute(
        &self,
        args: &ToolArguments,
        ctx: &ToolExecutionContext,
    ) -> Result<serde_json::Value, AgentryError> {
        let query = args.get_str("query")?;
        // The caller's identity cannot be overridden by the model.
        let user_id = ctx
            .user_id
            .clone()
            .or_else(|| args.get_str_opt("userId").map(str::to_string))
            .unwrap_or_else(|| self.default_user_id.clone());

        tracing::debug!(user_id = %user_id, query, "RAG lookup");
        let filter = MetadataFilter::user(user_id);
        let answer = match self.index.query(query, self.top_k, Some(&filter)).await {
            Retrieval::Empty => NO_RESULTS.to_string(),
            Retrieval::Matches(chunks) => chunks
                .iter()
                .map(|c| c.text.as_str())
                .collect::<Vec<_>>()
                .join(SEPARATOR),
        };
        Ok(serde_json::Value::String(answer))
    }
}
