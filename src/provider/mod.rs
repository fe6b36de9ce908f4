//! Model provider trait and implementations.

pub mod http;

#[cfg(feature = "anthropic")]
pub mod anthropic;
#[cfg(feature = "google")]
pub mod google;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::AgentryConfig;
use crate::error::{AgentryError, Result};
use crate::models::LanguageModel;
use crate::types::{FinishReason, GenerationSettings, Message, ToolCall, Usage};

/// A request sent to a model provider.
#[derive(Debug, Clone, Default)]
pub struct ModelRequest {
    pub messages: Vec<Message>,
    pub tools: Vec<ToolDefinition>,
    pub settings: GenerationSettings,
}

/// Tool definition sent to the provider API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// Response from a provider.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelResponse {
    pub text: String,
    pub tool_calls: Vec<ToolCall>,
    pub finish_reason: Option<FinishReason>,
    pub usage: Usage,
}

impl ModelResponse {
    /// A final text answer.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            finish_reason: Some(FinishReason::Stop),
            ..Self::default()
        }
    }

    /// A response requesting tool calls.
    pub fn tool_calls(calls: Vec<ToolCall>) -> Self {
        Self {
            tool_calls: calls,
            finish_reason: Some(FinishReason::ToolCalls),
            ..Self::default()
        }
    }
}

/// Core trait implemented by all model providers.
#[async_trait]
pub trait ModelProvider: Send + Sync {
    /// Provider name (e.g., "google").
    fn provider_name(&self) -> &str;
    /// The model ID this provider instance serves.
    fn model_id(&self) -> &str;

    /// One non-streaming completion.
    async fn generate_text(&self, request: &ModelRequest) -> Result<ModelResponse>;
}

/// Create a provider for the given model, using the provided config.
#[allow(unused_variables)]
pub fn create_provider(
    model: &LanguageModel,
    config: &AgentryConfig,
) -> Result<Arc<dyn ModelProvider>> {
    use crate::models::ProviderKind;

    match model.provider {
        #[cfg(feature = "google")]
        ProviderKind::Google => {
            let api_key = config.get_api_key("google").ok_or_else(|| {
                AgentryError::Authentication("Missing GEMINI_API_KEY or GOOGLE_API_KEY".into())
            })?;
            Ok(Arc::new(google::GoogleProvider::new(
                model.model_id.clone(),
                api_key,
                config.get_base_url("google"),
            )))
        }
        #[cfg(feature = "anthropic")]
        ProviderKind::Anthropic => {
            let api_key = config
                .get_api_key("anthropic")
                .ok_or_else(|| AgentryError::Authentication("Missing ANTHROPIC_API_KEY".into()))?;
            Ok(Arc::new(anthropic::AnthropicProvider::new(
                model.model_id.clone(),
                api_key,
                config.get_base_url("anthropic"),
            )))
        }
        #[allow(unreachable_patterns)]
        _ => Err(AgentryError::Configuration(format!(
            "Provider for model '{model}' not enabled via feature flags"
        ))),
    }
}

/// Wrap a non-object tool result so providers that need a JSON object accept it.
pub(crate) fn result_as_object(result: &serde_json::Value) -> serde_json::Value {
    match result {
        serde_json::Value::Object(_) => result.clone(),
        other => serde_json::json!({ "result": other }),
    }
}
