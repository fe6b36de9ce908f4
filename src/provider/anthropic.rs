//! Anthropic Messages API provider.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use crate::error::{AgentryError, Result};
use crate::types::{ContentPart, FinishReason, Role, ToolCall, Usage};

use super::http::{anthropic_headers, shared_client, status_to_error};
use super::{ModelProvider, ModelRequest, ModelResponse};

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1";
const API_VERSION: &str = "2023-06-01";
const DEFAULT_MAX_TOKENS: u32 = 4096;

pub struct AnthropicProvider {
    model_id: String,
    api_key: String,
    base_url: String,
}

impl AnthropicProvider {
    pub fn new(model_id: String, api_key: String, base_url: Option<String>) -> Self {
        Self {
            model_id,
            api_key,
            base_url: base_url
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
        }
    }

    fn build_request_body(&self, request: &ModelRequest) -> serde_json::Value {
        let mut system_parts = Vec::new();
        let mut messages: Vec<serde_json::Value> = Vec::new();
        // Tool results answering one assistant turn go into a single user message.
        let mut open_results: Option<Vec<serde_json::Value>> = None;

        for msg in &request.messages {
            if msg.role != Role::Tool {
                if let Some(blocks) = open_results.take() {
                    messages.push(serde_json::json!({ "role": "user", "content": blocks }));
                }
            }
            match msg.role {
                Role::System => system_parts.push(msg.text()),
                Role::User => {
                    messages.push(serde_json::json!({
                        "role": "user",
                        "content": msg.text(),
                    }));
                }
                Role::Assistant => {
                    let content: Vec<serde_json::Value> = msg
                        .content
                        .iter()
                        .filter_map(|part| match part {
                            ContentPart::Text { text } if !text.is_empty() => {
                                Some(serde_json::json!({ "type": "text", "text": text }))
                            }
                            ContentPart::ToolCall(tc) => Some(serde_json::json!({
                                "type": "tool_use",
                                "id": tc.id,
                                "name": tc.name,
                                "input": tc.arguments,
                            })),
                            _ => None,
                        })
                        .collect();
                    if !content.is_empty() {
                        messages.push(serde_json::json!({
                            "role": "assistant",
                            "content": content,
                        }));
                    }
                }
                Role::Tool => {
                    let blocks = open_results.get_or_insert_with(Vec::new);
                    for tr in msg.tool_results() {
                        let content = match &tr.result {
                            serde_json::Value::String(s) => s.clone(),
                            other => other.to_string(),
                        };
                        blocks.push(serde_json::json!({
                            "type": "tool_result",
                            "tool_use_id": tr.tool_call_id,
                            "content": content,
                            "is_error": tr.is_error,
                        }));
                    }
                }
            }
        }
        if let Some(blocks) = open_results.take() {
            messages.push(serde_json::json!({ "role": "user", "content": blocks }));
        }

        let mut body = serde_json::json!({
            "model": self.model_id,
            "messages": messages,
            "max_tokens": request.settings.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
        });

        if let Some(obj) = body.as_object_mut() {
            if !system_parts.is_empty() {
                obj.insert("system".into(), system_parts.join("\n").into());
            }
            if let Some(temp) = request.settings.temperature {
                obj.insert("temperature".into(), temp.into());
            }
            if let Some(top_p) = request.settings.top_p {
                obj.insert("top_p".into(), top_p.into());
            }
            if let Some(ref stops) = request.settings.stop_sequences {
                obj.insert("stop_sequences".into(), serde_json::json!(stops));
            }
            if !request.tools.is_empty() {
                let tools: Vec<serde_json::Value> = request
                    .tools
                    .iter()
                    .map(|t| {
                        serde_json::json!({
                            "name": t.name,
                            "description": t.description,
                            "input_schema": t.parameters,
                        })
                    })
                    .collect();
                obj.insert("tools".into(), tools.into());
            }
        }

        body
    }
}

#[async_trait]
impl ModelProvider for AnthropicProvider {
    fn provider_name(&self) -> &str {
        "anthropic"
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }

    async fn generate_text(&self, request: &ModelRequest) -> Result<ModelResponse> {
        let body = self.build_request_body(request);
        let url = format!("{}/messages", self.base_url);

        debug!(model = %self.model_id, messages = request.messages.len(), "Anthropic generate_text");

        let resp = shared_client()
            .post(&url)
            .headers(anthropic_headers(&self.api_key, API_VERSION))
            .json(&body)
            .send()
            .await?;

        let status = resp.status().as_u16();
        if status != 200 {
            let body_text = resp.text().await.unwrap_or_default();
            return Err(status_to_error(status, &body_text));
        }

        let data: AnthropicResponse = resp.json().await?;

        let mut text = String::new();
        let mut tool_calls = Vec::new();

        for block in data.content {
            match block.r#type.as_str() {
                "text" => {
                    if let Some(t) = block.text {
                        text.push_str(&t);
                    }
                }
                "tool_use" => match (block.id, block.name) {
                    (Some(id), Some(name)) => tool_calls.push(ToolCall {
                        id,
                        name,
                        arguments: block.input.unwrap_or_else(|| serde_json::json!({})),
                    }),
                    _ => {
                        return Err(AgentryError::MalformedResponse(
                            "tool_use block without id or name".into(),
                        ))
                    }
                },
                _ => {}
            }
        }

        let finish_reason = match data.stop_reason.as_deref() {
            Some("end_turn") | Some("stop_sequence") => Some(FinishReason::Stop),
            Some("max_tokens") => Some(FinishReason::Length),
            Some("tool_use") => Some(FinishReason::ToolCalls),
            Some("refusal") => Some(FinishReason::ContentFilter),
            _ => None,
        };

        Ok(ModelResponse {
            text,
            tool_calls,
            finish_reason,
            usage: Usage {
                input_tokens: data.usage.input_tokens,
                output_tokens: data.usage.output_tokens,
                total_tokens: data.usage.input_tokens + data.usage.output_tokens,
            },
        })
    }
}

#[derive(Deserialize)]
struct AnthropicResponse {
    #[serde(default)]
    content: Vec<AnthropicContentBlock>,
    stop_reason: Option<String>,
    #[serde(default)]
    usage: AnthropicUsage,
}

#[derive(Deserialize)]
struct AnthropicContentBlock {
    r#type: String,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    input: Option<serde_json::Value>,
}

#[derive(Deserialize, Default)]
struct AnthropicUsage {
    #[serde(default)]
    input_tokens: u32,
    #[serde(default)]
    output_tokens: u32,
}
