//! Google Gemini API provider.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use crate::error::{AgentryError, Result};
use crate::types::{ContentPart, FinishReason, Role, ToolCall, Usage};

use super::http::{google_headers, shared_client, status_to_error};
use super::{result_as_object, ModelProvider, ModelRequest, ModelResponse};

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

pub struct GoogleProvider {
    model_id: String,
    api_key: String,
    base_url: String,
}

impl GoogleProvider {
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
        let mut contents: Vec<serde_json::Value> = Vec::new();
        // Consecutive tool results share one content entry.
        let mut open_responses: Option<Vec<serde_json::Value>> = None;

        for msg in &request.messages {
            if msg.role != Role::Tool {
                if let Some(parts) = open_responses.take() {
                    contents.push(serde_json::json!({ "role": "user", "parts": parts }));
                }
            }
            match msg.role {
                Role::System => system_parts.push(serde_json::json!({ "text": msg.text() })),
                Role::User => {
                    contents.push(serde_json::json!({
                        "role": "user",
                        "parts": [{ "text": msg.text() }],
                    }));
                }
                Role::Assistant => {
                    let parts: Vec<serde_json::Value> = msg
                        .content
                        .iter()
                        .filter_map(|part| match part {
                            ContentPart::Text { text } if !text.is_empty() => {
                                Some(serde_json::json!({ "text": text }))
                            }
                            ContentPart::ToolCall(tc) => Some(serde_json::json!({
                                "functionCall": { "name": tc.name, "args": tc.arguments }
                            })),
                            _ => None,
                        })
                        .collect();
                    if !parts.is_empty() {
                        contents.push(serde_json::json!({ "role": "model", "parts": parts }));
                    }
                }
                Role::Tool => {
                    let parts = open_responses.get_or_insert_with(Vec::new);
                    for tr in msg.tool_results() {
                        parts.push(serde_json::json!({
                            "functionResponse": {
                                "name": tr.tool_name,
                                "response": result_as_object(&tr.result),
                            }
                        }));
                    }
                }
            }
        }
        if let Some(parts) = open_responses.take() {
            contents.push(serde_json::json!({ "role": "user", "parts": parts }));
        }

        let mut body = serde_json::Map::new();
        body.insert("contents".into(), contents.into());

        if !system_parts.is_empty() {
            body.insert(
                "systemInstruction".into(),
                serde_json::json!({ "parts": system_parts }),
            );
        }

        let mut gen_config = serde_json::Map::new();
        if let Some(max) = request.settings.max_tokens {
            gen_config.insert("maxOutputTokens".into(), max.into());
        }
        if let Some(temp) = request.settings.temperature {
            gen_config.insert("temperature".into(), temp.into());
        }
        if let Some(top_p) = request.settings.top_p {
            gen_config.insert("topP".into(), top_p.into());
        }
        if let Some(ref stops) = request.settings.stop_sequences {
            gen_config.insert("stopSequences".into(), serde_json::json!(stops));
        }
        if !gen_config.is_empty() {
            body.insert("generationConfig".into(), gen_config.into());
        }

        if !request.tools.is_empty() {
            let fn_decls: Vec<serde_json::Value> = request
                .tools
                .iter()
                .map(|t| {
                    serde_json::json!({
                        "name": t.name,
                        "description": t.description,
                        "parameters": t.parameters,
                    })
                })
                .collect();
            body.insert(
                "tools".into(),
                serde_json::json!([{ "functionDeclarations": fn_decls }]),
            );
        }

        serde_json::Value::Object(body)
    }
}

#[async_trait]
impl ModelProvider for GoogleProvider {
    fn provider_name(&self) -> &str {
        "google"
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }

    async fn generate_text(&self, request: &ModelRequest) -> Result<ModelResponse> {
        let body = self.build_request_body(request);
        let url = format!("{}/models/{}:generateContent", self.base_url, self.model_id);

        debug!(model = %self.model_id, messages = request.messages.len(), "Google generate_text");

        let resp = shared_client()
            .post(&url)
            .headers(google_headers(&self.api_key))
            .json(&body)
            .send()
            .await?;

        let status = resp.status().as_u16();
        if status != 200 {
            let body_text = resp.text().await.unwrap_or_default();
            return Err(status_to_error(status, &body_text));
        }

        let data: GeminiResponse = resp.json().await?;

        let candidate = data
            .candidates
            .into_iter()
            .next()
            .ok_or_else(|| AgentryError::MalformedResponse("no candidates in Gemini response".into()))?;

        let mut text = String::new();
        let mut tool_calls = Vec::new();

        for part in candidate.content.map(|c| c.parts).unwrap_or_default() {
            if let Some(t) = part.text {
                text.push_str(&t);
            }
            if let Some(fc) = part.function_call {
                tool_calls.push(ToolCall::new(
                    fc.name,
                    fc.args.unwrap_or_else(|| serde_json::json!({})),
                ));
            }
        }

        let finish_reason = if !tool_calls.is_empty() {
            Some(FinishReason::ToolCalls)
        } else {
            match candidate.finish_reason.as_deref() {
                Some("STOP") => Some(FinishReason::Stop),
                Some("MAX_TOKENS") => Some(FinishReason::Length),
                Some("SAFETY") | Some("RECITATION") | Some("BLOCKLIST") => {
                    Some(FinishReason::ContentFilter)
                }
                Some("MALFORMED_FUNCTION_CALL") => Some(FinishReason::Error),
                _ => None,
            }
        };

        let usage = data
            .usage_metadata
            .map(|u| Usage {
                input_tokens: u.prompt_token_count,
                output_tokens: u.candidates_token_count,
                total_tokens: u.total_token_count,
            })
            .unwrap_or_default();

        Ok(ModelResponse {
            text,
            tool_calls,
            finish_reason,
            usage,
        })
    }
}

// Internal Gemini response types

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    usage_metadata: Option<GeminiUsage>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiCandidate {
    content: Option<GeminiContent>,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct GeminiContent {
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiPart {
    text: Option<String>,
    function_call: Option<GeminiFunctionCall>,
}

#[derive(Deserialize)]
struct GeminiFunctionCall {
    name: String,
    args: Option<serde_json::Value>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiUsage {
    #[serde(default)]
    prompt_token_count: u32,
    #[serde(default)]
    candidates_token_count: u32,
    #[serde(default)]
    total_token_count: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::ToolDefinition;
    use crate::types::Message;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn provider() -> GoogleProvider {
        GoogleProvider::new("gemini-2.5-flash".into(), "test-key".into(), None)
    }

    #[test]
    fn system_messages_become_system_instruction() {
        let request = ModelRequest {
            messages: vec![Message::system("be brief"), Message::user("hi")],
            ..Default::default()
        };

        let body = provider().build_request_body(&request);

        assert_eq!(body["systemInstruction"]["parts"][0]["text"], "be brief");
        assert_eq!(body["contents"].as_array().unwrap().len(), 1);
        assert_eq!(body["contents"][0]["role"], "user");
    }

    #[test]
    fn tool_round_trip_is_encoded_as_function_call_and_response() {
        let call = ToolCall::new("factorial", json!({ "num": 5 }));
        let request = ModelRequest {
            messages: vec![
                Message::user("what is 5!"),
                Message::assistant_tool_calls("", vec![call.clone()]),
                Message::tool_result(&call, json!(120), false),
            ],
            tools: vec![ToolDefinition {
                name: "factorial".into(),
                description: "factorial".into(),
                parameters: json!({ "type": "object" }),
            }],
            ..Default::default()
        };

        let body = provider().build_request_body(&request);

        assert_eq!(
            body["contents"][1],
            json!({ "role": "model", "parts": [{ "functionCall": { "name": "factorial", "args": { "num": 5 } } }] })
        );
        assert_eq!(
            body["contents"][2]["parts"][0]["functionResponse"],
            json!({ "name": "factorial", "response": { "result": 120 } })
        );
        assert_eq!(
            body["tools"][0]["functionDeclarations"][0]["name"],
            "factorial"
        );
    }

    #[test]
    fn consecutive_tool_results_share_one_turn() {
        let a = ToolCall::new("sum", json!({ "a": 1, "b": 2 }));
        let b = ToolCall::new("sum", json!({ "a": 3, "b": 4 }));
        let request = ModelRequest {
            messages: vec![
                Message::user("add"),
                Message::assistant_tool_calls("", vec![a.clone(), b.clone()]),
                Message::tool_result(&a, json!(3), false),
                Message::tool_result(&b, json!(7), false),
            ],
            ..Default::default()
        };

        let body = provider().build_request_body(&request);

        let contents = body["contents"].as_array().unwrap();
        assert_eq!(contents.len(), 3);
        assert_eq!(contents[2]["parts"].as_array().unwrap().len(), 2);
    }
}
