//! Shared test helpers and scripted provider.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use agentry::error::AgentryError;
use agentry::provider::{ModelProvider, ModelRequest, ModelResponse};
use agentry::tools::builtin::{factorial_tool, sum_tool};
use agentry::tools::{AgentTool, Tool, ToolParameters, ToolRegistry};
use agentry::types::{ToolCall, Usage};

/// A provider that replays queued responses in order and records every request.
pub struct ScriptedProvider {
    script: Mutex<VecDeque<Result<ModelResponse, AgentryError>>>,
    requests: Mutex<Vec<ModelRequest>>,
    delay: Option<Duration>,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
            delay: None,
        }
    }

    /// Sleep this long before answering each request.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn text(self, text: &str) -> Self {
        let mut response = ModelResponse::text(text);
        response.usage = usage(10, 20);
        self.push(Ok(response))
    }

    pub fn tool_call(self, name: &str, args: serde_json::Value) -> Self {
        self.tool_calls(vec![ToolCall::new(name, args)])
    }

    pub fn tool_calls(self, calls: Vec<ToolCall>) -> Self {
        let mut response = ModelResponse::tool_calls(calls);
        response.usage = usage(10, 5);
        self.push(Ok(response))
    }

    pub fn response(self, response: ModelResponse) -> Self {
        self.push(Ok(response))
    }

    pub fn error(self, err: AgentryError) -> Self {
        self.push(Err(err))
    }

    fn push(self, item: Result<ModelResponse, AgentryError>) -> Self {
        self.script.lock().unwrap().push_back(item);
        self
    }

    pub fn requests(&self) -> Vec<ModelRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl ModelProvider for ScriptedProvider {
    fn provider_name(&self) -> &str {
        "scripted"
    }

    fn model_id(&self) -> &str {
        "scripted-1"
    }

    async fn generate_text(&self, request: &ModelRequest) -> Result<ModelResponse, AgentryError> {
        self.requests.lock().unwrap().push(request.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(AgentryError::MalformedResponse("script exhausted".into())))
    }
}

pub fn usage(input: u32, output: u32) -> Usage {
    Usage {
        input_tokens: input,
        output_tokens: output,
        total_tokens: input + output,
    }
}

/// Registry with `factorial` and `sum`.
pub fn math_registry() -> ToolRegistry {
    ToolRegistry::new()
        .with_tool(factorial_tool())
        .unwrap()
        .with_tool(sum_tool())
        .unwrap()
}

/// A tool that counts its invocations and echoes its `value` argument.
pub fn counting_tool(name: &str, calls: Arc<AtomicUsize>) -> Arc<dyn Tool> {
    Arc::new(AgentTool::new(
        name.to_string(),
        "echoes value",
        ToolParameters::object()
            .string("value", "value to echo", true)
            .build(),
        move |args, _ctx| {
            let calls = calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(serde_json::json!(args.get_str("value")?))
            }
        },
    ))
}

/// A tool that sleeps before answering.
pub fn slow_tool(name: &str, delay: Duration) -> Arc<dyn Tool> {
    Arc::new(AgentTool::new(
        name.to_string(),
        "sleeps",
        ToolParameters::empty(),
        move |_args, _ctx| async move {
            tokio::time::sleep(delay).await;
            Ok(serde_json::json!("woke up"))
        },
    ))
}
