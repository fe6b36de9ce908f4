//! Named tool registry with schema validation and dispatch.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::arguments::ToolArguments;
use super::tool::{Tool, ToolExecutionContext};
use super::validation::validate_arguments;
use crate::error::{AgentryError, Result};
use crate::provider::ToolDefinition;

/// A tool call bound to the thread position of the message that requested it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolInvocation {
    pub tool_name: String,
    pub arguments: serde_json::Value,
    /// Index of the requesting assistant message within the thread history.
    pub message_index: usize,
}

/// Holds the tools an agent may call. Names are unique; order is registration order.
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
    order: Vec<String>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool. Fails with [`AgentryError::DuplicateTool`] if the name is taken.
    pub fn register(&mut self, tool: Arc<dyn Tool>) -> Result<()> {
        let name = tool.name().to_string();
        if self.tools.contains_key(&name) {
            return Err(AgentryError::DuplicateTool(name));
        }
        tracing::debug!(tool = %name, "registered tool");
        self.order.push(name.clone());
        self.tools.insert(name, tool);
        Ok(())
    }

    /// Builder-style registration.
    pub fn with_tool(mut self, tool: Arc<dyn Tool>) -> Result<Self> {
        self.register(tool)?;
        Ok(self)
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Tool names in registration order.
    pub fn names(&self) -> Vec<&str> {
        self.order.iter().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Tool definitions advertised to the model.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.order
            .iter()
            .filter_map(|name| self.tools.get(name))
            .map(|t| ToolDefinition {
                name: t.name().to_string(),
                description: t.description().to_string(),
                parameters: t.parameters().schema.clone(),
            })
            .collect()
    }

    /// Validate `args` against the tool's schema and run its handler.
    ///
    /// The handler is never invoked when validation fails. Handler errors are
    /// wrapped in [`AgentryError::ToolExecution`]; successful values are returned as-is.
    pub async fn dispatch(
        &self,
        name: &str,
        args: serde_json::Value,
        ctx: &ToolExecutionContext,
    ) -> Result<serde_json::Value> {
        let tool = self
            .tools
            .get(name)
            .ok_or_else(|| AgentryError::UnknownTool(name.to_string()))?;

        let args = normalize_arguments(args);
        validate_arguments(&args, &tool.parameters().schema).map_err(|message| {
            AgentryError::SchemaValidation {
                tool_name: name.to_string(),
                message,
            }
        })?;

        tool.execute(&ToolArguments::new(args), ctx)
            .await
            .map_err(|err| AgentryError::tool_execution(name, err))
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.order)
            .finish()
    }
}

/// Decode string-encoded JSON objects; models sometimes send arguments that way.
fn normalize_arguments(args: serde_json::Value) -> serde_json::Value {
    match &args {
        serde_json::Value::String(raw) => {
            let trimmed = raw.trim();
            if trimmed.is_empty() {
                return serde_json::json!({});
            }
            match serde_json::from_str::<serde_json::Value>(trimmed) {
                Ok(decoded @ serde_json::Value::Object(_)) => decoded,
                _ => args,
            }
        }
        serde_json::Value::Null => serde_json::json!({}),
        _ => args,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::tool::AgentTool;
    use crate::tools::types::ToolParameters;
    use serde_json::json;

    fn echo_tool(name: &str) -> Arc<dyn Tool> {
        Arc::new(AgentTool::new(
            name,
            "echo",
            ToolParameters::object().string("text", "text", true).build(),
            |args, _ctx| async move { Ok(args.raw().clone()) },
        ))
    }

    #[test]
    fn definitions_follow_registration_order() {
        let registry = ToolRegistry::new()
            .with_tool(echo_tool("b"))
            .unwrap()
            .with_tool(echo_tool("a"))
            .unwrap();

        let names: Vec<String> = registry.definitions().into_iter().map(|d| d.name).collect();
        assert_eq!(names, vec!["b", "a"]);
    }

    #[tokio::test]
    async fn string_encoded_arguments_are_decoded() {
        let registry = ToolRegistry::new().with_tool(echo_tool("echo")).unwrap();

        let out = registry
            .dispatch(
                "echo",
                json!("{\"text\": \"hi\"}"),
                &ToolExecutionContext::default(),
            )
            .await
            .unwrap();

        assert_eq!(out, json!({ "text": "hi" }));
    }
}
