//! Typed access to tool call arguments.

use crate::error::AgentryError;

/// Wrapper around tool call arguments providing typed extraction.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolArguments {
    value: serde_json::Value,
}

impl ToolArguments {
    pub fn new(value: serde_json::Value) -> Self {
        Self { value }
    }

    /// Get the raw JSON value.
    pub fn raw(&self) -> &serde_json::Value {
        &self.value
    }

    /// Get a string argument by key.
    pub fn get_str(&self, key: &str) -> Result<&str, AgentryError> {
        self.value
            .get(key)
            .and_then(|v| v.as_str())
            .ok_or_else(|| AgentryError::InvalidArgument(format!("Missing string argument: {key}")))
    }

    /// Get an optional string argument.
    pub fn get_str_opt(&self, key: &str) -> Option<&str> {
        self.value.get(key).and_then(|v| v.as_str())
    }

    /// Get an integer argument. Integral floats such as `5.0` are accepted.
    pub fn get_i64(&self, key: &str) -> Result<i64, AgentryError> {
        self.value
            .get(key)
            .and_then(as_integer)
            .ok_or_else(|| AgentryError::InvalidArgument(format!("Missing integer argument: {key}")))
    }

    /// Get a float argument.
    pub fn get_f64(&self, key: &str) -> Result<f64, AgentryError> {
        self.value
            .get(key)
            .and_then(|v| v.as_f64())
            .ok_or_else(|| AgentryError::InvalidArgument(format!("Missing float argument: {key}")))
    }

    /// Deserialize the entire arguments into a typed struct.
    ///
    /// Providers occasionally deliver arguments as a JSON-encoded string; those
    /// are decoded first.
    pub fn deserialize<T: serde::de::DeserializeOwned>(&self) -> Result<T, AgentryError> {
        let value = match &self.value {
            serde_json::Value::String(raw) => {
                let trimmed = raw.trim();
                if trimmed.is_empty() {
                    serde_json::json!({})
                } else {
                    serde_json::from_str::<serde_json::Value>(trimmed).map_err(|e| {
                        AgentryError::InvalidArgument(format!("Failed to deserialize arguments: {e}"))
                    })?
                }
            }
            other => other.clone(),
        };
        serde_json::from_value(value).map_err(|e| {
            AgentryError::InvalidArgument(format!("Failed to deserialize arguments: {e}"))
        })
    }
}

/// Read a JSON number as an integer, accepting integral floats.
pub(crate) fn as_integer(value: &serde_json::Value) -> Option<i64> {
    if let Some(i) = value.as_i64() {
        return Some(i);
    }
    let f = value.as_f64()?;
    if f.fract() == 0.0 && f >= i64::MIN as f64 && f <= i64::MAX as f64 {
        Some(f as i64)
    } else {
        None
    }
}
