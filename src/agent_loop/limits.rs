//! Per-run limits.

use std::time::Duration;

use crate::config::AgentSettings;

/// Bounds on a single agent run.
#[derive(Debug, Clone, PartialEq)]
pub struct LoopLimits {
    /// Maximum model round trips.
    pub max_turns: usize,
    /// Extra attempts for a tool whose failure is transient.
    pub max_tool_retries: u32,
    /// Responses naming an unknown tool that are answered with the tool list
    /// before the run fails.
    pub max_unknown_tool_reprompts: u32,
    /// Wall-clock limit for the run.
    pub timeout: Option<Duration>,
    pub tool_retry_backoff: Duration,
}

impl Default for LoopLimits {
    fn default() -> Self {
        Self::from(&AgentSettings::default())
    }
}

impl From<&AgentSettings> for LoopLimits {
    fn from(settings: &AgentSettings) -> Self {
        Self {
            max_turns: settings.max_turns,
            max_tool_retries: settings.max_tool_retries,
            max_unknown_tool_reprompts: settings.max_unknown_tool_reprompts,
            timeout: settings.timeout(),
            tool_retry_backoff: Duration::from_millis(250),
        }
    }
}

impl LoopLimits {
    pub fn with_max_turns(mut self, max_turns: usize) -> Self {
        self.max_turns = max_turns;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_tool_retries(mut self, retries: u32, backoff: Duration) -> Self {
        self.max_tool_retries = retries;
        self.tool_retry_backoff = backoff;
        self
    }

    pub fn with_unknown_tool_reprompts(mut self, reprompts: u32) -> Self {
        self.max_unknown_tool_reprompts = reprompts;
        self
    }
}
