//! Core run types for the agent loop.

use std::fmt;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::error::{AgentryError, ErrorKind};
use crate::store::ThreadId;
use crate::tools::ToolInvocation;
use crate::types::Usage;

/// Agent loop state.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Display, EnumString,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum LoopState {
    AwaitingModel,
    AwaitingTool,
    Done,
    Failed,
}

impl LoopState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }
}

/// One invocation of the agent on a thread.
#[derive(Debug, Clone, PartialEq)]
pub struct RunRequest {
    pub thread_id: ThreadId,
    pub prompt: String,
    /// Caller identity handed to tools (scopes document retrieval).
    pub user_id: Option<String>,
}

impl RunRequest {
    pub fn new(thread_id: impl Into<ThreadId>, prompt: impl Into<String>) -> Self {
        Self {
            thread_id: thread_id.into(),
            prompt: prompt.into(),
            user_id: None,
        }
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }
}

/// Successful end of a run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentReply {
    pub thread_id: ThreadId,
    pub text: String,
    /// Model round trips used.
    pub turns: usize,
    pub tool_invocations: Vec<ToolInvocation>,
    pub usage: Usage,
}

/// Unrecoverable end of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentFailure {
    pub kind: ErrorKind,
    pub message: String,
    pub thread_id: ThreadId,
    pub turns: usize,
}

impl AgentFailure {
    pub fn from_error(err: &AgentryError, thread_id: ThreadId, turns: usize) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
            thread_id,
            turns,
        }
    }
}

impl fmt::Display for AgentFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} on thread {}: {}", self.kind, self.thread_id, self.message)
    }
}

impl std::error::Error for AgentFailure {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn states_render_in_screaming_case() {
        assert_eq!(LoopState::AwaitingModel.to_string(), "AWAITING_MODEL");
        assert_eq!(
            serde_json::to_value(LoopState::AwaitingTool).unwrap(),
            "AWAITING_TOOL"
        );
        assert!(LoopState::Failed.is_terminal());
        assert!(!LoopState::AwaitingTool.is_terminal());
    }

    #[test]
    fn failure_carries_kind_and_message() {
        let failure = AgentFailure::from_error(
            &AgentryError::TurnBudgetExceeded { max_turns: 3 },
            ThreadId::new("t"),
            3,
        );

        assert_eq!(failure.kind, ErrorKind::TurnBudgetExceeded);
        assert!(failure.message.contains('3'));
        assert!(failure.to_string().contains("thread t"));
    }
}
