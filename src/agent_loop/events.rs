//! Run events emitted by the agent loop.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::types::LoopState;
use crate::error::ErrorKind;
use crate::store::ThreadId;
use crate::types::Usage;

/// Callback receiving run events.
pub type EventSink = Arc<dyn Fn(AgentEvent) + Send + Sync>;

/// Event payloads.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEventPayload {
    RunStarted {
        history_len: usize,
    },
    StateChanged {
        from: LoopState,
        to: LoopState,
    },
    ModelResponded {
        turn: usize,
        tool_calls: usize,
        usage: Usage,
    },
    ToolStarted {
        tool_call_id: String,
        tool_name: String,
        arguments: serde_json::Value,
    },
    ToolFinished {
        tool_call_id: String,
        tool_name: String,
        result: serde_json::Value,
        is_error: bool,
    },
    Completed {
        turns: usize,
    },
    Failed {
        kind: ErrorKind,
        message: String,
    },
}

/// Envelope for run events.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentEvent {
    pub thread_id: ThreadId,
    pub seq: u64,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub payload: AgentEventPayload,
}

pub(crate) struct EventEmitter {
    thread_id: ThreadId,
    seq: AtomicU64,
    sink: Option<EventSink>,
}

impl EventEmitter {
    pub(crate) fn new(thread_id: ThreadId, sink: Option<EventSink>) -> Self {
        Self {
            thread_id,
            seq: AtomicU64::new(1),
            sink,
        }
    }

    pub(crate) fn emit(&self, payload: AgentEventPayload) {
        let Some(sink) = &self.sink else {
            return;
        };
        let seq = self.seq.fetch_add(1, Ordering::SeqCst);
        (sink)(AgentEvent {
            thread_id: self.thread_id.clone(),
            seq,
            timestamp: Utc::now(),
            payload,
        });
    }
}
