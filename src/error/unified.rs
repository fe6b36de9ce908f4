//! Error classification shared by retry logic and caller-facing failures.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Broad error category for routing recovery logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Authentication,
    RateLimit,
    Network,
    Timeout,
    Server,
    Api,
    Configuration,
    Serialization,
    Tool,
    Unknown,
}

/// Failure taxonomy reported to callers of the agent loop and service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ErrorKind {
    SchemaValidation,
    UnknownTool,
    DuplicateTool,
    ToolExecution,
    TurnBudgetExceeded,
    Ingestion,
    RetrievalBackend,
    Model,
    Timeout,
    Canceled,
    Configuration,
    Store,
}
