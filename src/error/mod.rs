//! Error types for agentry.

pub mod unified;

pub use unified::{ErrorCategory, ErrorKind};

use thiserror::Error;

/// Primary error type for all agentry operations.
#[derive(Error, Debug)]
pub enum AgentryError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Authentication error: {0}")]
    Authentication(String),

    #[error("Rate limited: retry after {retry_after_ms:?}ms")]
    RateLimited { retry_after_ms: Option<u64> },

    #[error("Timeout after {0}ms")]
    Timeout(u64),

    #[error("Run canceled")]
    Canceled,

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Malformed model response: {0}")]
    MalformedResponse(String),

    #[error("Tool '{0}' is already registered")]
    DuplicateTool(String),

    #[error("Unknown tool '{0}'")]
    UnknownTool(String),

    #[error("Invalid arguments for tool '{tool_name}': {message}")]
    SchemaValidation { tool_name: String, message: String },

    #[error("Tool '{tool_name}' failed: {source}")]
    ToolExecution {
        tool_name: String,
        #[source]
        source: Box<AgentryError>,
    },

    #[error("Turn budget of {max_turns} model calls exceeded")]
    TurnBudgetExceeded { max_turns: usize },

    #[error("Ingestion of '{document_id}' failed: {message}")]
    Ingestion {
        document_id: String,
        message: String,
    },

    #[error("Retrieval backend error: {0}")]
    RetrievalBackend(String),

    #[error("Conversation store error: {0}")]
    Store(String),
}

impl AgentryError {
    /// Create an API error.
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    /// Wrap a handler failure for the named tool.
    pub fn tool_execution(tool_name: impl Into<String>, source: AgentryError) -> Self {
        Self::ToolExecution {
            tool_name: tool_name.into(),
            source: Box::new(source),
        }
    }

    pub fn ingestion(document_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Ingestion {
            document_id: document_id.into(),
            message: message.into(),
        }
    }

    /// Classify this error into a transport-level category.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Authentication(_) => ErrorCategory::Authentication,
            Self::RateLimited { .. } => ErrorCategory::RateLimit,
            Self::Network(_) => ErrorCategory::Network,
            Self::Timeout(_) => ErrorCategory::Timeout,
            Self::Configuration(_) => ErrorCategory::Configuration,
            Self::Serialization(_) => ErrorCategory::Serialization,
            Self::Api { status, .. } => match status {
                401 | 403 => ErrorCategory::Authentication,
                429 => ErrorCategory::RateLimit,
                500..=599 => ErrorCategory::Server,
                _ => ErrorCategory::Api,
            },
            Self::ToolExecution { .. } | Self::SchemaValidation { .. } | Self::UnknownTool(_) => {
                ErrorCategory::Tool
            }
            _ => ErrorCategory::Unknown,
        }
    }

    /// Whether this error is potentially retryable.
    ///
    /// A tool failure is retryable when the handler's own error is.
    pub fn is_retryable(&self) -> bool {
        if let Self::ToolExecution { source, .. } = self {
            return source.is_retryable();
        }
        matches!(
            self.category(),
            ErrorCategory::RateLimit
                | ErrorCategory::Network
                | ErrorCategory::Timeout
                | ErrorCategory::Server
        )
    }

    /// Caller-visible taxonomy tag.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::SchemaValidation { .. } | Self::InvalidArgument(_) => {
                ErrorKind::SchemaValidation
            }
            Self::UnknownTool(_) => ErrorKind::UnknownTool,
            Self::DuplicateTool(_) => ErrorKind::DuplicateTool,
            Self::ToolExecution { .. } => ErrorKind::ToolExecution,
            Self::TurnBudgetExceeded { .. } => ErrorKind::TurnBudgetExceeded,
            Self::Ingestion { .. } => ErrorKind::Ingestion,
            Self::RetrievalBackend(_) => ErrorKind::RetrievalBackend,
            Self::Timeout(_) => ErrorKind::Timeout,
            Self::Canceled => ErrorKind::Canceled,
            Self::Configuration(_) => ErrorKind::Configuration,
            Self::Store(_) | Self::Io(_) => ErrorKind::Store,
            Self::Api { .. }
            | Self::Network(_)
            | Self::Authentication(_)
            | Self::RateLimited { .. }
            | Self::Serialization(_)
            | Self::MalformedResponse(_) => ErrorKind::Model,
        }
    }
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, AgentryError>;
