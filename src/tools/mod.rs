//! Tool system for function calling.

pub mod arguments;
pub mod builtin;
pub mod registry;
pub mod tool;
pub mod types;
pub mod validation;

pub use arguments::ToolArguments;
pub use registry::{ToolInvocation, ToolRegistry};
pub use tool::{AgentTool, Tool, ToolExecutionContext};
pub use types::{ParameterBuilder, ToolParameters};
