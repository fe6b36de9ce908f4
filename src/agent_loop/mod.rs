//! Agent loop: state machine, limits and run events.

pub mod events;
pub mod limits;
pub mod runner;
pub mod types;

pub use events::{AgentEvent, AgentEventPayload, EventSink};
pub use limits::LoopLimits;
pub use runner::AgentLoop;
pub use types::{AgentFailure, AgentReply, LoopState, RunRequest};
