//! agentry: a tool-calling agent loop with per-thread memory and document retrieval.
//!
//! The [`agent_loop::AgentLoop`] alternates between a model and the tools in a
//! [`tools::ToolRegistry`] until the model answers, persisting every step to a
//! [`store::ConversationStore`]. [`retrieval::RetrievalIndex`] chunks and embeds
//! uploaded documents and backs the `RAG` tool. [`service::AgentService`] wires
//! them together behind the `generate` / `upload` / `query` operations.
//!
//! # Quick Start
//!
//! ```no_run
//! use agentry::config::AgentryConfig;
//! use agentry::service::{AgentService, GenerateRequest};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = AgentryConfig::from_env()?;
//! let service = AgentService::from_config(&config)?;
//! let response = service
//!     .generate(GenerateRequest {
//!         prompt: "What is the factorial of 5?".into(),
//!         thread_id: None,
//!     })
//!     .await?;
//! println!("{}", response.reply);
//! # Ok(())
//! # }
//! ```

pub mod agent_loop;
pub mod config;
pub mod error;
pub mod models;
pub mod provider;
pub mod retrieval;
pub mod service;
pub mod store;
pub mod tools;
pub mod types;
pub mod util;

#[cfg(feature = "cli")]
pub mod cli;
