//! CLI entry point for agentry.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::agent_loop::AgentFailure;

/// agentry CLI
#[derive(Parser, Debug)]
#[command(name = "agentry", version, about = "Tool-calling agent with document retrieval")]
pub struct Cli {
    /// Config file (TOML). Defaults to the platform config dir.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Model override (format: provider:model, e.g. google:gemini-2.5-flash)
    #[arg(short, long, global = true)]
    pub model: Option<String>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the agent on one prompt
    Generate(GenerateArgs),
    /// Index a document for retrieval
    Upload(UploadArgs),
    /// Ask a question about uploaded documents
    Query(QueryArgs),
    /// Interactive conversation on one thread
    Chat(ChatArgs),
}

#[derive(Args, Debug)]
pub struct GenerateArgs {
    pub prompt: String,

    /// Continue an existing thread
    #[arg(long)]
    pub thread: Option<String>,
}

#[derive(Args, Debug)]
pub struct UploadArgs {
    /// PDF or text file
    pub path: PathBuf,

    #[arg(long)]
    pub user: Option<String>,

    /// Document id (random when omitted)
    #[arg(long)]
    pub document: Option<String>,
}

#[derive(Args, Debug)]
pub struct QueryArgs {
    pub query: String,

    #[arg(long)]
    pub user: Option<String>,

    #[arg(long)]
    pub thread: Option<String>,
}

#[derive(Args, Debug)]
pub struct ChatArgs {
    /// Resume this thread instead of starting a new one
    #[arg(long)]
    pub thread: Option<String>,
}

impl Cli {
    /// Parse CLI arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Default filter directive for the `-v` count. `RUST_LOG` wins when set.
    pub fn log_directive(&self) -> &'static str {
        match self.verbose {
            0 => "agentry=info",
            1 => "agentry=debug",
            _ => "agentry=trace",
        }
    }
}

/// Install the stderr log subscriber. Stdout is kept for JSON responses.
pub fn init_logging(directive: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directive));
    let fmt_layer = fmt::layer().with_target(false).with_writer(std::io::stderr);

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init();
}

/// Pretty JSON for a command outcome, paired with whether it succeeded.
/// A failed run renders as its [`AgentFailure`] so callers can read `kind`.
pub fn render_outcome<T: Serialize>(
    outcome: &Result<T, AgentFailure>,
) -> serde_json::Result<(String, bool)> {
    match outcome {
        Ok(response) => Ok((serde_json::to_string_pretty(response)?, true)),
        Err(failure) => Ok((serde_json::to_string_pretty(failure)?, false)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AgentryError;
    use crate::service::GenerateResponse;
    use crate::store::ThreadId;
    use clap::Parser;
    use pretty_assertions::assert_eq;

    #[test]
    fn failed_run_renders_structured_failure() {
        let outcome: Result<GenerateResponse, AgentFailure> = Err(AgentFailure::from_error(
            &AgentryError::UnknownTool("Joke".into()),
            ThreadId::new("t1"),
            1,
        ));

        let (json, ok) = render_outcome(&outcome).unwrap();

        assert!(!ok);
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["kind"], "unknown_tool");
        assert_eq!(value["thread_id"], "t1");
        assert_eq!(value["turns"], 1);
        assert!(value["message"].as_str().unwrap().contains("Joke"));
    }

    #[test]
    fn successful_run_renders_response() {
        let outcome: Result<GenerateResponse, AgentFailure> = Ok(GenerateResponse {
            reply: "120".into(),
            thread_id: ThreadId::new("t1"),
        });

        let (json, ok) = render_outcome(&outcome).unwrap();

        assert!(ok);
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["reply"], "120");
    }

    #[test]
    fn parse_generate_with_thread() {
        let cli = Cli::try_parse_from(["agentry", "generate", "what is 5!", "--thread", "t1"])
            .unwrap();
        match cli.command {
            Commands::Generate(args) => {
                assert_eq!(args.prompt, "what is 5!");
                assert_eq!(args.thread.as_deref(), Some("t1"));
            }
            other => panic!("expected Generate, got {other:?}"),
        }
    }

    #[test]
    fn parse_upload() {
        let cli = Cli::try_parse_from(["agentry", "upload", "notes.pdf", "--user", "u9"]).unwrap();
        match cli.command {
            Commands::Upload(args) => {
                assert_eq!(args.path, PathBuf::from("notes.pdf"));
                assert_eq!(args.user.as_deref(), Some("u9"));
                assert!(args.document.is_none());
            }
            other => panic!("expected Upload, got {other:?}"),
        }
    }

    #[test]
    fn global_flags_follow_subcommand() {
        let cli = Cli::try_parse_from([
            "agentry",
            "query",
            "summary?",
            "-vv",
            "--config",
            "/tmp/agentry.toml",
            "-m",
            "anthropic:claude-sonnet-4-5",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.log_directive(), "agentry=trace");
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/agentry.toml")));
        assert_eq!(cli.model.as_deref(), Some("anthropic:claude-sonnet-4-5"));
        assert!(matches!(cli.command, Commands::Query(_)));
    }

    #[test]
    fn parse_chat_defaults() {
        let cli = Cli::try_parse_from(["agentry", "chat"]).unwrap();
        assert_eq!(cli.log_directive(), "agentry=info");
        match cli.command {
            Commands::Chat(args) => assert!(args.thread.is_none()),
            other => panic!("expected Chat, got {other:?}"),
        }
    }

    #[test]
    fn parse_missing_subcommand_is_error() {
        assert!(Cli::try_parse_from(["agentry"]).is_err());
    }
}
