//! agentry CLI binary entry point.

use std::io::Write;

use agentry::agent_loop::AgentFailure;
use agentry::cli::{init_logging, render_outcome, ChatArgs, Cli, Commands};
use agentry::config::AgentryConfig;
use agentry::service::{AgentService, GenerateRequest, QueryRequest, UploadRequest};
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() {
    let cli = Cli::parse_args();
    init_logging(cli.log_directive());

    if let Err(e) = run(cli).await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = AgentryConfig::load(cli.config.as_deref())?;
    if let Some(model) = cli.model {
        config.model = model;
    }
    let service = AgentService::from_config(&config)?;

    match cli.command {
        Commands::Generate(args) => {
            let response = service
                .generate_with_cancel(
                    GenerateRequest {
                        prompt: args.prompt,
                        thread_id: args.thread,
                    },
                    cancel_on_ctrl_c(),
                )
                .await;
            print_outcome(&response)?;
        }
        Commands::Upload(args) => {
            let response = service
                .upload(UploadRequest {
                    path: args.path,
                    user_id: args.user,
                    document_id: args.document,
                })
                .await;
            print_json(&response)?;
            if !response.is_ok() {
                std::process::exit(1);
            }
        }
        Commands::Query(args) => {
            let response = service
                .query(QueryRequest {
                    query: args.query,
                    user_id: args.user,
                    thread_id: args.thread,
                })
                .await;
            print_outcome(&response)?;
        }
        Commands::Chat(args) => chat(&service, args).await?,
    }
    Ok(())
}

async fn chat(service: &AgentService, args: ChatArgs) -> Result<(), Box<dyn std::error::Error>> {
    let mut thread_id = args.thread;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        eprint!("> ");
        std::io::stderr().flush()?;
        let Some(line) = lines.next_line().await? else {
            break;
        };
        let prompt = line.trim();
        if prompt.is_empty() {
            continue;
        }
        if matches!(prompt, "/exit" | "/quit") {
            break;
        }

        match service
            .generate(GenerateRequest {
                prompt: prompt.to_string(),
                thread_id: thread_id.clone(),
            })
            .await
        {
            Ok(response) => {
                println!("{}", response.reply);
                thread_id = Some(response.thread_id.to_string());
            }
            Err(failure) => {
                eprintln!("❌ {failure}");
                thread_id = Some(failure.thread_id.to_string());
            }
        }
    }
    if let Some(id) = thread_id {
        eprintln!("thread: {id}");
    }
    Ok(())
}

/// A token canceled by the first Ctrl-C.
fn cancel_on_ctrl_c() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            trigger.cancel();
        }
    });
    token
}

fn print_json<T: Serialize>(value: &T) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Print the outcome to stdout and exit non-zero when the run failed.
fn print_outcome<T: Serialize>(
    outcome: &Result<T, AgentFailure>,
) -> Result<(), Box<dyn std::error::Error>> {
    let (json, ok) = render_outcome(outcome)?;
    println!("{json}");
    if !ok {
        std::process::exit(1);
    }
    Ok(())
}
