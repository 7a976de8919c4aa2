//! Apply trimwise's size policies from the command line.
//!
//! Configuration comes from the environment (see [`trimwise::config`]).
//! Without `OPENROUTER_KEY`/`OPENAI_API_KEY` the summarizer is unavailable
//! and every command uses its structural fallback.
//!
//! # Examples
//!
//! ```sh
//! # Bound a tool result the way an agent would see it
//! curl -s https://api.example.com/records | trimwise guard --tool crm_search
//!
//! # Compact a saved transcript (JSON array of chat messages)
//! trimwise compact --transcript history.json --keep-recent 10
//!
//! # Validate a model's structured reply against a schema
//! trimwise parse --schema deal.schema.json --input reply.txt
//!
//! # Show the effective configuration
//! trimwise config
//! ```

use clap::{Parser, Subcommand};
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::Layer;
use trimwise::prelude::*;
use trimwise::structured::StructuredReply;

/// Apply trimwise's size policies from the command line.
#[derive(Parser)]
#[command(name = "trimwise")]
struct Cli {
    /// Log decisions at debug level
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a tool result through the response size guard
    Guard {
        /// Tool name used in prompts and saved file names
        #[arg(long)]
        tool: String,

        /// Read the result from this file instead of stdin
        #[arg(long)]
        input: Option<PathBuf>,

        /// Override the directory for saved payloads
        #[arg(long)]
        output_dir: Option<PathBuf>,
    },

    /// Compact a conversation transcript
    Compact {
        /// JSON array of chat messages; stdin if omitted
        #[arg(long)]
        transcript: Option<PathBuf>,

        /// Override the number of recent messages kept verbatim
        #[arg(long)]
        keep_recent: Option<usize>,

        /// Override the estimated-token threshold
        #[arg(long)]
        token_threshold: Option<usize>,
    },

    /// Parse a structured (JSON) model reply
    Parse {
        /// JSON Schema file to validate against
        #[arg(long)]
        schema: Option<PathBuf>,

        /// Read the reply from this file instead of stdin
        #[arg(long)]
        input: Option<PathBuf>,
    },

    /// Print the effective configuration
    Config,
}

fn read_input(path: Option<&Path>) -> Result<String, String> {
    match path {
        Some(p) => std::fs::read_to_string(p)
            .map_err(|e| format!("failed to read {}: {e}", p.display())),
        None => {
            let mut buf = String::new();
            io::stdin()
                .read_to_string(&mut buf)
                .map_err(|e| format!("failed to read stdin: {e}"))?;
            Ok(buf)
        }
    }
}

async fn run(cli: Cli) -> Result<(), String> {
    let config = TrimwiseConfig::from_env()?;

    match cli.command {
        Command::Config => {
            config.validate()?;
            println!("{}", config.to_report()?);
        }

        Command::Guard {
            tool,
            input,
            output_dir,
        } => {
            let config = match output_dir {
                Some(dir) => config.with_output_dir(dir),
                None => config,
            };
            config.validate()?;

            let summarizer = SummarizationService::initialize(&config.summarizer);
            let store = Arc::new(DiskBlobStore::new(&config.output_dir));
            let guard = ResponseSizeGuard::new(config.thresholds.clone(), summarizer, store);

            let text = read_input(input.as_deref())?;
            let output = guard.process(&tool, RawResult::from_text(text)).await;
            info!("guard outcome: {}", output.kind());
            println!("{}", output.into_text());
        }

        Command::Compact {
            transcript,
            keep_recent,
            token_threshold,
        } => {
            let mut budget = config.budget.clone();
            if let Some(n) = keep_recent {
                budget = budget.with_keep_recent(n);
            }
            if let Some(t) = token_threshold {
                budget = budget.with_token_threshold(t);
            }
            config.validate()?;
            budget.validate()?;

            let raw = read_input(transcript.as_deref())?;
            let messages: Vec<Message> = serde_json::from_str(&raw)
                .map_err(|e| format!("transcript is not a JSON array of messages: {e}"))?;
            info!("{}", budget.usage(&messages).to_log_string());

            let summarizer = SummarizationService::initialize(&config.summarizer);
            let budgeter = ConversationBudgeter::new(budget, summarizer);
            let compaction = budgeter.compact(messages).await;
            if compaction.is_lossy() {
                info!("older messages dropped without a summary");
            }
            let out = serde_json::to_string_pretty(compaction.messages())
                .map_err(|e| format!("failed to serialize messages: {e}"))?;
            println!("{out}");
        }

        Command::Parse { schema, input } => {
            let schema = match schema {
                Some(path) => {
                    let text = read_input(Some(path.as_path()))?;
                    Some(
                        serde_json::from_str::<serde_json::Value>(&text)
                            .map_err(|e| format!("schema is not valid JSON: {e}"))?,
                    )
                }
                None => None,
            };
            let raw = read_input(input.as_deref())?;
            let reply = StructuredReply::from_raw(&raw, schema.as_ref());
            let out = serde_json::to_string_pretty(&reply)
                .map_err(|e| format!("failed to serialize reply: {e}"))?;
            println!("{out}");
            if !reply.success {
                process::exit(2);
            }
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let level = if cli.verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(io::stderr)
                .with_target(false)
                .with_filter(level),
        )
        .init();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}
