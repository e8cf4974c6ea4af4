use anyhow::{Context, Result};
use chatbot_responses::app::{Orchestrator, TurnRequest};
use chatbot_responses::config::Config;
use chatbot_responses::splitter::RecursiveCharacterTextSplitter;
use chatbot_responses::tokens::TokenBudget;
use clap::{Parser, Subcommand};
use std::io::Read;
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "chatbot-responses")]
#[command(about = "Conversation turns over the OpenAI Responses API")]
struct CliArgs {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Send one turn and print the normalized result as JSON.
    Ask {
        /// Prompt text.
        prompt: String,
        /// Continue an existing conversation.
        #[arg(long)]
        conversation: Option<String>,
        #[arg(long)]
        user: Option<String>,
    },
    /// Split text into chunks, one JSON string per line.
    Split {
        #[arg(long, default_value_t = 1000)]
        chunk_size: usize,
        #[arg(long, default_value_t = 200)]
        chunk_overlap: usize,
        /// Input file; stdin when omitted.
        file: Option<PathBuf>,
    },
    /// Trim text to a token budget.
    Trim {
        #[arg(long)]
        context_size: Option<usize>,
        file: Option<PathBuf>,
    },
    /// Remove conversations older than the retention window.
    Cleanup {
        #[arg(long)]
        older_than_hours: Option<u64>,
    },
}

fn read_input(file: Option<&PathBuf>) -> Result<String> {
    match file {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display())),
        None => {
            let mut buffer = String::new();
            std::io::stdin()
                .read_to_string(&mut buffer)
                .context("Failed to read stdin")?;
            Ok(buffer)
        }
    }
}

async fn run(command: Command, config: Config) -> Result<()> {
    match command {
        Command::Ask {
            prompt,
            conversation,
            user,
        } => {
            let orchestrator = Orchestrator::from_config(&config)?;
            let mut turn = TurnRequest::new(prompt);
            turn.conversation_id = conversation;
            turn.user_id = user;

            let outcome = orchestrator.submit_turn(turn).await?;
            if outcome.optimization.should_truncate {
                info!(
                    "Context over budget: {}",
                    outcome
                        .optimization
                        .recommended_summary
                        .as_deref()
                        .unwrap_or_default()
                );
            }
            println!("{}", serde_json::to_string_pretty(&outcome.result)?);
        }
        Command::Split {
            chunk_size,
            chunk_overlap,
            file,
        } => {
            let text = read_input(file.as_ref())?;
            let splitter = RecursiveCharacterTextSplitter::new(chunk_size, chunk_overlap)?;
            for chunk in splitter.split_text(&text)? {
                println!("{}", serde_json::to_string(&chunk)?);
            }
        }
        Command::Trim { context_size, file } => {
            let text = read_input(file.as_ref())?;
            let budget = TokenBudget::for_model(
                &config.model,
                context_size.unwrap_or(config.context_size),
            )?;
            print!("{}", budget.trim_prompt(&text));
        }
        Command::Cleanup { older_than_hours } => {
            let orchestrator = Orchestrator::from_config(&config)?;
            let hours = older_than_hours.unwrap_or(config.retention_hours);
            let removed = orchestrator.state().cleanup(hours).await?;
            println!("{}", removed);
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "chatbot_responses=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = CliArgs::parse();
    let config = Config::from_env()?;

    if let Err(e) = run(args.command, config).await {
        error!("Command failed: {:#}", e);
        std::process::exit(1);
    }
    Ok(())
}
