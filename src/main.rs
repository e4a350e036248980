//! `haku` command-line interface.
//!
//! - `haku ask` sends one request through the pipeline.
//! - `haku chat` runs a conversation over stdin.
//! - `haku classify` shows tier, task class, mode and plan.
//! - `haku validate` runs TT-01 on a reply.
//! - `haku config` prints the effective configuration, or writes it
//!   with `--write`.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use haku::config::expand_path;
use haku::governance::{format_validation_message, validate_response, PrivacyTier};
use haku::{Config, InMemoryConversationStore, InMemoryKnowledge, Pipeline, PipelineResponse};

/// Governance-gated multi-backend LLM router.
#[derive(Parser)]
#[command(name = "haku", about = "Governance-gated multi-backend LLM router", version)]
struct Cli {
    /// Enable debug logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file path (defaults to the platform config directory).
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Directory of `.md`/`.txt` files used as lookup context.
    #[arg(short, long, global = true)]
    knowledge: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Send one request.
    Ask {
        message: String,

        /// Minimum privacy tier (0-3).
        #[arg(long, value_parser = parse_tier)]
        tier: Option<PrivacyTier>,

        /// Print the full response as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Interactive session over stdin. `/quit` ends it.
    Chat {
        /// Minimum privacy tier (0-3).
        #[arg(long, value_parser = parse_tier)]
        tier: Option<PrivacyTier>,
    },

    /// Classify and route without calling a backend.
    Classify {
        message: String,

        /// Minimum privacy tier (0-3).
        #[arg(long, value_parser = parse_tier)]
        tier: Option<PrivacyTier>,

        /// Print the classification as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Run TT-01 on a response.
    Validate {
        response: String,

        /// Query the response answers.
        #[arg(long)]
        query: String,

        /// Supporting context.
        #[arg(long)]
        context: Option<String>,
    },

    /// Print the effective configuration as TOML.
    Config {
        /// Write it to this path instead of printing.
        #[arg(long)]
        write: Option<String>,
    },
}

fn parse_tier(raw: &str) -> Result<PrivacyTier, String> {
    let level: u8 = raw
        .parse()
        .map_err(|_| format!("'{raw}' is not a tier number"))?;
    PrivacyTier::try_from(level)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "haku=debug" } else { "haku=info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let config_path: Option<PathBuf> = cli.config.as_deref().map(expand_path);
    let config = Config::load(config_path.as_deref())?;

    match cli.command {
        Commands::Ask {
            message,
            tier,
            json,
        } => {
            let pipeline = build_pipeline(&config, cli.knowledge.as_deref())?;
            let response = pipeline.handle_request(&message, tier).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&response)?);
            } else {
                print_response(&response);
            }
        }
        Commands::Chat { tier } => {
            let store = Arc::new(InMemoryConversationStore::new());
            let pipeline =
                build_pipeline(&config, cli.knowledge.as_deref())?.with_history(store.clone());
            run_chat(&pipeline, &store, tier).await?;
        }
        Commands::Classify {
            message,
            tier,
            json,
        } => {
            let pipeline = build_pipeline(&config, None)?;
            let classification = pipeline.classify(&message, tier, None);
            if json {
                println!("{}", serde_json::to_string_pretty(&classification)?);
            } else {
                let plan = &classification.plan;
                println!("Tier:        {}", classification.privacy_tier());
                if !classification.privacy_cues.is_empty() {
                    println!("Cues:        {}", classification.privacy_cues.join(", "));
                }
                println!("Task class:  {}", classification.task_class);
                println!("Mode:        {}", classification.mode);
                println!("Primary:     {} → {}", plan.primary, classification.primary_backend);
                let validators = plan.validator_backends(pipeline.organs());
                if !validators.is_empty() {
                    println!("Validators:  {}", validators.join(", "));
                } else if classification.task_class.demands_truth_check() {
                    println!("Validators:  none (waived at {})", classification.privacy_tier());
                } else {
                    println!("Validators:  none");
                }
            }
        }
        Commands::Validate {
            response,
            query,
            context,
        } => {
            let result = validate_response(&response, &query, context.as_deref());
            let message = format_validation_message(&result);
            println!("TT-01: {} ({} confidence)", result.status, result.confidence);
            if !message.is_empty() {
                println!("\n{message}");
            }
        }
        Commands::Config { write } => match write {
            Some(path) => {
                let path = expand_path(&path);
                config.save(&path)?;
                tracing::info!(path = %path.display(), "Wrote config");
            }
            None => print!("{}", config.to_toml()?),
        },
    }

    Ok(())
}

fn build_pipeline(config: &Config, knowledge: Option<&str>) -> anyhow::Result<Pipeline> {
    let pipeline = Pipeline::from_config(config)?;
    match knowledge {
        Some(dir) => {
            let kb = InMemoryKnowledge::load_dir(&expand_path(dir))?;
            tracing::info!(paragraphs = kb.len(), "Loaded knowledge base");
            Ok(pipeline.with_context(Arc::new(kb)))
        }
        None => Ok(pipeline),
    }
}

fn print_response(response: &PipelineResponse) {
    println!("{}", response.final_text);
    let status = response
        .validation_status
        .map_or_else(|| "not run".to_string(), |s| s.to_string());
    eprintln!(
        "\n[{} | {} | {} | TT-01: {}]",
        response.primary_backend, response.privacy_tier, response.task_class, status
    );
}

async fn run_chat(
    pipeline: &Pipeline,
    store: &InMemoryConversationStore,
    tier: Option<PrivacyTier>,
) -> anyhow::Result<()> {
    let conversation_id = uuid::Uuid::new_v4().to_string();
    tracing::info!(conversation_id = %conversation_id, "Started conversation");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    loop {
        stdout.write_all(b"> ").await?;
        stdout.flush().await?;

        let Some(line) = lines.next_line().await.context("Failed to read stdin")? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if matches!(line, "/quit" | "/exit") {
            break;
        }

        match pipeline
            .handle_in_conversation(&conversation_id, line, tier)
            .await
        {
            Ok(response) => print_response(&response),
            Err(e) => eprintln!("error: {:#}", anyhow::Error::from(e)),
        }
    }

    tracing::info!(
        conversation_id = %conversation_id,
        turns = store.len(&conversation_id),
        topics = ?store.topics(&conversation_id),
        "Conversation ended"
    );
    Ok(())
}
