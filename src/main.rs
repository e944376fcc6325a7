//! # coursekb CLI (`ckb`)
//!
//! The `ckb` binary drives the classification and aggregation pipeline from
//! the command line. It covers database initialization, one-off
//! classification, envelope-file processing, the mock web-schedule source,
//! full reprocessing, and read-only knowledge base views.
//!
//! ## Usage
//!
//! ```bash
//! ckb --config ./config/kb.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `ckb init` | Create the SQLite database and run schema migrations |
//! | `ckb classify --text "..."` | Classify a message, print the normalized result |
//! | `ckb process <file>` | Process a JSON file of envelopes through the pipeline |
//! | `ckb ingest web-stub` | Run the mock web-schedule envelope through the pipeline |
//! | `ckb reprocess` | Wipe derived data and replay all stored messages |
//! | `ckb tasks` | List aggregated course tasks |
//! | `ckb show <task-id>` | Show a task and its knowledge entries |

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use coursekb::aggregator::TaskAggregator;
use coursekb::classifier::Classifier;
use coursekb::config::{self, Config};
use coursekb::embedding::EmbeddingClient;
use coursekb::models::{EnvelopeMetadata, IngestionEnvelope, SenderRole, SourceType};
use coursekb::pipeline::process_envelope;
use coursekb::similarity::{LocalVectorIndex, SimilarityIndex};
use coursekb::{db, migrate, reprocess, sources, store};

/// coursekb CLI — classify classroom messages and aggregate them into a
/// course knowledge base.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/kb.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "ckb",
    about = "coursekb — classify classroom messages and aggregate them into course tasks",
    version,
    long_about = "coursekb ingests classroom messages (Telegram chats, schedule pages), \
    classifies each one with an LLM or deterministic heuristics, and merges significant \
    results into persistent course tasks via semantic similarity matching. The result is \
    a knowledge base of deadlines, links, and explanations grouped by task."
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/kb.toml`. Database, classifier, and embedding
    /// settings are read from this file.
    #[arg(long, global = true, default_value = "./config/kb.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and all required tables (messages,
    /// analysis_results, course_tasks, knowledge_entries, task_vectors).
    /// This command is idempotent — running it multiple times is safe.
    Init,

    /// Classify a single message and print the normalized result as JSON.
    ///
    /// Nothing is persisted. With no classifier backend configured the
    /// deterministic heuristics run, which makes this command useful for
    /// inspecting what the fallback path produces.
    Classify {
        /// The message text to classify.
        #[arg(long)]
        text: String,

        /// Sender role: `teacher`, `student`, or `unknown`.
        #[arg(long, default_value = "unknown")]
        role: String,
    },

    /// Process a JSON file of ingestion envelopes through the full pipeline.
    ///
    /// The file holds either a single envelope object or an array of them.
    /// Each envelope is stored, classified, and aggregated; redelivering the
    /// same file converges to the same state.
    Process {
        /// Path to the envelope JSON file.
        file: PathBuf,
    },

    /// Ingest from an auxiliary source.
    Ingest {
        #[command(subcommand)]
        source: IngestSource,
    },

    /// Wipe derived data and replay all stored messages chronologically.
    ///
    /// Raw messages are kept; analysis results, course tasks, knowledge
    /// entries, and the similarity index are rebuilt from scratch. Run this
    /// after changing classification logic.
    Reprocess,

    /// List aggregated course tasks with their entry counts.
    Tasks,

    /// Show one course task and all knowledge entries attached to it.
    Show {
        /// Course task UUID.
        task_id: String,
    },
}

/// Auxiliary ingestion sources.
#[derive(Subcommand)]
enum IngestSource {
    /// Run the built-in mock web-schedule envelope through the pipeline.
    ///
    /// Generates a static schedule-page message with a fresh source id, so
    /// every invocation stores a new message. Useful for exercising the
    /// pipeline without a live transport.
    WebStub,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            let pool = db::connect(&cfg.db).await?;
            migrate::run_migrations(&pool).await?;
            println!("Database initialized successfully.");
        }
        Commands::Classify { text, role } => {
            let classifier = Classifier::from_config(&cfg.classifier)?;
            let envelope = IngestionEnvelope {
                text,
                source_type: SourceType::Telegram,
                source_id: format!("cli:{}", uuid::Uuid::new_v4()),
                metadata: EnvelopeMetadata {
                    sender_role: SenderRole::parse(&role),
                    ..Default::default()
                },
            };
            let result = classifier.classify(&envelope).await;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Commands::Process { file } => {
            let envelopes = sources::load_envelopes(&file)?;
            let (pool, classifier, aggregator) = build_pipeline(&cfg).await?;
            let mut failed = 0usize;
            for envelope in &envelopes {
                match process_envelope(&pool, &classifier, &aggregator, envelope).await {
                    Ok(report) => {
                        println!(
                            "{} [{} score {}] task: {} entries: +{}",
                            report.message_id,
                            report.category.as_str(),
                            report.importance_score,
                            report.task_id.as_deref().unwrap_or("-"),
                            report.entries_created,
                        );
                    }
                    Err(e) => {
                        eprintln!("Failed to process envelope {}: {:#}", envelope.source_id, e);
                        failed += 1;
                    }
                }
            }
            println!("Processed {} envelope(s), {} failed.", envelopes.len(), failed);
        }
        Commands::Ingest { source } => match source {
            IngestSource::WebStub => {
                let envelope = sources::web_stub_envelope();
                let (pool, classifier, aggregator) = build_pipeline(&cfg).await?;
                let report = process_envelope(&pool, &classifier, &aggregator, &envelope).await?;
                println!(
                    "Ingested web stub as message {} [{} score {}]",
                    report.message_id,
                    report.category.as_str(),
                    report.importance_score,
                );
            }
        },
        Commands::Reprocess => {
            let pool = db::connect(&cfg.db).await?;
            let classifier = Classifier::from_config(&cfg.classifier)?;
            let index = build_index(&cfg, &pool)?;
            let report = reprocess::run_reprocess(&pool, &classifier, index).await?;
            println!(
                "Reprocessed {} message(s): {} ok, {} failed.",
                report.total, report.processed, report.failed,
            );
        }
        Commands::Tasks => {
            let pool = db::connect(&cfg.db).await?;
            let tasks = store::list_tasks(&pool).await?;
            if tasks.is_empty() {
                println!("No course tasks yet.");
            } else {
                for (task, entry_count) in tasks {
                    println!(
                        "{}  [{}] [{}] {} ({} entries)",
                        task.id,
                        task.status.as_str(),
                        task.task_type.as_str(),
                        task.title,
                        entry_count,
                    );
                }
            }
        }
        Commands::Show { task_id } => {
            let pool = db::connect(&cfg.db).await?;
            let Some(task) = store::get_task(&pool, &task_id).await? else {
                anyhow::bail!("No course task with id {}", task_id);
            };
            println!("Task:        {}", task.id);
            println!("Title:       {}", task.title);
            println!("Status:      {}", task.status.as_str());
            println!("Type:        {}", task.task_type.as_str());
            if !task.description.is_empty() {
                println!("Description: {}", task.description);
            }
            let entries = store::list_entries_for_task(&pool, &task_id).await?;
            println!("Entries ({}):", entries.len());
            for entry in entries {
                println!("  [{}] {}", entry.entry_type.as_str(), entry.content);
            }
        }
    }

    Ok(())
}

/// Connect, wire the classifier and the aggregation stack from config.
async fn build_pipeline(
    cfg: &Config,
) -> anyhow::Result<(sqlx::SqlitePool, Classifier, TaskAggregator)> {
    let pool = db::connect(&cfg.db).await?;
    migrate::run_migrations(&pool).await?;
    let classifier = Classifier::from_config(&cfg.classifier)?;
    let index = build_index(cfg, &pool)?;
    let aggregator = TaskAggregator::new(pool.clone(), index);
    Ok((pool, classifier, aggregator))
}

fn build_index(
    cfg: &Config,
    pool: &sqlx::SqlitePool,
) -> anyhow::Result<Arc<dyn SimilarityIndex>> {
    let embeddings = EmbeddingClient::from_config(&cfg.embedding)?;
    Ok(Arc::new(LocalVectorIndex::new(pool.clone(), embeddings)))
}
