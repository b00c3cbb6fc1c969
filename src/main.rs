//! # CampusKB CLI (`kb`)
//!
//! The `kb` binary is the primary interface for CampusKB. It provides
//! commands for database initialization, document ingestion, question
//! answering, document management, and error log inspection.
//!
//! ## Usage
//!
//! ```bash
//! kb --config ./config/kb.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `kb init` | Create the SQLite database and run schema migrations |
//! | `kb ingest <files>` | Ingest documents into a topic |
//! | `kb ask "<question>"` | Ask a question against the knowledge base |
//! | `kb documents` | List ingested documents |
//! | `kb delete-doc <id>` | Delete a document and its vectors |
//! | `kb errors` | Show recent error log entries |

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use campuskb::completion::{Completion, OpenAiCompletion};
use campuskb::config::{self, Config};
use campuskb::db;
use campuskb::embedding::{Embedder, OpenAiEmbedder};
use campuskb::error_log::ErrorLogStore;
use campuskb::generate::ResponseGenerator;
use campuskb::index::{SqliteIndex, VectorIndex};
use campuskb::ingest;
use campuskb::migrate;
use campuskb::retrieve::ContextRetriever;
use campuskb::session::SessionStore;

/// CampusKB CLI — a retrieval-augmented question answering pipeline for
/// school knowledge bases.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/kb.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "kb",
    about = "CampusKB — retrieval-augmented question answering for school knowledge bases",
    version,
    long_about = "CampusKB ingests school documents (PDF, DOCX, plain text, Markdown), chunks \
    and embeds them into a topic-partitioned vector index, and answers questions grounded in \
    the retrieved context. Questions the knowledge base cannot answer receive a configured \
    fallback response."
)]
struct Cli {
    /// Path to configuration file (TOML).
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
    /// Creates the SQLite database file and all required tables, and
    /// records the configured embedding dimension. Idempotent.
    Init,

    /// Ingest documents into the knowledge base.
    ///
    /// Each file is extracted, chunked, embedded, and indexed under the
    /// given topic. A failing file is skipped and reported; the rest of
    /// the batch continues.
    Ingest {
        /// Files to ingest (.pdf, .docx, .txt, .md).
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Topic to ingest into. Must be listed in `topics` in the config.
        #[arg(long)]
        topic: Option<String>,
    },

    /// Ask a question against the knowledge base.
    ///
    /// Retrieves relevant context for the question and generates a
    /// grounded answer. Prints the fallback response when no relevant
    /// context exists or the pipeline fails.
    Ask {
        /// The question to answer.
        question: String,

        /// Session id for multi-turn conversations. A new session is
        /// created when omitted.
        #[arg(long)]
        session: Option<String>,

        /// Topic to search. Must be listed in `topics` in the config.
        #[arg(long)]
        topic: Option<String>,
    },

    /// List ingested documents.
    Documents,

    /// Delete a document and all of its vectors.
    ///
    /// Idempotent: deleting an unknown document id succeeds with zero
    /// vectors removed.
    DeleteDoc {
        /// Document id (as shown by `kb documents`).
        document_id: String,

        /// Topic the document belongs to.
        #[arg(long)]
        topic: Option<String>,
    },

    /// Show recent error log entries, newest first.
    Errors {
        /// Maximum number of entries to show.
        #[arg(long, default_value = "20")]
        limit: i64,
    },
}

fn default_topic(config: &Config, topic: Option<String>) -> String {
    topic.unwrap_or_else(|| config.topics[0].clone())
}

fn build_index(pool: &sqlx::SqlitePool, config: &Config) -> Arc<dyn VectorIndex> {
    Arc::new(SqliteIndex::new(
        pool.clone(),
        config.embedding.dims,
        config.topics.clone(),
    ))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    let pool = db::connect(&cfg).await?;

    if let Commands::Init = cli.command {
        migrate::run_migrations(&pool, cfg.embedding.dims).await?;
        println!("Database initialized successfully.");
        return Ok(());
    }

    // Every other command runs against an initialized index whose
    // dimension matches the configuration.
    migrate::check_dimension(&pool, cfg.embedding.dims).await?;

    match cli.command {
        Commands::Init => unreachable!(),
        Commands::Ingest { files, topic } => {
            let topic = default_topic(&cfg, topic);
            let embedder: Arc<dyn Embedder> =
                Arc::new(OpenAiEmbedder::new(&cfg.embedding).context("embedding provider")?);
            let index = build_index(&pool, &cfg);
            let error_log = ErrorLogStore::new(pool.clone());

            let mut failures = 0usize;
            for file in &files {
                match ingest::ingest_file(&cfg, &pool, &embedder, &index, file, &topic).await {
                    Ok(outcome) => {
                        println!(
                            "Ingested {} ({} chunks, {} skipped) as {}",
                            outcome.document.name,
                            outcome.report.succeeded,
                            outcome.report.skipped.len(),
                            outcome.document.document_id
                        );
                        if outcome.duplicate_of_existing {
                            println!(
                                "  warning: identical content already exists in topic '{}'",
                                topic
                            );
                        }
                    }
                    Err(e) => {
                        failures += 1;
                        error_log.record(Some(&topic), &e).await;
                        eprintln!("Failed to ingest {}: {}", file.display(), e);
                    }
                }
            }

            if failures > 0 {
                anyhow::bail!("{} of {} files failed to ingest", failures, files.len());
            }
        }
        Commands::Ask {
            question,
            session,
            topic,
        } => {
            let topic = default_topic(&cfg, topic);
            let session_id = session.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

            let embedder: Arc<dyn Embedder> =
                Arc::new(OpenAiEmbedder::new(&cfg.embedding).context("embedding provider")?);
            let completion: Arc<dyn Completion> =
                Arc::new(OpenAiCompletion::new(&cfg.completion).context("completion provider")?);
            let index = build_index(&pool, &cfg);

            let generator = ResponseGenerator::new(
                ContextRetriever::new(embedder, index),
                completion,
                SessionStore::new(pool.clone()),
                ErrorLogStore::new(pool.clone()),
                cfg.retrieval.clone(),
                cfg.chat.clone(),
            );

            let answer = generator.respond(&session_id, &topic, &question).await;
            println!("{}", answer);
            eprintln!("(session: {})", session_id);
        }
        Commands::Documents => {
            let docs = ingest::list_documents(&pool).await?;
            if docs.is_empty() {
                println!("No documents ingested.");
            } else {
                for doc in docs {
                    println!(
                        "{}  {:8}  {:>4} chunks  [{}]  {}",
                        doc.document_id,
                        doc.status.as_str(),
                        doc.chunk_count,
                        doc.topic,
                        doc.name
                    );
                }
            }
        }
        Commands::DeleteDoc { document_id, topic } => {
            let topic = default_topic(&cfg, topic);
            let index = build_index(&pool, &cfg);
            let removed = ingest::delete_document(&cfg, &pool, &index, &document_id, &topic).await?;
            println!("Deleted {} vectors for document {}", removed, document_id);
        }
        Commands::Errors { limit } => {
            let entries = ErrorLogStore::new(pool.clone()).recent(limit).await?;
            if entries.is_empty() {
                println!("No errors logged.");
            } else {
                for entry in entries {
                    println!(
                        "{}  {}  {}/{}  {}",
                        entry.timestamp,
                        entry.topic.as_deref().unwrap_or("-"),
                        entry.component,
                        entry.error_kind,
                        entry.message
                    );
                }
            }
        }
    }

    Ok(())
}
