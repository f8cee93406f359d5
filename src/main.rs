//! # Civic Context CLI (`civic`)
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `civic init` | Create the SQLite database and schema |
//! | `civic ingest <file>` | Chunk, embed and store a JSON array of documents |
//! | `civic query "<text>" --entity <id>` | Retrieve grounded context for a question |
//! | `civic score <committee> --records <file>` | Score recent committee activity |
//!
//! Logging goes to stderr and is controlled by `RUST_LOG` (default `info`).

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use civic_context::models::{DateRange, DocumentType, Query};
use civic_context::{activity, config, ingest, migrate, retrieve};

#[derive(Parser)]
#[command(
    name = "civic",
    about = "Grounded source retrieval for answers about public figures",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/civic.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Safe to run repeatedly.
    Init,

    /// Ingest documents from a JSON file.
    ///
    /// The file holds an array of documents with `entity_id`,
    /// `document_type`, `source_url`, `body`, and optionally `id`, `title`
    /// and `date` (YYYY-MM-DD).
    Ingest {
        /// Path to the documents file.
        file: PathBuf,

        /// Show document and chunk counts without embedding or writing.
        #[arg(long)]
        dry_run: bool,
    },

    /// Retrieve context for a question about one or more entities.
    Query {
        /// The question text.
        text: String,

        /// Entity id to search within. Repeat for several entities.
        #[arg(long = "entity", required = true)]
        entities: Vec<String>,

        /// Restrict to a document type. Repeat for several types.
        #[arg(long = "type")]
        types: Vec<DocumentType>,

        /// Only chunks dated on or after this date (YYYY-MM-DD).
        #[arg(long)]
        from: Option<NaiveDate>,

        /// Only chunks dated on or before this date (YYYY-MM-DD).
        #[arg(long)]
        to: Option<NaiveDate>,

        /// Maximum number of chunks to return.
        #[arg(long)]
        top_k: Option<usize>,

        /// Minimum cosine similarity, in [-1, 1].
        #[arg(long)]
        threshold: Option<f64>,

        /// Print the full outcome as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Score a committee's recent activity.
    Score {
        /// Committee code, e.g. `HSAG`.
        committee: String,

        /// JSON file of activity records.
        #[arg(long)]
        records: PathBuf,

        /// End of the trailing window (YYYY-MM-DD). Defaults to today.
        #[arg(long)]
        today: Option<NaiveDate>,

        /// Print the analytics as JSON.
        #[arg(long)]
        json: bool,
    },
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
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Ingest { file, dry_run } => {
            ingest::run_ingest(&cfg, &file, dry_run).await?;
        }
        Commands::Query {
            text,
            entities,
            types,
            from,
            to,
            top_k,
            threshold,
            json,
        } => {
            let mut query = Query::new(
                text,
                entities,
                threshold.unwrap_or(cfg.retrieval.similarity_threshold),
            );
            query.top_k = top_k.unwrap_or(cfg.retrieval.top_k);
            if !types.is_empty() {
                query.document_types = Some(types);
            }
            if from.is_some() || to.is_some() {
                query.date_range = Some(DateRange { from, to });
            }
            retrieve::run_query(&cfg, &query, json).await?;
        }
        Commands::Score {
            committee,
            records,
            today,
            json,
        } => {
            let today = today.unwrap_or_else(|| chrono::Local::now().date_naive());
            activity::run_score(&cfg, &committee, &records, today, json).await?;
        }
    }

    Ok(())
}
