//! Command-line launcher for the vecfeed embedding synchronizer.
//!
//! `vecfeed run` installs the change trigger, subscribes to the
//! notification channel, and keeps the vector index in sync until the
//! operator types `stop program` (or sends Ctrl-C). `vecfeed reindex`
//! rebuilds the collection from the full table; `vecfeed drop-collection`
//! removes it.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use sqlx::postgres::PgPoolOptions;
use tokio::io::BufReader;
use tracing::info;
use tracing_subscriber::EnvFilter;
use vecfeed_index::{
    EmbeddingProvider, OpenAIEmbeddingProvider, PgVectorIndex, QdrantIndex, VectorIndex,
};
use vecfeed_sync::{ChangeFeed, SyncConfig, Synchronizer, control};

#[derive(Parser)]
#[command(name = "vecfeed", version, about = "Keep a vector index in sync with a PostgreSQL table")]
struct Cli {
    /// PostgreSQL connection string for the watched database
    #[arg(long, env = "DATABASE_URL")]
    database_url: String,

    /// OpenAI API key for embedding generation
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    openai_api_key: Option<String>,

    /// Embedding model name
    #[arg(long, default_value = "text-embedding-3-small")]
    embedding_model: String,

    /// Embedding dimensionality
    #[arg(long, default_value_t = 1536)]
    embedding_dimensions: usize,

    /// Vector index backend
    #[arg(long, value_enum, default_value_t = IndexBackend::Pgvector)]
    index_backend: IndexBackend,

    /// Qdrant gRPC URL (qdrant backend only)
    #[arg(long, env = "QDRANT_URL", default_value = "http://localhost:6334")]
    qdrant_url: String,

    /// Notification channel the change trigger publishes on
    #[arg(long, default_value = "insurance_policy_change")]
    channel: String,

    /// Vector index collection holding the embeddings
    #[arg(long, default_value = "insurance_policy_embeddings")]
    collection: String,

    /// Watched source table
    #[arg(long, default_value = "customer_insurance")]
    table: String,

    /// Seconds between processing cycles
    #[arg(long, default_value_t = 5)]
    interval_secs: u64,

    /// Attempts before a failing event is dropped
    #[arg(long, default_value_t = 3)]
    max_attempts: u32,

    /// Timeout in seconds for each embedding or index call
    #[arg(long, default_value_t = 30)]
    call_timeout_secs: u64,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the change-feed synchronizer daemon
    Run,
    /// Re-embed every row of the watched table into a fresh collection
    Reindex,
    /// Drop the embedding collection
    DropCollection,
}

#[derive(Clone, Copy, ValueEnum)]
enum IndexBackend {
    /// pgvector tables in the source PostgreSQL database
    Pgvector,
    /// A standalone Qdrant server
    Qdrant,
}

fn embedder(cli: &Cli, timeout: Duration) -> anyhow::Result<Arc<dyn EmbeddingProvider>> {
    let api_key = cli
        .openai_api_key
        .clone()
        .context("an OpenAI API key is required (--openai-api-key or OPENAI_API_KEY)")?;
    let provider = OpenAIEmbeddingProvider::with_timeout(api_key, timeout)?
        .with_model(&cli.embedding_model)
        .with_dimensions(cli.embedding_dimensions);
    Ok(Arc::new(provider))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = SyncConfig::builder()
        .interval(Duration::from_secs(cli.interval_secs))
        .max_attempts(cli.max_attempts)
        .call_timeout(Duration::from_secs(cli.call_timeout_secs))
        .channel(&cli.channel)
        .collection(&cli.collection)
        .table(&cli.table)
        .build()?;

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&cli.database_url)
        .await
        .context("failed to connect to PostgreSQL")?;

    let index: Arc<dyn VectorIndex> = match cli.index_backend {
        IndexBackend::Pgvector => Arc::new(PgVectorIndex::from_pool(pool.clone())),
        IndexBackend::Qdrant => Arc::new(QdrantIndex::new(&cli.qdrant_url)?),
    };

    match cli.command {
        Command::Run => {
            let embedder = embedder(&cli, config.call_timeout)?;
            index.ensure_collection(&config.collection, embedder.dimensions()).await?;

            let synchronizer = Synchronizer::builder()
                .config(config)
                .embedder(embedder)
                .index(Arc::clone(&index))
                .build()?;

            let mut feed = ChangeFeed::connect(&pool, synchronizer.config()).await?;

            let (shutdown_tx, shutdown_rx) = control::shutdown_channel();
            tokio::spawn(async move {
                let stdin = BufReader::new(tokio::io::stdin());
                tokio::select! {
                    _ = control::wait_for_stop_command(stdin) => {}
                    _ = tokio::signal::ctrl_c() => info!("interrupt received"),
                }
                let _ = shutdown_tx.send(true);
            });

            info!(command = control::STOP_COMMAND, "synchronizer running; enter the stop command to exit");
            synchronizer.run(&mut feed, shutdown_rx).await?;
        }
        Command::Reindex => {
            let embedder = embedder(&cli, config.call_timeout)?;
            let synchronizer = Synchronizer::builder()
                .config(config)
                .embedder(embedder)
                .index(Arc::clone(&index))
                .build()?;

            let count = synchronizer.reindex(&pool).await?;
            info!(count, "reindex complete");
        }
        Command::DropCollection => {
            index.drop_collection(&config.collection).await?;
            info!(collection = %config.collection, "collection dropped");
        }
    }

    pool.close().await;
    Ok(())
}
