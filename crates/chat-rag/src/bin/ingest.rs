//! Offline ingestion: build a named index from a file or directory
//!
//! Run with: cargo run -p chat-rag --features cli --bin chat-rag-ingest -- docs/ --index manuals --config chat-rag.toml --select

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use chat_rag::{
    config::{RagConfig, CONFIG_PATH_ENV},
    index::{IndexRegistry, IndexStore},
    ingestion::DocumentIngestor,
    providers::{EmbeddingProvider, OllamaEmbedder},
};

/// Build a chat-rag index from documents
#[derive(Parser, Debug)]
#[command(name = "chat-rag-ingest")]
#[command(version)]
#[command(about = "Ingest PDF, text, markdown or CSV documents into a named index", long_about = None)]
struct Cli {
    /// File or directory to ingest
    path: PathBuf,

    /// Index identifier to create or replace
    #[arg(short, long)]
    index: String,

    /// TOML configuration file (defaults to CHAT_RAG_CONFIG, then built-in defaults)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Record the index as `storage.default_index` in the configuration file
    #[arg(long)]
    select: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "chat_rag=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    let config_path = cli
        .config
        .clone()
        .or_else(|| std::env::var_os(CONFIG_PATH_ENV).map(PathBuf::from));
    let config = match &config_path {
        Some(path) => RagConfig::load(path)?,
        None => RagConfig::default(),
    }
    .with_env_overrides()?;

    let embedder: Arc<dyn EmbeddingProvider> =
        Arc::new(OllamaEmbedder::new(&config.llm, &config.embeddings)?);
    if !embedder.health_check().await? {
        anyhow::bail!(
            "Ollama is not reachable at {}; start it with `ollama serve`",
            config.llm.base_url
        );
    }

    let registry = Arc::new(IndexRegistry::new(IndexStore::open(&config.storage.index_dir)?));
    let ingestor = DocumentIngestor::new(&config, embedder, registry);

    let report = ingestor.ingest_path(&cli.index, &cli.path).await?;

    println!("Index '{}' written to {}", report.index, config.storage.index_dir.display());
    println!("  Sources: {}", report.sources.join(", "));
    println!("  Chunks: {}", report.chunks);
    println!("  Content hash: {}", report.content_hash);
    println!("  Took: {}ms", report.elapsed_ms);

    if cli.select {
        // The server reads its selection from the config file at startup
        let Some(path) = config_path else {
            anyhow::bail!(
                "--select needs a configuration file (--config or {})",
                CONFIG_PATH_ENV
            );
        };
        let mut stored = RagConfig::load(&path)?;
        stored.storage.default_index = Some(report.index.clone());
        stored.save(&path)?;
        println!("Selected '{}' as default index in {}", report.index, path.display());
    }

    Ok(())
}
