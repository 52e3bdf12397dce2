//! Chat RAG server binary
//!
//! Run with: cargo run -p chat-rag --bin chat-rag-server

use chat_rag::{config::RagConfig, server::RagServer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "chat_rag=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    println!(
        r#"
╔═══════════════════════════════════════════════════════════╗
║                        Chat RAG                           ║
║        Conversational Q&A with Streamed Citations         ║
╚═══════════════════════════════════════════════════════════╝
"#
    );

    // Load configuration (CHAT_RAG_CONFIG plus env overrides)
    let config = RagConfig::from_env()?;

    tracing::info!("Configuration loaded");
    tracing::info!("  - Embedding model: {}", config.embeddings.model);
    tracing::info!("  - Embedding dimensions: {}", config.embeddings.dimensions);
    tracing::info!("  - LLM model: {}", config.llm.generate_model);
    tracing::info!("  - Retrieval top_k: {}", config.retrieval.top_k);
    tracing::info!("  - Citations: {:?}", config.citations.backend);

    // Create and start server
    let server = RagServer::new(config.clone()).await?;

    // Check Ollama
    tracing::info!("Checking Ollama at {}...", config.llm.base_url);
    let client = chat_rag::generation::OllamaClient::new(&config.llm)?;
    if client.health_check().await? {
        tracing::info!("Ollama is running");
    } else {
        tracing::warn!("Ollama not available at {}", config.llm.base_url);
        tracing::warn!("Please start Ollama:");
        tracing::warn!("  1. Start: ollama serve");
        tracing::warn!(
            "  2. Pull models: ollama pull {} && ollama pull {}",
            config.embeddings.model,
            config.llm.generate_model
        );
    }

    println!("\nServer starting...");
    println!("  Chat: ws://{}/chat", server.address());
    println!("  Health: http://{}/health", server.address());
    println!("  API Info: http://{}/api/info", server.address());
    println!("\nEndpoints:");
    println!("  GET  /chat[/:index]        - Websocket chat");
    println!("  POST /api/ingest           - Upload a document into a new index");
    println!("  GET  /api/indexes          - List indexes");
    println!("  POST /api/indexes/select   - Select the index for new sessions");
    println!("\nPress Ctrl+C to stop\n");

    server.start().await?;

    Ok(())
}
