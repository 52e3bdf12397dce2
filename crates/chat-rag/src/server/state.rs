//! Application state for the chat server

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::config::RagConfig;
use crate::error::Result;
use crate::generation::{CitationResolvers, IndexBinding, RagGenerator};
use crate::index::{IndexRegistry, IndexStore};
use crate::ingestion::DocumentIngestor;
use crate::providers::{EmbeddingProvider, GenerationProvider, OllamaProvider};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    /// Configuration
    config: RagConfig,
    /// Named indexes and the current selection
    registry: Arc<IndexRegistry>,
    /// Embedding provider (shared by ingestion and retrieval)
    embedder: Arc<dyn EmbeddingProvider>,
    /// Generation provider
    generator: Arc<dyn GenerationProvider>,
    /// Per-question pipeline
    rag: RagGenerator,
    /// Citation settings per index
    citations: CitationResolvers,
    /// Upload ingestion
    ingestor: DocumentIngestor,
    /// Open websocket sessions
    active_sessions: AtomicUsize,
}

impl AppState {
    /// Create state backed by Ollama and the configured citation store
    pub async fn new(config: RagConfig) -> Result<Self> {
        tracing::info!(
            "Initializing chat state (ollama: {}, model: {}, embeddings: {})",
            config.llm.base_url,
            config.llm.generate_model,
            config.embeddings.model
        );

        let (embedder, generator) = OllamaProvider::new(&config.llm, &config.embeddings)?.split();
        let citations = CitationResolvers::from_config(&config.citations)?;

        Self::from_parts(config, Arc::new(embedder), Arc::new(generator), citations).await
    }

    /// Create state from explicit providers
    pub async fn from_parts(
        config: RagConfig,
        embedder: Arc<dyn EmbeddingProvider>,
        generator: Arc<dyn GenerationProvider>,
        citations: CitationResolvers,
    ) -> Result<Self> {
        let store = IndexStore::open(&config.storage.index_dir)?;
        tracing::info!("Index directory: {}", store.root().display());
        let registry = Arc::new(IndexRegistry::new(store));

        if let Some(default) = &config.storage.default_index {
            if let Err(e) = registry.select(default).await {
                tracing::warn!("Default index '{}' unavailable: {}", default, e);
            }
        }

        let rag = RagGenerator::new(&config, Arc::clone(&embedder), Arc::clone(&generator));
        let ingestor = DocumentIngestor::new(&config, Arc::clone(&embedder), Arc::clone(&registry));

        Ok(Self {
            inner: Arc::new(AppStateInner {
                config,
                registry,
                embedder,
                generator,
                rag,
                citations,
                ingestor,
                active_sessions: AtomicUsize::new(0),
            }),
        })
    }

    pub fn config(&self) -> &RagConfig {
        &self.inner.config
    }

    pub fn registry(&self) -> &Arc<IndexRegistry> {
        &self.inner.registry
    }

    pub fn embedder(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.inner.embedder
    }

    pub fn generator(&self) -> &Arc<dyn GenerationProvider> {
        &self.inner.generator
    }

    pub fn rag(&self) -> &RagGenerator {
        &self.inner.rag
    }

    pub fn ingestor(&self) -> &DocumentIngestor {
        &self.inner.ingestor
    }

    /// Bind a new session to the named (or current) index and its citation settings
    pub async fn bind(&self, index: Option<&str>) -> Result<IndexBinding> {
        let (name, index) = self.inner.registry.acquire(index).await?;
        let citations = self.inner.citations.for_index(&name);
        Ok(IndexBinding {
            name,
            index,
            citations,
        })
    }

    /// Count a session until the guard is dropped
    pub fn session_guard(&self) -> SessionGuard {
        self.inner.active_sessions.fetch_add(1, Ordering::SeqCst);
        SessionGuard {
            state: self.clone(),
        }
    }

    pub fn active_sessions(&self) -> usize {
        self.inner.active_sessions.load(Ordering::SeqCst)
    }

    /// Both providers respond
    pub async fn is_ready(&self) -> bool {
        let embedder = self.inner.embedder.health_check().await.unwrap_or(false);
        let generator = self.inner.generator.health_check().await.unwrap_or(false);
        embedder && generator
    }
}

/// Decrements the session count on drop
pub struct SessionGuard {
    state: AppState,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.state
            .inner
            .active_sessions
            .fetch_sub(1, Ordering::SeqCst);
    }
}
