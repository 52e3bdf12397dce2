//! Ingestion orchestration: load, chunk, embed, build and install an index

use serde::Serialize;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use walkdir::WalkDir;

use crate::config::RagConfig;
use crate::error::{Error, Result};
use crate::index::{validate_index_name, IndexProvenance, IndexRegistry, VectorIndex};
use crate::providers::EmbeddingProvider;
use crate::types::Chunk;

use super::chunker::Chunker;
use super::parser::{DocumentLoader, SourceFormat};

/// Outcome of one ingestion run
#[derive(Debug, Clone, Serialize)]
pub struct IngestReport {
    /// Identifier the index was installed under
    pub index: String,
    /// Source file names, in ingestion order
    pub sources: Vec<String>,
    /// Number of chunks in the new index
    pub chunks: usize,
    /// SHA-256 over all source bytes
    pub content_hash: String,
    /// Wall-clock time
    pub elapsed_ms: u64,
}

/// Builds vector indexes from documents and installs them in the registry
pub struct DocumentIngestor {
    loader: DocumentLoader,
    chunker: Chunker,
    embedder: Arc<dyn EmbeddingProvider>,
    registry: Arc<IndexRegistry>,
    batch_size: usize,
}

impl DocumentIngestor {
    pub fn new(
        config: &RagConfig,
        embedder: Arc<dyn EmbeddingProvider>,
        registry: Arc<IndexRegistry>,
    ) -> Self {
        Self {
            loader: DocumentLoader::new(&config.chunking),
            chunker: Chunker::new(&config.chunking),
            embedder,
            registry,
            batch_size: config.embeddings.batch_size.max(1),
        }
    }

    /// Ingest one in-memory document (e.g. an upload) into `index_id`
    pub async fn ingest_bytes(
        &self,
        index_id: &str,
        filename: &str,
        data: Vec<u8>,
    ) -> Result<IngestReport> {
        self.ingest_sources(index_id, vec![(filename.to_string(), data)])
            .await
    }

    /// Ingest a file, or every supported file under a directory
    pub async fn ingest_path(&self, index_id: &str, path: &Path) -> Result<IngestReport> {
        if path.is_dir() {
            return self.ingest_dir(index_id, path).await;
        }

        let name = file_name(path);
        let data = tokio::fs::read(path)
            .await
            .map_err(|e| Error::ingestion(&name, format!("cannot read {}: {}", path.display(), e)))?;
        self.ingest_sources(index_id, vec![(name, data)]).await
    }

    /// Ingest every supported file under `dir` into one index
    pub async fn ingest_dir(&self, index_id: &str, dir: &Path) -> Result<IngestReport> {
        let files = supported_files(dir);
        if files.is_empty() {
            return Err(Error::ingestion(
                dir.display().to_string(),
                "directory contains no supported documents",
            ));
        }

        let mut sources = Vec::with_capacity(files.len());
        for path in files {
            let name = file_name(&path);
            let data = tokio::fs::read(&path).await.map_err(|e| {
                Error::ingestion(&name, format!("cannot read {}: {}", path.display(), e))
            })?;
            sources.push((name, data));
        }

        self.ingest_sources(index_id, sources).await
    }

    async fn ingest_sources(
        &self,
        index_id: &str,
        sources: Vec<(String, Vec<u8>)>,
    ) -> Result<IngestReport> {
        validate_index_name(index_id)?;
        let start = Instant::now();
        tracing::info!("Ingesting {} source(s) into index '{}'", sources.len(), index_id);

        let index = self.build_index(sources).await?;
        let report = IngestReport {
            index: index_id.to_string(),
            sources: index.provenance().sources.clone(),
            chunks: index.len(),
            content_hash: index.provenance().content_hash.clone(),
            elapsed_ms: start.elapsed().as_millis() as u64,
        };

        self.registry.install(index_id, index).await?;

        tracing::info!(
            "Index '{}' built: {} chunks from {} source(s) in {}ms",
            index_id,
            report.chunks,
            report.sources.len(),
            report.elapsed_ms
        );
        Ok(report)
    }

    /// Load, chunk and embed sources into a new (not yet installed) index
    pub async fn build_index(&self, sources: Vec<(String, Vec<u8>)>) -> Result<VectorIndex> {
        let loader = self.loader.clone();
        let loaded = tokio::task::spawn_blocking(move || {
            sources
                .iter()
                .map(|(name, data)| loader.load(name, data))
                .collect::<Result<Vec<_>>>()
        })
        .await
        .map_err(|e| Error::internal(format!("Document loading task failed: {}", e)))??;

        // Index hash covers every source hash in load order
        let mut hasher = Sha256::new();
        for source in &loaded {
            hasher.update(source.content_hash.as_bytes());
        }
        let content_hash = hex::encode(hasher.finalize());

        let source_names: Vec<String> = loaded.iter().map(|l| l.name.clone()).collect();
        let segments = loaded.into_iter().flat_map(|l| l.segments).collect();
        let chunks = self.chunker.chunk_segments(segments);

        let chunks = self.embed_chunks(chunks).await?;

        let index = VectorIndex::from_chunks(
            self.embedder.model(),
            self.embedder.dimensions(),
            chunks,
        )?
        .with_provenance(IndexProvenance {
            sources: source_names,
            content_hash,
            ..Default::default()
        });

        Ok(index)
    }

    async fn embed_chunks(&self, chunks: Vec<Chunk>) -> Result<Vec<Chunk>> {
        let total = chunks.len();
        let mut embedded = Vec::with_capacity(total);
        let mut pending = chunks.into_iter().peekable();

        while pending.peek().is_some() {
            let batch: Vec<Chunk> = pending.by_ref().take(self.batch_size).collect();
            let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
            let embeddings = self.embedder.embed_batch(&texts).await?;

            if embeddings.len() != batch.len() {
                return Err(Error::embedding(format!(
                    "{} returned {} embeddings for {} texts",
                    self.embedder.name(),
                    embeddings.len(),
                    batch.len()
                )));
            }

            embedded.extend(
                batch
                    .into_iter()
                    .zip(embeddings)
                    .map(|(chunk, embedding)| chunk.with_embedding(embedding)),
            );
            tracing::debug!("Embedded {}/{} chunks", embedded.len(), total);
        }

        Ok(embedded)
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Supported files under `dir`, sorted by path for a stable chunk order
fn supported_files(dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(dir)
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                tracing::warn!("Skipping unreadable entry: {}", e);
                None
            }
        })
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| {
            let supported = SourceFormat::from_filename(&file_name(path)).is_some();
            if !supported {
                tracing::debug!("Skipping unsupported file {}", path.display());
            }
            supported
        })
        .collect();
    files.sort();
    files
}
