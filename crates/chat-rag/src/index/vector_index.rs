//! Immutable in-memory vector index with brute-force cosine search

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::types::{Chunk, ScoredChunk};

/// Where an index's content came from
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IndexProvenance {
    /// Source file names, in ingestion order
    pub sources: Vec<String>,
    /// SHA-256 over the raw source bytes (hex)
    pub content_hash: String,
    /// Build time
    pub created_at: DateTime<Utc>,
}

impl Default for IndexProvenance {
    fn default() -> Self {
        Self {
            sources: Vec::new(),
            content_hash: String::new(),
            created_at: Utc::now(),
        }
    }
}

/// On-disk form of an index
#[derive(Deserialize)]
struct IndexFile {
    model: String,
    dimensions: usize,
    #[serde(default)]
    provenance: IndexProvenance,
    chunks: Vec<Chunk>,
}

impl TryFrom<IndexFile> for VectorIndex {
    type Error = Error;

    fn try_from(file: IndexFile) -> Result<Self> {
        Ok(Self::from_chunks(file.model, file.dimensions, file.chunks)?
            .with_provenance(file.provenance))
    }
}

/// Chunks plus embeddings for one corpus
///
/// Never mutated after construction; sessions share it through `Arc`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "IndexFile")]
pub struct VectorIndex {
    model: String,
    dimensions: usize,
    provenance: IndexProvenance,
    chunks: Vec<Chunk>,
    /// L2 norm per chunk embedding
    #[serde(skip)]
    norms: Vec<f32>,
}

impl VectorIndex {
    /// Build an index, checking every embedding against `dimensions`
    pub fn from_chunks(
        model: impl Into<String>,
        dimensions: usize,
        chunks: Vec<Chunk>,
    ) -> Result<Self> {
        let model = model.into();
        if dimensions == 0 {
            return Err(Error::ingestion(&model, "index dimensionality must be positive"));
        }

        if let Some(bad) = chunks.iter().find(|c| c.embedding.len() != dimensions) {
            return Err(Error::ingestion(
                bad.source().unwrap_or(&model),
                format!(
                    "chunk {} has {} dimensions, index expects {}",
                    bad.id,
                    bad.embedding.len(),
                    dimensions
                ),
            ));
        }

        let norms = chunks.iter().map(|c| l2_norm(&c.embedding)).collect();

        Ok(Self {
            model,
            dimensions,
            provenance: IndexProvenance::default(),
            chunks,
            norms,
        })
    }

    /// Attach provenance
    pub fn with_provenance(mut self, provenance: IndexProvenance) -> Self {
        self.provenance = provenance;
        self
    }

    /// Top `k` chunks by cosine similarity, highest first
    ///
    /// Equal scores keep insertion order, so results are deterministic.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<ScoredChunk>> {
        if query.len() != self.dimensions {
            return Err(Error::retrieval(format!(
                "query has {} dimensions, index expects {}",
                query.len(),
                self.dimensions
            )));
        }
        if k == 0 || self.chunks.is_empty() {
            return Ok(Vec::new());
        }

        let query_norm = l2_norm(query);
        let mut scored: Vec<(usize, f32)> = self
            .chunks
            .iter()
            .zip(&self.norms)
            .enumerate()
            .map(|(i, (chunk, norm))| {
                let score = cosine(query, query_norm, &chunk.embedding, *norm);
                (i, if score.is_nan() { f32::NEG_INFINITY } else { score })
            })
            .collect();

        // sort_by is stable
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));
        scored.truncate(k);

        Ok(scored
            .into_iter()
            .map(|(i, score)| ScoredChunk {
                chunk: self.chunks[i].clone(),
                score,
            })
            .collect())
    }

    /// Embedding model the index was built with
    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub fn provenance(&self) -> &IndexProvenance {
        &self.provenance
    }

    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }
}

fn l2_norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

fn cosine(a: &[f32], norm_a: f32, b: &[f32], norm_b: f32) -> f32 {
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    dot / (norm_a * norm_b)
}
