//! Chunk type with locator metadata for citations

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Locator metadata attached to a chunk (e.g. `source`, `page`, `Chapter`, `Verse`)
pub type ChunkMetadata = BTreeMap<String, serde_json::Value>;

/// Metadata key for the originating file name
pub const SOURCE_KEY: &str = "source";
/// Metadata key for the 0-based PDF page
pub const PAGE_KEY: &str = "page";
/// Metadata key for the 0-based CSV row
pub const ROW_KEY: &str = "row";
/// Metadata key for the piece index when a segment was split
pub const CHUNK_KEY: &str = "chunk";

/// A unit of retrievable text
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Chunk {
    /// Unique chunk ID
    pub id: Uuid,
    /// Text content
    pub text: String,
    /// Embedding vector
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub embedding: Vec<f32>,
    /// Locator metadata
    #[serde(default)]
    pub metadata: ChunkMetadata,
}

impl Chunk {
    /// Create a chunk without an embedding
    pub fn new(text: impl Into<String>, metadata: ChunkMetadata) -> Self {
        Self {
            id: Uuid::new_v4(),
            text: text.into(),
            embedding: Vec::new(),
            metadata,
        }
    }

    /// Attach an embedding
    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = embedding;
        self
    }

    /// Originating file name, if recorded
    pub fn source(&self) -> Option<&str> {
        self.metadata.get(SOURCE_KEY).and_then(|v| v.as_str())
    }

    /// Short label for prompts and logs: `file.pdf, page 3`
    pub fn locator_label(&self) -> String {
        let mut parts = vec![self.source().unwrap_or("unknown").to_string()];

        if let Some(page) = self.metadata.get(PAGE_KEY).and_then(|v| v.as_u64()) {
            parts.push(format!("page {}", page + 1));
        }

        if let Some(row) = self.metadata.get(ROW_KEY).and_then(|v| v.as_u64()) {
            parts.push(format!("row {}", row + 1));
        }

        parts.join(", ")
    }
}

/// A chunk returned by similarity search
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    /// The matched chunk
    pub chunk: Chunk,
    /// Cosine similarity, higher is more similar
    pub score: f32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_locator_label() {
        let mut metadata = ChunkMetadata::new();
        metadata.insert(SOURCE_KEY.to_string(), json!("report.pdf"));
        metadata.insert(PAGE_KEY.to_string(), json!(2));

        let chunk = Chunk::new("text", metadata);
        assert_eq!(chunk.locator_label(), "report.pdf, page 3");
    }

    #[test]
    fn test_label_without_source() {
        let chunk = Chunk::new("text", ChunkMetadata::new());
        assert_eq!(chunk.locator_label(), "unknown");
    }
}
