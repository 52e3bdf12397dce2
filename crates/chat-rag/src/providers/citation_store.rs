//! Citation store trait for resolving chunk locators into display records

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{ChunkMetadata, CitationRecord};

/// Trait for looking up enriched citation records by locator fields
///
/// Implementations:
/// - `MetadataCitationStore`: echoes the locator (uploaded documents)
/// - `SqliteCitationStore`: joins the locator against a SQLite table
#[async_trait]
pub trait CitationStore: Send + Sync {
    /// Resolve a locator; `Ok(None)` when no record matches
    async fn lookup(&self, locator: &ChunkMetadata) -> Result<Option<CitationRecord>>;

    /// Get store name for logging
    fn name(&self) -> &str;
}

/// Citation store that returns the chunk's own locator metadata
///
/// Every locator resolves, so no chunk is dropped.
#[derive(Debug, Default, Clone, Copy)]
pub struct MetadataCitationStore;

#[async_trait]
impl CitationStore for MetadataCitationStore {
    async fn lookup(&self, locator: &ChunkMetadata) -> Result<Option<CitationRecord>> {
        let fields = locator
            .iter()
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        Ok(Some(CitationRecord::new(fields)))
    }

    fn name(&self) -> &str {
        "metadata"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_metadata_store_echoes_locator() {
        let mut locator = ChunkMetadata::new();
        locator.insert("source".to_string(), json!("guide.pdf"));
        locator.insert("page".to_string(), json!(4));

        let record = MetadataCitationStore.lookup(&locator).await.unwrap().unwrap();
        assert_eq!(record.get("source"), Some(&json!("guide.pdf")));
        assert_eq!(record.get("page"), Some(&json!(4)));
    }
}
