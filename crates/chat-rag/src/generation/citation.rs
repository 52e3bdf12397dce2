//! Citation resolution: retrieved chunks to enriched display records

use std::collections::HashMap;
use std::sync::Arc;

use crate::config::{CitationBackend, CitationConfig};
use crate::error::{Error, Result};
use crate::providers::{CitationStore, MetadataCitationStore};
use crate::storage::SqliteCitationStore;
use crate::types::{Chunk, ChunkMetadata, CitationRecord, ScoredChunk};

/// Resolves retrieved chunks against a citation store
pub struct CitationResolver {
    store: Arc<dyn CitationStore>,
    /// Locator fields forming the join key; empty means all metadata
    key_fields: Vec<String>,
    deduplicate: bool,
}

impl CitationResolver {
    pub fn new(store: Arc<dyn CitationStore>, config: &CitationConfig) -> Self {
        Self {
            store,
            key_fields: config.key_fields.clone(),
            deduplicate: config.deduplicate,
        }
    }

    /// Build the resolver and its store from configuration
    pub fn from_config(config: &CitationConfig) -> Result<Self> {
        let store: Arc<dyn CitationStore> = match config.backend {
            CitationBackend::Metadata => Arc::new(MetadataCitationStore),
            CitationBackend::Sqlite => {
                let sqlite = config.sqlite.as_ref().ok_or_else(|| {
                    Error::Config("citations.backend = sqlite requires [citations.sqlite]".to_string())
                })?;
                Arc::new(SqliteCitationStore::open(sqlite, &config.key_fields)?)
            }
        };

        tracing::info!("Citation store: {}", store.name());
        Ok(Self::new(store, config))
    }

    /// Locator subset of a chunk's metadata; `None` if a key field is missing
    pub fn locator(&self, chunk: &Chunk) -> Option<ChunkMetadata> {
        if self.key_fields.is_empty() {
            return Some(chunk.metadata.clone());
        }

        self.key_fields
            .iter()
            .map(|field| {
                chunk
                    .metadata
                    .get(field)
                    .map(|value| (field.clone(), value.clone()))
            })
            .collect()
    }

    /// One record per resolvable chunk, in retrieval order
    ///
    /// Chunks without a matching record are omitted. Store failures are
    /// logged and count as not found.
    pub async fn resolve(&self, results: &[ScoredChunk]) -> Vec<CitationRecord> {
        let mut records = Vec::with_capacity(results.len());
        let mut seen: Vec<ChunkMetadata> = Vec::new();

        for result in results {
            let Some(locator) = self.locator(&result.chunk) else {
                tracing::warn!(
                    "Chunk {} ({}) lacks citation key fields {:?}",
                    result.chunk.id,
                    result.chunk.locator_label(),
                    self.key_fields
                );
                continue;
            };

            if self.deduplicate {
                if seen.contains(&locator) {
                    continue;
                }
                seen.push(locator.clone());
            }

            match self.store.lookup(&locator).await {
                Ok(Some(record)) => records.push(record),
                Ok(None) => {
                    tracing::warn!("No citation record for {:?}", locator);
                }
                Err(e) => {
                    tracing::warn!("Citation lookup failed for {:?}: {}", locator, e);
                }
            }
        }

        records
    }
}

/// Citation resolvers per index, falling back to the default settings
#[derive(Clone)]
pub struct CitationResolvers {
    default: Arc<CitationResolver>,
    by_index: HashMap<String, Arc<CitationResolver>>,
}

impl CitationResolvers {
    /// The same resolver for every index
    pub fn uniform(resolver: CitationResolver) -> Self {
        Self {
            default: Arc::new(resolver),
            by_index: HashMap::new(),
        }
    }

    /// Open every configured store up front so a bad override fails at startup
    pub fn from_config(config: &CitationConfig) -> Result<Self> {
        let mut by_index = HashMap::new();
        for (index, overrides) in &config.indexes {
            tracing::info!("Citations for index '{}':", index);
            by_index.insert(index.clone(), Arc::new(CitationResolver::from_config(overrides)?));
        }

        Ok(Self {
            default: Arc::new(CitationResolver::from_config(config)?),
            by_index,
        })
    }

    /// Resolver for sessions bound to `index`
    pub fn for_index(&self, index: &str) -> Arc<CitationResolver> {
        Arc::clone(self.by_index.get(index).unwrap_or(&self.default))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SqliteCitationConfig;
    use async_trait::async_trait;
    use rusqlite::Connection;
    use serde_json::{json, Map};
    use tempfile::TempDir;

    /// Knows verses 2:47 and 2:49; 2:48 is missing and 9:9 errors
    struct VerseStore;

    #[async_trait]
    impl CitationStore for VerseStore {
        async fn lookup(&self, locator: &ChunkMetadata) -> Result<Option<CitationRecord>> {
            let chapter = locator.get("Chapter").and_then(|v| v.as_i64());
            let verse = locator.get("Verse").and_then(|v| v.as_i64());
            match (chapter, verse) {
                (Some(9), Some(9)) => Err(Error::internal("store offline")),
                (Some(2), Some(v)) if v == 47 || v == 49 => {
                    let mut fields = Map::new();
                    fields.insert("Chapter".to_string(), json!(2));
                    fields.insert("Verse".to_string(), json!(v));
                    Ok(Some(CitationRecord::new(fields)))
                }
                _ => Ok(None),
            }
        }

        fn name(&self) -> &str {
            "verses"
        }
    }

    fn verse(chapter: i64, verse: i64) -> ScoredChunk {
        let mut metadata = ChunkMetadata::new();
        metadata.insert("Chapter".to_string(), json!(chapter));
        metadata.insert("Verse".to_string(), json!(verse));
        metadata.insert("row".to_string(), json!(verse));
        ScoredChunk {
            chunk: Chunk::new(format!("verse {}:{}", chapter, verse), metadata),
            score: 0.5,
        }
    }

    fn resolver(deduplicate: bool) -> CitationResolver {
        CitationResolver::new(
            Arc::new(VerseStore),
            &CitationConfig {
                key_fields: vec!["Chapter".to_string(), "Verse".to_string()],
                deduplicate,
                ..Default::default()
            },
        )
    }

    #[tokio::test]
    async fn test_unresolved_chunk_dropped_order_kept() {
        let records = resolver(false)
            .resolve(&[verse(2, 47), verse(2, 48), verse(2, 49)])
            .await;

        let verses: Vec<_> = records.iter().map(|r| r.get("Verse").cloned()).collect();
        assert_eq!(verses, vec![Some(json!(47)), Some(json!(49))]);
    }

    #[tokio::test]
    async fn test_store_failure_treated_as_missing() {
        let records = resolver(false).resolve(&[verse(9, 9), verse(2, 47)]).await;
        assert_eq!(records.len(), 1);
    }

    #[tokio::test]
    async fn test_missing_key_field_omitted() {
        let mut partial = verse(2, 47);
        partial.chunk.metadata.remove("Verse");
        assert!(resolver(false).resolve(&[partial]).await.is_empty());
    }

    #[tokio::test]
    async fn test_duplicates_kept_unless_configured() {
        let results = [verse(2, 47), verse(2, 47)];
        assert_eq!(resolver(false).resolve(&results).await.len(), 2);
        assert_eq!(resolver(true).resolve(&results).await.len(), 1);
    }

    #[tokio::test]
    async fn test_metadata_backend_echoes_whole_metadata() {
        let resolver = CitationResolver::from_config(&CitationConfig::default()).unwrap();
        let mut metadata = ChunkMetadata::new();
        metadata.insert("source".to_string(), json!("sky.pdf"));
        metadata.insert("page".to_string(), json!(0));
        let results = [ScoredChunk {
            chunk: Chunk::new("The sky is blue.", metadata),
            score: 1.0,
        }];

        let records = resolver.resolve(&results).await;
        assert_eq!(
            serde_json::to_value(&records).unwrap(),
            json!([{"page": 0, "source": "sky.pdf"}])
        );
    }

    #[tokio::test]
    async fn test_sqlite_and_uploaded_indexes_cite_side_by_side() {
        let dir = TempDir::new().unwrap();
        let db = dir.path().join("verses.db");
        Connection::open(&db)
            .unwrap()
            .execute_batch(
                "CREATE TABLE gita (Chapter INTEGER, Verse INTEGER, Translation TEXT);
                 INSERT INTO gita VALUES (2, 47, 'You have a right to action alone.');",
            )
            .unwrap();

        let mut config = CitationConfig::default();
        config.indexes.insert(
            "gita".to_string(),
            CitationConfig {
                backend: CitationBackend::Sqlite,
                key_fields: vec!["Chapter".to_string(), "Verse".to_string()],
                sqlite: Some(SqliteCitationConfig {
                    path: db,
                    table: "gita".to_string(),
                    columns: vec!["Verse".to_string(), "Translation".to_string()],
                }),
                ..Default::default()
            },
        );
        let resolvers = CitationResolvers::from_config(&config).unwrap();

        let gita = resolvers.for_index("gita").resolve(&[verse(2, 47)]).await;
        assert_eq!(
            serde_json::to_value(&gita).unwrap(),
            json!([{"Verse": 47, "Translation": "You have a right to action alone."}])
        );

        let mut metadata = ChunkMetadata::new();
        metadata.insert("source".to_string(), json!("report.pdf"));
        metadata.insert("page".to_string(), json!(3));
        let page = ScoredChunk {
            chunk: Chunk::new("Revenue grew.", metadata),
            score: 0.9,
        };
        let uploaded = resolvers.for_index("report").resolve(&[page]).await;
        assert_eq!(
            serde_json::to_value(&uploaded).unwrap(),
            json!([{"page": 3, "source": "report.pdf"}])
        );
    }
}
