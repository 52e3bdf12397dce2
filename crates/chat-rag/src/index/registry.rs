//! Named index registry with copy-and-swap binding
//!
//! Sessions acquire an `Arc<VectorIndex>` once at connect time and keep it.
//! Installing or selecting an index only affects sessions created afterwards.
//! Cached indexes that are neither current nor held by a session are dropped
//! on the next install, select or acquire and reloaded from disk on demand.

use dashmap::DashMap;
use parking_lot::RwLock;
use serde::Serialize;
use std::sync::Arc;

use crate::error::{Error, Result};

use super::store::{validate_index_name, IndexStore};
use super::vector_index::VectorIndex;

/// Summary of a known index
#[derive(Debug, Clone, Serialize)]
pub struct IndexSummary {
    pub name: String,
    /// Whether new sessions bind to this index
    pub current: bool,
    /// Whether the index is held in memory
    pub loaded: bool,
}

/// Registry of named indexes backed by an `IndexStore`
pub struct IndexRegistry {
    store: IndexStore,
    cache: DashMap<String, Arc<VectorIndex>>,
    current: RwLock<Option<String>>,
}

impl IndexRegistry {
    pub fn new(store: IndexStore) -> Self {
        Self {
            store,
            cache: DashMap::new(),
            current: RwLock::new(None),
        }
    }

    /// Persist a freshly built index and cache it
    ///
    /// Sessions holding a previous index with the same name keep it.
    pub async fn install(&self, id: &str, index: VectorIndex) -> Result<Arc<VectorIndex>> {
        validate_index_name(id)?;
        let index = Arc::new(index);

        let store = self.store.clone();
        let name = id.to_string();
        let to_save = Arc::clone(&index);
        tokio::task::spawn_blocking(move || store.save(&name, &to_save))
            .await
            .map_err(|e| Error::internal(format!("Index save task failed: {}", e)))??;

        self.cache.insert(id.to_string(), Arc::clone(&index));
        tracing::info!("Installed index '{}' ({} chunks)", id, index.len());
        self.evict_idle(id);
        Ok(index)
    }

    /// Make `id` the index new sessions bind to
    pub async fn select(&self, id: &str) -> Result<()> {
        self.get(id).await?;
        let previous = self.current.write().replace(id.to_string());
        tracing::info!(
            "Current index: {} -> {}",
            previous.as_deref().unwrap_or("(none)"),
            id
        );
        self.evict_idle(id);
        Ok(())
    }

    /// Handle to a named index, loading it from disk on first use
    pub async fn get(&self, id: &str) -> Result<Arc<VectorIndex>> {
        validate_index_name(id)?;
        if let Some(index) = self.cache.get(id) {
            return Ok(Arc::clone(index.value()));
        }

        let store = self.store.clone();
        let name = id.to_string();
        let loaded = tokio::task::spawn_blocking(move || store.load(&name))
            .await
            .map_err(|e| Error::internal(format!("Index load task failed: {}", e)))??;

        // A concurrent install may have won the race; keep whichever is cached
        let entry = self
            .cache
            .entry(id.to_string())
            .or_insert_with(|| Arc::new(loaded));
        Ok(Arc::clone(entry.value()))
    }

    /// Resolve the index for a new session: the named one, or the current one
    pub async fn acquire(&self, id: Option<&str>) -> Result<(String, Arc<VectorIndex>)> {
        let name = match id {
            Some(id) => id.to_string(),
            None => self
                .current()
                .ok_or_else(|| Error::IndexNotFound("no index selected".to_string()))?,
        };
        let index = self.get(&name).await?;
        self.evict_idle(&name);
        Ok((name, index))
    }

    /// Drop cached indexes other than `keep` and the current one that no session holds
    fn evict_idle(&self, keep: &str) {
        let current = self.current();
        self.cache.retain(|name, index| {
            let retained = name == keep
                || current.as_deref() == Some(name.as_str())
                || Arc::strong_count(index) > 1;
            if !retained {
                tracing::debug!("Evicting idle index '{}'", name);
            }
            retained
        });
    }

    /// Identifier new sessions bind to
    pub fn current(&self) -> Option<String> {
        self.current.read().clone()
    }

    /// Every persisted index
    pub fn list(&self) -> Result<Vec<IndexSummary>> {
        let current = self.current();
        Ok(self
            .store
            .list()?
            .into_iter()
            .map(|name| IndexSummary {
                current: current.as_deref() == Some(name.as_str()),
                loaded: self.cache.contains_key(&name),
                name,
            })
            .collect())
    }

    pub fn store(&self) -> &IndexStore {
        &self.store
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Chunk, ChunkMetadata};
    use tempfile::TempDir;

    fn tiny_index(text: &str) -> VectorIndex {
        let chunk = Chunk::new(text, ChunkMetadata::new()).with_embedding(vec![1.0, 0.0]);
        VectorIndex::from_chunks("test-embed", 2, vec![chunk]).unwrap()
    }

    fn registry(dir: &TempDir) -> IndexRegistry {
        IndexRegistry::new(IndexStore::open(dir.path()).unwrap())
    }

    #[tokio::test]
    async fn test_acquire_without_selection() {
        let dir = TempDir::new().unwrap();
        let registry = registry(&dir);
        assert!(matches!(
            registry.acquire(None).await,
            Err(Error::IndexNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_swap_keeps_existing_handles() {
        let dir = TempDir::new().unwrap();
        let registry = registry(&dir);

        registry.install("docs", tiny_index("v1")).await.unwrap();
        registry.select("docs").await.unwrap();
        let (name, held) = registry.acquire(None).await.unwrap();
        assert_eq!(name, "docs");

        registry.install("docs", tiny_index("v2")).await.unwrap();
        let (_, fresh) = registry.acquire(None).await.unwrap();

        assert_eq!(held.chunks()[0].text, "v1");
        assert_eq!(fresh.chunks()[0].text, "v2");
    }

    #[tokio::test]
    async fn test_select_changes_only_new_sessions() {
        let dir = TempDir::new().unwrap();
        let registry = registry(&dir);

        registry.install("a", tiny_index("alpha")).await.unwrap();
        registry.install("b", tiny_index("beta")).await.unwrap();
        registry.select("a").await.unwrap();
        let (_, session_one) = registry.acquire(None).await.unwrap();

        registry.select("b").await.unwrap();
        let (_, session_two) = registry.acquire(None).await.unwrap();

        assert_eq!(session_one.chunks()[0].text, "alpha");
        assert_eq!(session_two.chunks()[0].text, "beta");

        let summaries = registry.list().unwrap();
        assert_eq!(summaries.len(), 2);
        assert!(summaries.iter().any(|s| s.name == "b" && s.current));
    }

    #[tokio::test]
    async fn test_loads_from_disk_on_demand() {
        let dir = TempDir::new().unwrap();
        IndexStore::open(dir.path())
            .unwrap()
            .save("persisted", &tiny_index("on disk"))
            .unwrap();

        let registry = registry(&dir);
        let (_, index) = registry.acquire(Some("persisted")).await.unwrap();
        assert_eq!(index.chunks()[0].text, "on disk");

        assert!(matches!(
            registry.select("missing").await,
            Err(Error::IndexNotFound(_))
        ));
        assert!(registry.current().is_none());
    }

    #[tokio::test]
    async fn test_idle_indexes_are_evicted() {
        let dir = TempDir::new().unwrap();
        let registry = registry(&dir);
        let loaded = |registry: &IndexRegistry, name: &str| {
            registry
                .list()
                .unwrap()
                .into_iter()
                .any(|s| s.name == name && s.loaded)
        };

        registry.install("a", tiny_index("alpha")).await.unwrap();
        registry.install("b", tiny_index("beta")).await.unwrap();
        registry.select("b").await.unwrap();
        assert!(!loaded(&registry, "a"));
        assert!(loaded(&registry, "b"));

        // A session keeps "a" resident while it holds the handle
        let (_, held) = registry.acquire(Some("a")).await.unwrap();
        registry.select("b").await.unwrap();
        assert!(loaded(&registry, "a"));

        drop(held);
        registry.select("b").await.unwrap();
        assert!(!loaded(&registry, "a"));

        // Evicted indexes reload from disk
        let (_, again) = registry.acquire(Some("a")).await.unwrap();
        assert_eq!(again.chunks()[0].text, "alpha");
    }
}
