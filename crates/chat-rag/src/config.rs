//! Configuration for the conversational RAG service

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Environment variable naming a TOML config file
pub const CONFIG_PATH_ENV: &str = "CHAT_RAG_CONFIG";

/// Main service configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RagConfig {
    /// Server configuration
    pub server: ServerConfig,
    /// Ollama/LLM configuration
    pub llm: LlmConfig,
    /// Embedding configuration
    pub embeddings: EmbeddingConfig,
    /// Chunking configuration
    pub chunking: ChunkingConfig,
    /// Retrieval configuration
    pub retrieval: RetrievalConfig,
    /// Conversation configuration
    pub conversation: ConversationConfig,
    /// Index storage configuration
    pub storage: StorageConfig,
    /// Citation resolution configuration
    pub citations: CitationConfig,
}

impl RagConfig {
    /// Load configuration from a TOML file. Missing sections fall back to defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read config {}: {}", path.display(), e))
        })?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(format!("Invalid config: {}", e)))
    }

    /// Write configuration as TOML
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let content = toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, content).map_err(|e| {
            Error::Config(format!("Failed to write config {}: {}", path.display(), e))
        })
    }

    /// Build configuration from `CHAT_RAG_CONFIG` (if set) plus env overrides
    pub fn from_env() -> Result<Self> {
        let config = match std::env::var(CONFIG_PATH_ENV) {
            Ok(path) => Self::load(path)?,
            Err(_) => Self::default(),
        };
        config.with_env_overrides()
    }

    /// Apply `CHAT_RAG_OLLAMA_URL`, `CHAT_RAG_INDEX_DIR` and `CHAT_RAG_PORT`, then validate
    pub fn with_env_overrides(mut self) -> Result<Self> {
        if let Ok(url) = std::env::var("CHAT_RAG_OLLAMA_URL") {
            self.llm.base_url = url;
        }
        if let Ok(dir) = std::env::var("CHAT_RAG_INDEX_DIR") {
            self.storage.index_dir = PathBuf::from(dir);
        }
        if let Ok(port) = std::env::var("CHAT_RAG_PORT") {
            self.server.port = port
                .parse()
                .map_err(|e| Error::Config(format!("Invalid CHAT_RAG_PORT '{}': {}", port, e)))?;
        }

        self.validate()?;
        Ok(self)
    }

    /// Check cross-field constraints
    pub fn validate(&self) -> Result<()> {
        if self.chunking.enabled && self.chunking.chunk_overlap >= self.chunking.chunk_size {
            return Err(Error::Config(format!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                self.chunking.chunk_overlap, self.chunking.chunk_size
            )));
        }
        if self.embeddings.dimensions == 0 {
            return Err(Error::Config("embeddings.dimensions must be positive".to_string()));
        }
        if self.conversation.history_window == 0 {
            return Err(Error::Config(
                "conversation.history_window must be at least 1".to_string(),
            ));
        }

        self.citations.validate_backend("citations")?;
        for (index, overrides) in &self.citations.indexes {
            let section = format!("citations.indexes.{}", index);
            if !overrides.indexes.is_empty() {
                return Err(Error::Config(format!("{} cannot nest index overrides", section)));
            }
            overrides.validate_backend(&section)?;
        }
        Ok(())
    }
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host address
    pub host: String,
    /// Port number
    pub port: u16,
    /// Enable CORS
    pub enable_cors: bool,
    /// Maximum upload size in bytes (default: 50MB)
    pub max_upload_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 9000,
            enable_cors: true,
            max_upload_size: 50 * 1024 * 1024,
        }
    }
}

/// LLM (Ollama) configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Ollama base URL
    pub base_url: String,
    /// Generation model name
    pub generate_model: String,
    /// Temperature for answer generation
    pub temperature: f32,
    /// Temperature for question condensing (0 keeps rewrites stable)
    pub rewrite_temperature: f32,
    /// Timeout for a single provider call, and for the gap between streamed tokens
    pub timeout_secs: u64,
    /// Number of retries for failed non-streaming requests
    pub max_retries: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".to_string(),
            generate_model: "llama3.2:3b".to_string(),
            temperature: 0.3,
            rewrite_temperature: 0.0,
            timeout_secs: 120,
            max_retries: 2,
        }
    }
}

/// Embedding configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// Embedding model name
    pub model: String,
    /// Embedding dimensions (768 for nomic-embed-text)
    pub dimensions: usize,
    /// Batch size for embedding generation during ingestion
    pub batch_size: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: "nomic-embed-text".to_string(),
            dimensions: 768,
            batch_size: 32,
        }
    }
}

/// Text chunking configuration
///
/// Splitting is off by default: each loaded segment (a PDF page, a CSV row)
/// becomes one chunk verbatim.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Split long segments into overlapping chunks
    pub enabled: bool,
    /// Maximum characters per chunk
    pub chunk_size: usize,
    /// Characters shared between adjacent chunks
    pub chunk_overlap: usize,
    /// CSV column holding the text of each row
    pub csv_content_column: Option<String>,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            chunk_size: 1000,
            chunk_overlap: 200,
            csv_content_column: None,
        }
    }
}

/// Retrieval configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Number of chunks to retrieve per question
    pub top_k: usize,
    /// Results below this cosine similarity are dropped
    pub min_similarity: f32,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 4,
            min_similarity: 0.0,
        }
    }
}

/// Conversation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversationConfig {
    /// Number of most recent turns rendered into prompts
    pub history_window: usize,
    /// Capacity of the per-connection event channel
    pub event_buffer: usize,
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            history_window: 6,
            event_buffer: 256,
        }
    }
}

/// Index storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding persisted indexes (one JSON file per identifier)
    pub index_dir: PathBuf,
    /// Index bound to new sessions at startup
    pub default_index: Option<String>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        let index_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("chat-rag")
            .join("indexes");

        Self {
            index_dir,
            default_index: None,
        }
    }
}

/// Citation store selection
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CitationBackend {
    /// Echo the chunk's locator metadata as the citation
    #[default]
    Metadata,
    /// Join locator fields against a SQLite table
    Sqlite,
}

/// Citation resolution configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CitationConfig {
    /// Store used to resolve chunk locators
    pub backend: CitationBackend,
    /// Metadata fields forming the join key (empty = all metadata)
    pub key_fields: Vec<String>,
    /// Drop repeated citations for the same locator
    pub deduplicate: bool,
    /// SQLite lookup table (required when backend = sqlite)
    pub sqlite: Option<SqliteCitationConfig>,
    /// Per-index overrides; indexes not listed use the settings above
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub indexes: BTreeMap<String, CitationConfig>,
}

impl CitationConfig {
    /// Settings that apply to one index
    pub fn for_index(&self, index: &str) -> &CitationConfig {
        self.indexes.get(index).unwrap_or(self)
    }

    fn validate_backend(&self, section: &str) -> Result<()> {
        if let CitationBackend::Sqlite = self.backend {
            let sqlite = self.sqlite.as_ref().ok_or_else(|| {
                Error::Config(format!("{}.backend = sqlite requires [{}.sqlite]", section, section))
            })?;
            if self.key_fields.is_empty() {
                return Err(Error::Config(format!(
                    "{}.key_fields must name the lookup columns",
                    section
                )));
            }
            if sqlite.columns.is_empty() {
                return Err(Error::Config(format!("{}.sqlite.columns is empty", section)));
            }
        }
        Ok(())
    }
}

/// SQLite lookup table description
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SqliteCitationConfig {
    /// Database file
    pub path: PathBuf,
    /// Table name
    pub table: String,
    /// Columns returned as citation fields
    pub columns: Vec<String>,
}
