//! Provider abstractions for embeddings, generation, and citation lookup
//!
//! Trait-based seams keep the pipeline independent of the Ollama and SQLite
//! backends and let tests substitute in-memory fakes.

pub mod citation_store;
pub mod embedding;
pub mod llm;
pub mod ollama;

pub use citation_store::{CitationStore, MetadataCitationStore};
pub use embedding::EmbeddingProvider;
pub use llm::{GenerationProvider, TokenStream};
pub use ollama::{OllamaEmbedder, OllamaGenerator, OllamaProvider};
