//! chat-rag: conversational retrieval-augmented question answering
//!
//! Documents are ingested into named vector indexes. Clients chat over a
//! websocket; each question is condensed against the session's history,
//! answered from retrieved passages with tokens streamed as they are
//! generated, and closed with citations resolved from a metadata store.

pub mod config;
pub mod conversation;
pub mod error;
pub mod generation;
pub mod index;
pub mod ingestion;
pub mod providers;
pub mod server;
pub mod storage;
pub mod types;

pub use config::RagConfig;
pub use conversation::{ConversationState, ConversationTurn};
pub use error::{Error, Result};
pub use generation::{CitationResolver, RagGenerator, RequestPhase};
pub use index::{IndexRegistry, IndexStore, VectorIndex};
pub use ingestion::DocumentIngestor;
pub use types::{Chunk, ChunkMetadata, CitationRecord, ScoredChunk, StreamEvent};
