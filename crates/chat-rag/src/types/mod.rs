//! Core types for the conversational RAG service

pub mod chunk;
pub mod citation;
pub mod event;

pub use chunk::{Chunk, ChunkMetadata, ScoredChunk};
pub use citation::CitationRecord;
pub use event::{ChatResponse, MessageType, Sender, StreamEvent};
