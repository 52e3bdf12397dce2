//! Document ingestion: loading, optional chunking, embedding and indexing

mod chunker;
mod ingestor;
mod parser;

pub use chunker::{Chunker, TextChunker};
pub use ingestor::{DocumentIngestor, IngestReport};
pub use parser::{hash_content, normalize_text, DocumentLoader, LoadedSource, Segment, SourceFormat};
