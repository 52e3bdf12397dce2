//! Conversational answer generation: prompts, rewriting, streaming and citations

pub mod citation;
pub mod generator;
pub mod ollama;
pub mod prompt;
pub mod rewriter;

#[cfg(test)]
pub(crate) mod testing;

pub use citation::{CitationResolver, CitationResolvers};
pub use generator::{Answer, IndexBinding, RagGenerator, RequestPhase, GENERIC_ERROR_MESSAGE};
pub use ollama::OllamaClient;
pub use prompt::PromptBuilder;
pub use rewriter::{QueryRewriter, RewriteOutcome};
