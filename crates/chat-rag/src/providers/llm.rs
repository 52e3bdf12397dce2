//! Generation provider trait for question condensing and streamed answers

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::error::Result;

/// Lazy, finite, non-restartable sequence of answer fragments
pub type TokenStream = BoxStream<'static, Result<String>>;

/// Trait for LLM text generation
///
/// Implementations:
/// - `OllamaGenerator`: Local Ollama server (llama3.2, phi3, etc.)
#[async_trait]
pub trait GenerationProvider: Send + Sync {
    /// Generate a complete response for a prompt
    async fn generate(&self, prompt: &str, temperature: f32) -> Result<String>;

    /// Start generating a response, yielding tokens as they are produced
    async fn generate_stream(&self, prompt: &str, temperature: f32) -> Result<TokenStream>;

    /// Check if the provider is healthy and available
    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }

    /// Get provider name for logging
    fn name(&self) -> &str;

    /// Get the model being used
    fn model(&self) -> &str;
}
