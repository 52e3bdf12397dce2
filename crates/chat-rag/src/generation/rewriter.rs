//! Follow-up question condensing

use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

use crate::config::RagConfig;
use crate::conversation::ConversationState;
use crate::error::Error;
use crate::providers::GenerationProvider;

use super::prompt::PromptBuilder;

/// Result of condensing a question against the conversation
#[derive(Debug)]
pub enum RewriteOutcome {
    /// No history: the question already stands alone
    Unchanged(String),
    /// The model produced a standalone query
    Rewritten(String),
    /// The model failed; the raw question is used
    Fallback { query: String, error: Error },
}

impl RewriteOutcome {
    /// Query to embed and search with
    pub fn into_query(self) -> String {
        match self {
            Self::Unchanged(query) | Self::Rewritten(query) | Self::Fallback { query, .. } => query,
        }
    }
}

/// Condenses follow-up questions into standalone retrieval queries
pub struct QueryRewriter {
    generator: Arc<dyn GenerationProvider>,
    temperature: f32,
    call_timeout: Duration,
    history_window: usize,
}

impl QueryRewriter {
    pub fn new(generator: Arc<dyn GenerationProvider>, config: &RagConfig) -> Self {
        Self {
            generator,
            temperature: config.llm.rewrite_temperature,
            call_timeout: Duration::from_secs(config.llm.timeout_secs),
            history_window: config.conversation.history_window,
        }
    }

    /// Override the per-call timeout
    pub fn with_timeout(mut self, call_timeout: Duration) -> Self {
        self.call_timeout = call_timeout;
        self
    }

    /// Standalone form of `question`; never fails
    pub async fn rewrite(&self, state: &ConversationState, question: &str) -> RewriteOutcome {
        let history = state.recent(self.history_window);
        if history.is_empty() {
            return RewriteOutcome::Unchanged(question.to_string());
        }

        let prompt = PromptBuilder::build_condense_prompt(history, question);
        let result = match timeout(
            self.call_timeout,
            self.generator.generate(&prompt, self.temperature),
        )
        .await
        {
            Ok(Ok(reply)) => match clean_reply(&reply) {
                Some(query) => Ok(query),
                None => Err(Error::generation("rewrite returned an empty query")),
            },
            Ok(Err(e)) => Err(e),
            Err(_) => Err(Error::generation(format!(
                "rewrite timed out after {:?}",
                self.call_timeout
            ))),
        };

        match result {
            Ok(query) => {
                tracing::debug!("Rewrote {:?} -> {:?}", question, query);
                RewriteOutcome::Rewritten(query)
            }
            Err(error) => {
                tracing::warn!("Rewrite failed, using the raw question: {}", error);
                RewriteOutcome::Fallback {
                    query: question.to_string(),
                    error,
                }
            }
        }
    }
}

/// Trim whitespace, a leading label and enclosing quotes from a model reply
fn clean_reply(reply: &str) -> Option<String> {
    let mut text = reply.trim();
    if let Some(rest) = text.strip_prefix("Standalone question:") {
        text = rest.trim();
    }
    let text = text
        .strip_prefix('"')
        .and_then(|t| t.strip_suffix('"'))
        .unwrap_or(text)
        .trim();

    (!text.is_empty()).then(|| text.to_string())
}
