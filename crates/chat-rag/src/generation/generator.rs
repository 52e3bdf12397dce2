//! Retrieval-augmented answer pipeline for one question
//!
//! Rewrite, retrieve, stream, resolve citations, then record the turn.
//! The conversation is only touched after the answer completes, so a
//! failed or cancelled request leaves it unchanged.

use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;

use crate::config::RagConfig;
use crate::conversation::{ConversationState, ConversationTurn};
use crate::error::{Error, Result};
use crate::index::VectorIndex;
use crate::providers::{EmbeddingProvider, GenerationProvider};
use crate::types::{CitationRecord, ScoredChunk, StreamEvent};

use super::citation::CitationResolver;
use super::prompt::PromptBuilder;
use super::rewriter::{QueryRewriter, RewriteOutcome};

/// Message sent to the client when a request fails
pub const GENERIC_ERROR_MESSAGE: &str = "Sorry, something went wrong. Try again.";

/// Lifecycle of one request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestPhase {
    Idle,
    Rewriting,
    Retrieving,
    Generating,
    Completed,
    Failed,
}

impl RequestPhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Forward one step, or to `Failed` from any non-terminal phase
    pub fn can_transition_to(self, next: Self) -> bool {
        use RequestPhase::*;
        match (self, next) {
            (from, Failed) => !from.is_terminal(),
            (Idle, Rewriting)
            | (Rewriting, Retrieving)
            | (Retrieving, Generating)
            | (Generating, Completed) => true,
            _ => false,
        }
    }
}

/// Enforces legal phase transitions
#[derive(Debug)]
struct PhaseTracker {
    phase: RequestPhase,
}

impl PhaseTracker {
    fn new() -> Self {
        Self {
            phase: RequestPhase::Idle,
        }
    }

    fn advance(&mut self, next: RequestPhase) -> Result<()> {
        if !self.phase.can_transition_to(next) {
            return Err(Error::internal(format!(
                "illegal request transition {:?} -> {:?}",
                self.phase, next
            )));
        }
        tracing::debug!("Request phase {:?} -> {:?}", self.phase, next);
        self.phase = next;
        Ok(())
    }
}

/// Index and citation settings a session answers from
#[derive(Clone)]
pub struct IndexBinding {
    pub name: String,
    pub index: Arc<VectorIndex>,
    pub citations: Arc<CitationResolver>,
}

/// A completed answer
#[derive(Debug, Clone)]
pub struct Answer {
    /// Query used for retrieval (rewritten or raw)
    pub standalone_query: String,
    /// Full answer text
    pub text: String,
    /// Resolved citations, in retrieval order
    pub sources: Vec<CitationRecord>,
    /// Final phase, always `Completed`
    pub phase: RequestPhase,
}

/// Conversational retrieval-augmented generator
pub struct RagGenerator {
    embedder: Arc<dyn EmbeddingProvider>,
    generator: Arc<dyn GenerationProvider>,
    rewriter: QueryRewriter,
    top_k: usize,
    min_similarity: f32,
    temperature: f32,
    call_timeout: Duration,
    history_window: usize,
}

impl RagGenerator {
    pub fn new(
        config: &RagConfig,
        embedder: Arc<dyn EmbeddingProvider>,
        generator: Arc<dyn GenerationProvider>,
    ) -> Self {
        Self {
            rewriter: QueryRewriter::new(Arc::clone(&generator), config),
            embedder,
            generator,
            top_k: config.retrieval.top_k,
            min_similarity: config.retrieval.min_similarity,
            temperature: config.llm.temperature,
            call_timeout: Duration::from_secs(config.llm.timeout_secs),
            history_window: config.conversation.history_window,
        }
    }

    /// Override the per-call and per-token timeout
    pub fn with_timeout(mut self, call_timeout: Duration) -> Self {
        self.call_timeout = call_timeout;
        self.rewriter = self.rewriter.with_timeout(call_timeout);
        self
    }

    /// Full client-facing lifecycle for one question
    ///
    /// Emits the echo and start events, then either the answer or a single
    /// generic `Error` event. Returns the phase the request ended in.
    pub async fn respond(
        &self,
        binding: &IndexBinding,
        state: &mut ConversationState,
        question: &str,
        events: &mpsc::Sender<StreamEvent>,
    ) -> RequestPhase {
        for event in [StreamEvent::UserEcho(question.to_string()), StreamEvent::AnswerStart] {
            if send(events, event).await.is_err() {
                return RequestPhase::Failed;
            }
        }

        match self.answer(binding, state, question, events).await {
            Ok(answer) => answer.phase,
            Err(e) => {
                tracing::error!("Request failed: {}", e);
                let _ = send(events, StreamEvent::Error(GENERIC_ERROR_MESSAGE.to_string())).await;
                RequestPhase::Failed
            }
        }
    }

    /// Answer one question, streaming tokens and the final `AnswerEnd`
    ///
    /// On success exactly one turn (the original question and the full
    /// answer) is appended to `state`.
    pub async fn answer(
        &self,
        binding: &IndexBinding,
        state: &mut ConversationState,
        question: &str,
        events: &mpsc::Sender<StreamEvent>,
    ) -> Result<Answer> {
        let mut tracker = PhaseTracker::new();
        match self.run(&mut tracker, binding, state, question, events).await {
            Ok(answer) => Ok(answer),
            Err(e) => {
                if !tracker.phase.is_terminal() {
                    let _ = tracker.advance(RequestPhase::Failed);
                }
                tracing::debug!("Request ended in {:?}", tracker.phase);
                Err(e)
            }
        }
    }

    async fn run(
        &self,
        tracker: &mut PhaseTracker,
        binding: &IndexBinding,
        state: &mut ConversationState,
        question: &str,
        events: &mpsc::Sender<StreamEvent>,
    ) -> Result<Answer> {
        tracker.advance(RequestPhase::Rewriting)?;
        let outcome = self.rewriter.rewrite(state, question).await;
        if let RewriteOutcome::Fallback { error, .. } = &outcome {
            tracing::debug!("Continuing with raw question after rewrite error: {}", error);
        }
        let standalone_query = outcome.into_query();

        tracker.advance(RequestPhase::Retrieving)?;
        let results = self.retrieve(&binding.index, &standalone_query).await?;

        tracker.advance(RequestPhase::Generating)?;
        let prompt =
            PromptBuilder::build_qa_prompt(question, &results, state.recent(self.history_window));
        let text = self.stream_answer(&prompt, events).await?;

        let sources = binding.citations.resolve(&results).await;
        send(
            events,
            StreamEvent::AnswerEnd {
                answer: text.clone(),
                sources: sources.clone(),
            },
        )
        .await?;

        state.push(ConversationTurn::new(question, text.clone()));
        tracker.advance(RequestPhase::Completed)?;

        Ok(Answer {
            standalone_query,
            text,
            sources,
            phase: tracker.phase,
        })
    }

    /// Embed the query and take the top-k chunks above the similarity floor
    async fn retrieve(&self, index: &VectorIndex, query: &str) -> Result<Vec<ScoredChunk>> {
        let embedding = timeout(self.call_timeout, self.embedder.embed(query))
            .await
            .map_err(|_| {
                Error::embedding(format!("query embedding timed out after {:?}", self.call_timeout))
            })??;

        let mut results = index.search(&embedding, self.top_k)?;
        results.retain(|r| r.score >= self.min_similarity);

        tracing::debug!(
            "Retrieved {} chunks: {:?}",
            results.len(),
            results
                .iter()
                .map(|r| (r.chunk.locator_label(), r.score))
                .collect::<Vec<_>>()
        );
        Ok(results)
    }

    /// Forward tokens as they arrive; returns the concatenated answer
    async fn stream_answer(
        &self,
        prompt: &str,
        events: &mpsc::Sender<StreamEvent>,
    ) -> Result<String> {
        let mut tokens = timeout(
            self.call_timeout,
            self.generator.generate_stream(prompt, self.temperature),
        )
        .await
        .map_err(|_| {
            Error::generation(format!("answer stream did not start within {:?}", self.call_timeout))
        })??;

        let mut answer = String::new();
        loop {
            match timeout(self.call_timeout, tokens.next()).await {
                Ok(Some(Ok(token))) => {
                    answer.push_str(&token);
                    send(events, StreamEvent::AnswerToken(token)).await?;
                }
                Ok(Some(Err(e))) => return Err(e),
                Ok(None) => break,
                Err(_) => {
                    return Err(Error::generation(format!(
                        "no token received within {:?}",
                        self.call_timeout
                    )))
                }
            }
        }

        Ok(answer)
    }
}

async fn send(events: &mpsc::Sender<StreamEvent>, event: StreamEvent) -> Result<()> {
    events
        .send(event)
        .await
        .map_err(|_| Error::internal("event receiver closed"))
}
