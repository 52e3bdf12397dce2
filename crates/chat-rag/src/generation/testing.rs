//! In-memory providers for pipeline tests

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::error::{Error, Result};
use crate::providers::{EmbeddingProvider, GenerationProvider, TokenStream};

/// Embeds text as keyword presence: `[sky, grass, 1.0]`
pub struct KeywordEmbedder;

#[async_trait]
impl EmbeddingProvider for KeywordEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let text = text.to_lowercase();
        let has = |word: &str| if text.contains(word) { 1.0 } else { 0.0 };
        Ok(vec![has("sky"), has("grass"), 0.1])
    }

    fn dimensions(&self) -> usize {
        3
    }

    fn model(&self) -> &str {
        "keyword"
    }

    fn name(&self) -> &str {
        "keyword"
    }
}

/// How the fake answer stream ends
#[derive(Clone)]
pub enum StreamEnd {
    Finish,
    Fail,
    Hang,
}

/// Scripted generation provider
pub struct ScriptedGenerator {
    /// Reply to non-streaming calls; `None` fails them
    pub rewrite_reply: Option<String>,
    pub rewrite_delay: Duration,
    pub tokens: Vec<String>,
    /// Pause before each streamed token
    pub token_delay: Duration,
    pub end: StreamEnd,
    /// Number of upcoming streams that fail before producing anything
    pub failing_streams: AtomicUsize,
    pub rewrite_calls: AtomicUsize,
    pub prompts: Mutex<Vec<String>>,
}

impl ScriptedGenerator {
    pub fn answering(tokens: &[&str]) -> Self {
        Self {
            rewrite_reply: None,
            rewrite_delay: Duration::ZERO,
            tokens: tokens.iter().map(|t| t.to_string()).collect(),
            token_delay: Duration::ZERO,
            end: StreamEnd::Finish,
            failing_streams: AtomicUsize::new(0),
            rewrite_calls: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn with_rewrite(mut self, reply: &str) -> Self {
        self.rewrite_reply = Some(reply.to_string());
        self
    }

    pub fn ending(mut self, end: StreamEnd) -> Self {
        self.end = end;
        self
    }

    pub fn with_token_delay(mut self, delay: Duration) -> Self {
        self.token_delay = delay;
        self
    }

    pub fn failing_first(self, streams: usize) -> Self {
        self.failing_streams.store(streams, Ordering::SeqCst);
        self
    }

    pub fn rewrite_calls(&self) -> usize {
        self.rewrite_calls.load(Ordering::SeqCst)
    }

    pub fn last_prompt(&self) -> Option<String> {
        self.prompts.lock().last().cloned()
    }
}

#[async_trait]
impl GenerationProvider for ScriptedGenerator {
    async fn generate(&self, prompt: &str, _temperature: f32) -> Result<String> {
        self.rewrite_calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().push(prompt.to_string());
        tokio::time::sleep(self.rewrite_delay).await;
        self.rewrite_reply
            .clone()
            .ok_or_else(|| Error::generation("rewrite model unavailable"))
    }

    async fn generate_stream(&self, prompt: &str, _temperature: f32) -> Result<TokenStream> {
        self.prompts.lock().push(prompt.to_string());
        let failing = self
            .failing_streams
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(Error::generation("model not loaded"));
        }

        let delay = self.token_delay;
        let tokens = stream::iter(self.tokens.clone()).then(move |token| async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            Ok::<_, Error>(token)
        });

        Ok(match self.end {
            StreamEnd::Finish => tokens.boxed(),
            StreamEnd::Fail => tokens
                .chain(stream::once(async { Err(Error::generation("model crashed")) }))
                .boxed(),
            StreamEnd::Hang => tokens.chain(stream::pending()).boxed(),
        })
    }

    fn name(&self) -> &str {
        "scripted"
    }

    fn model(&self) -> &str {
        "scripted"
    }
}
