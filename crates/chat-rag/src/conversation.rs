//! Per-connection chat history

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One completed question/answer exchange
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConversationTurn {
    /// The question exactly as the user asked it (not the rewritten query)
    pub question: String,
    /// The full streamed answer
    pub answer: String,
    /// When the question was asked
    pub asked_at: DateTime<Utc>,
}

impl ConversationTurn {
    /// Create a turn stamped with the current time
    pub fn new(question: impl Into<String>, answer: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            answer: answer.into(),
            asked_at: Utc::now(),
        }
    }
}

/// Ordered, append-only history owned by one session
///
/// Dropped together with its connection; never shared between sessions.
#[derive(Debug, Clone, Default)]
pub struct ConversationState {
    turns: Vec<ConversationTurn>,
}

impl ConversationState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a completed turn
    ///
    /// Timestamps never go backwards: a turn stamped earlier than the last
    /// one (clock adjustment) is clamped to the previous timestamp.
    pub fn push(&mut self, mut turn: ConversationTurn) {
        if let Some(last) = self.turns.last() {
            if turn.asked_at < last.asked_at {
                turn.asked_at = last.asked_at;
            }
        }
        self.turns.push(turn);
    }

    /// All turns, oldest first
    pub fn turns(&self) -> &[ConversationTurn] {
        &self.turns
    }

    /// The most recent `window` turns, oldest first
    pub fn recent(&self, window: usize) -> &[ConversationTurn] {
        let start = self.turns.len().saturating_sub(window);
        &self.turns[start..]
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }
}
