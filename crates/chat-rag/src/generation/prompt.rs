//! Prompt templates for question condensing and grounded answering

use crate::conversation::ConversationTurn;
use crate::types::ScoredChunk;

/// Prompt builder for the conversational pipeline
pub struct PromptBuilder;

impl PromptBuilder {
    /// Render history as alternating `Human:` / `Assistant:` lines
    pub fn format_history(turns: &[ConversationTurn]) -> String {
        turns
            .iter()
            .map(|t| format!("Human: {}\nAssistant: {}", t.question, t.answer))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Number retrieved passages and label each with its locator
    pub fn build_context(results: &[ScoredChunk]) -> String {
        let mut context = String::new();

        for (i, result) in results.iter().enumerate() {
            context.push_str(&format!(
                "[{}] {}\n{}\n\n",
                i + 1,
                result.chunk.locator_label(),
                result.chunk.text
            ));
        }

        context
    }

    /// Prompt that turns a follow-up into a standalone question
    pub fn build_condense_prompt(history: &[ConversationTurn], question: &str) -> String {
        format!(
            r#"Given the following conversation and a follow up question, rephrase the follow up question to be a standalone question that can be understood without the conversation. Reply with the standalone question only.

Chat History:
{history}

Follow Up Input: {question}
Standalone question:"#,
            history = Self::format_history(history),
            question = question
        )
    }

    /// Grounded answering prompt over retrieved passages and recent history
    pub fn build_qa_prompt(
        question: &str,
        results: &[ScoredChunk],
        history: &[ConversationTurn],
    ) -> String {
        let context = if results.is_empty() {
            "(no relevant passages were found)".to_string()
        } else {
            Self::build_context(results)
        };

        let history = if history.is_empty() {
            String::new()
        } else {
            format!("\nCONVERSATION SO FAR:\n{}\n", Self::format_history(history))
        };

        format!(
            r#"You are a helpful assistant answering questions about a set of documents.

Use only the passages below to answer. If the passages do not contain the answer, say that you don't know instead of making one up. Keep the answer concise.

PASSAGES:
{context}{history}
QUESTION: {question}

ANSWER:"#,
            context = context.trim_end(),
            history = history,
            question = question
        )
    }
}
