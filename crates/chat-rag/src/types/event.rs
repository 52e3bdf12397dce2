//! Stream events produced by the generator and their websocket wire form

use serde::{Deserialize, Serialize};

use super::citation::CitationRecord;

/// Lifecycle event for one question
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// Echo of the user's question
    UserEcho(String),
    /// Answer generation started
    AnswerStart,
    /// One incremental token of the answer
    AnswerToken(String),
    /// Answer finished
    AnswerEnd {
        answer: String,
        sources: Vec<CitationRecord>,
    },
    /// Request failed; the session stays open
    Error(String),
}

/// Message author on the wire
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    You,
    Bot,
}

/// Message type on the wire
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    Stream,
    Start,
    End,
    Error,
}

/// JSON message sent to the websocket client
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatResponse {
    pub sender: Sender,
    pub message: String,
    #[serde(rename = "type")]
    pub kind: MessageType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_documents: Option<Vec<CitationRecord>>,
}

impl ChatResponse {
    fn bot(kind: MessageType, message: impl Into<String>) -> Self {
        Self {
            sender: Sender::Bot,
            message: message.into(),
            kind,
            source_documents: None,
        }
    }
}

impl From<StreamEvent> for ChatResponse {
    fn from(event: StreamEvent) -> Self {
        match event {
            StreamEvent::UserEcho(question) => Self {
                sender: Sender::You,
                message: question,
                kind: MessageType::Stream,
                source_documents: None,
            },
            StreamEvent::AnswerStart => Self::bot(MessageType::Start, ""),
            StreamEvent::AnswerToken(token) => Self::bot(MessageType::Stream, token),
            // Clients assemble the answer from tokens; `end` only carries sources
            StreamEvent::AnswerEnd { sources, .. } => Self {
                source_documents: Some(sources),
                ..Self::bot(MessageType::End, "")
            },
            StreamEvent::Error(message) => Self::bot(MessageType::Error, message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_user_echo_wire_format() {
        let wire = serde_json::to_value(ChatResponse::from(StreamEvent::UserEcho(
            "hello".to_string(),
        )))
        .unwrap();

        assert_eq!(wire, json!({"sender": "you", "message": "hello", "type": "stream"}));
    }

    #[test]
    fn test_end_carries_sources() {
        let mut fields = serde_json::Map::new();
        fields.insert("Chapter".to_string(), json!(2));
        fields.insert("Verse".to_string(), json!(47));

        let event = StreamEvent::AnswerEnd {
            answer: "full answer".to_string(),
            sources: vec![CitationRecord::new(fields)],
        };

        let wire = serde_json::to_value(ChatResponse::from(event)).unwrap();
        assert_eq!(
            wire,
            json!({
                "sender": "bot",
                "message": "",
                "type": "end",
                "source_documents": [{"Chapter": 2, "Verse": 47}]
            })
        );
    }

    #[test]
    fn test_token_and_error() {
        let token = ChatResponse::from(StreamEvent::AnswerToken("Blue".to_string()));
        assert_eq!(token.kind, MessageType::Stream);
        assert_eq!(token.sender, Sender::Bot);

        let error = ChatResponse::from(StreamEvent::Error("oops".to_string()));
        assert_eq!(error.kind, MessageType::Error);
        assert!(error.source_documents.is_none());
    }
}
