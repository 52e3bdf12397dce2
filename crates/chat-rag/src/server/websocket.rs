//! Websocket chat sessions
//!
//! One connection is one session: it owns its conversation history and the
//! index handle acquired at connect time. Events for the client flow through
//! an mpsc channel to a single writer task.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    response::Response,
};
use futures::{Sink, SinkExt, Stream, StreamExt};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::Instrument;
use uuid::Uuid;

use crate::conversation::ConversationState;
use crate::error::Result;
use crate::generation::IndexBinding;
use crate::types::{ChatResponse, StreamEvent};

use super::state::AppState;

/// Sent when a question arrives while another is being answered
pub const BUSY_MESSAGE: &str = "Still answering the previous question. Please wait.";
/// Sent for blank questions
pub const EMPTY_QUESTION_MESSAGE: &str = "Please enter a question.";

/// GET /chat - chat against the current index
pub async fn chat_current(ws: WebSocketUpgrade, State(state): State<AppState>) -> Result<Response> {
    upgrade(ws, state, None).await
}

/// GET /chat/:index - chat against a named index
pub async fn chat_named(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Path(index): Path<String>,
) -> Result<Response> {
    upgrade(ws, state, Some(index)).await
}

/// Bind the index before upgrading so a missing index is a plain HTTP error
async fn upgrade(ws: WebSocketUpgrade, state: AppState, index: Option<String>) -> Result<Response> {
    let binding = state.bind(index.as_deref()).await?;

    Ok(ws.on_upgrade(move |socket| {
        let span = tracing::info_span!("session", id = %Uuid::new_v4(), index = %binding.name);
        async move {
            let (sink, inbound) = socket.split();
            run_session(sink, inbound, state, binding).await;
        }
        .instrument(span)
    }))
}

/// What the session loop should do with one inbound frame
enum Inbound {
    Question(String),
    Blank,
    Ignore,
    Closed,
}

fn classify(frame: Option<std::result::Result<Message, axum::Error>>) -> Inbound {
    match frame {
        Some(Ok(Message::Text(text))) => {
            if text.trim().is_empty() {
                Inbound::Blank
            } else {
                Inbound::Question(text)
            }
        }
        Some(Ok(Message::Close(_))) | None => Inbound::Closed,
        Some(Ok(_)) => Inbound::Ignore,
        Some(Err(e)) => {
            tracing::debug!("Websocket receive error: {}", e);
            Inbound::Closed
        }
    }
}

/// Serve one session until the client leaves; returns its conversation
async fn run_session<S, R>(
    mut sink: S,
    mut inbound: R,
    state: AppState,
    binding: IndexBinding,
) -> ConversationState
where
    S: Sink<Message> + Unpin + Send + 'static,
    S::Error: Send,
    R: Stream<Item = std::result::Result<Message, axum::Error>> + Unpin,
{
    let _guard = state.session_guard();
    tracing::info!(
        "Session opened ({} chunks, {} active)",
        binding.index.len(),
        state.active_sessions()
    );

    let (tx, rx) = mpsc::channel::<StreamEvent>(state.config().conversation.event_buffer.max(1));

    let writer = tokio::spawn(
        async move {
            let mut events = ReceiverStream::new(rx);
            while let Some(event) = events.next().await {
                let text = match serde_json::to_string(&ChatResponse::from(event)) {
                    Ok(text) => text,
                    Err(e) => {
                        tracing::warn!("Failed to encode event: {}", e);
                        continue;
                    }
                };
                if sink.send(Message::Text(text)).await.is_err() {
                    break;
                }
            }
            let _ = sink.close().await;
        }
        .in_current_span(),
    );

    let mut conversation = ConversationState::new();

    'session: loop {
        let question = match classify(inbound.next().await) {
            Inbound::Question(question) => question,
            Inbound::Blank => {
                let _ = tx.send(StreamEvent::Error(EMPTY_QUESTION_MESSAGE.to_string())).await;
                continue;
            }
            Inbound::Ignore => continue,
            Inbound::Closed => break,
        };

        tracing::info!("Question: {:?}", question);
        let request = state.rag().respond(&binding, &mut conversation, &question, &tx);
        tokio::pin!(request);

        // Keep reading while answering: a disconnect cancels the request,
        // a second question is rejected
        loop {
            tokio::select! {
                phase = &mut request => {
                    tracing::debug!("Request finished: {:?}", phase);
                    break;
                }
                frame = inbound.next() => match classify(frame) {
                    Inbound::Question(_) | Inbound::Blank => {
                        let _ = tx.send(StreamEvent::Error(BUSY_MESSAGE.to_string())).await;
                    }
                    Inbound::Ignore => {}
                    Inbound::Closed => {
                        tracing::info!("Client left mid-answer, request cancelled");
                        break 'session;
                    }
                },
            }
        }
    }

    drop(tx);
    let _ = writer.await;
    tracing::info!("Session closed after {} turns", conversation.len());
    conversation
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RagConfig;
    use crate::generation::testing::{KeywordEmbedder, ScriptedGenerator, StreamEnd};
    use crate::generation::{CitationResolvers, GENERIC_ERROR_MESSAGE};
    use crate::types::{MessageType, Sender};
    use futures::channel::mpsc as channel;
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::TempDir;
    use tokio::task::JoinHandle;
    use tokio::time::timeout;

    type Frame = std::result::Result<Message, axum::Error>;

    /// In-process client for one session
    struct Client {
        questions: channel::UnboundedSender<Frame>,
        frames: channel::UnboundedReceiver<Message>,
        session: JoinHandle<ConversationState>,
        state: AppState,
        _dir: TempDir,
    }

    impl Client {
        /// Ingest `sky.txt` into index "sky" and open a session on it
        async fn connect(generator: ScriptedGenerator) -> Self {
            let dir = TempDir::new().unwrap();
            let mut config = RagConfig::default();
            config.storage.index_dir = dir.path().to_path_buf();
            config.embeddings.dimensions = 3;
            config.llm.timeout_secs = 30;

            let citations = CitationResolvers::from_config(&config.citations).unwrap();
            let state = AppState::from_parts(
                config,
                Arc::new(KeywordEmbedder),
                Arc::new(generator),
                citations,
            )
            .await
            .unwrap();
            state
                .ingestor()
                .ingest_bytes("sky", "sky.txt", b"The sky is blue.".to_vec())
                .await
                .unwrap();
            let binding = state.bind(Some("sky")).await.unwrap();

            let (questions, inbound) = channel::unbounded();
            let (sink, frames) = channel::unbounded();
            let session = tokio::spawn(run_session(sink, inbound, state.clone(), binding));

            Self {
                questions,
                frames,
                session,
                state,
                _dir: dir,
            }
        }

        fn ask(&self, question: &str) {
            self.questions
                .unbounded_send(Ok(Message::Text(question.to_string())))
                .unwrap();
        }

        async fn next_frame(&mut self) -> ChatResponse {
            let message = timeout(Duration::from_secs(5), self.frames.next())
                .await
                .expect("no frame within 5s")
                .expect("session closed");
            match message {
                Message::Text(text) => serde_json::from_str(&text).unwrap(),
                other => panic!("unexpected frame {:?}", other),
            }
        }

        /// Frames up to and including the one that ends the current request
        async fn until_done(&mut self) -> Vec<ChatResponse> {
            let mut frames = Vec::new();
            loop {
                let frame = self.next_frame().await;
                let done = match frame.kind {
                    MessageType::End => true,
                    MessageType::Error => frame.message == GENERIC_ERROR_MESSAGE,
                    _ => false,
                };
                frames.push(frame);
                if done {
                    return frames;
                }
            }
        }

        /// Disconnect and wait for the session to finish
        async fn close(self) -> (ConversationState, AppState) {
            drop(self.questions);
            let conversation = timeout(Duration::from_secs(5), self.session)
                .await
                .expect("session did not stop")
                .unwrap();
            (conversation, self.state)
        }
    }

    fn errors(frames: &[ChatResponse], message: &str) -> usize {
        frames
            .iter()
            .filter(|f| f.kind == MessageType::Error && f.message == message)
            .count()
    }

    #[tokio::test]
    async fn test_sky_is_blue_from_ingested_file() {
        let mut client = Client::connect(ScriptedGenerator::answering(&["Blue", "."])).await;
        client.ask("What color is the sky?");

        let frames = client.until_done().await;
        let wire: Vec<serde_json::Value> = frames
            .iter()
            .map(|f| serde_json::to_value(f).unwrap())
            .collect();
        assert_eq!(
            wire,
            vec![
                json!({"sender": "you", "message": "What color is the sky?", "type": "stream"}),
                json!({"sender": "bot", "message": "", "type": "start"}),
                json!({"sender": "bot", "message": "Blue", "type": "stream"}),
                json!({"sender": "bot", "message": ".", "type": "stream"}),
                json!({
                    "sender": "bot",
                    "message": "",
                    "type": "end",
                    "source_documents": [{"source": "sky.txt"}]
                }),
            ]
        );

        let (conversation, state) = client.close().await;
        assert_eq!(conversation.len(), 1);
        assert_eq!(conversation.turns()[0].answer, "Blue.");
        assert_eq!(state.active_sessions(), 0);
    }

    #[tokio::test]
    async fn test_second_question_while_answering_is_rejected() {
        let generator = ScriptedGenerator::answering(&["Blue", "."])
            .with_token_delay(Duration::from_millis(100));
        let mut client = Client::connect(generator).await;
        client.ask("What color is the sky?");
        client.ask("And the grass?");

        let frames = client.until_done().await;
        assert_eq!(errors(&frames, BUSY_MESSAGE), 1);
        assert_eq!(frames.iter().filter(|f| f.sender == Sender::You).count(), 1);
        assert_eq!(frames.last().map(|f| f.kind), Some(MessageType::End));

        let (conversation, _) = client.close().await;
        assert_eq!(conversation.len(), 1);
        assert_eq!(conversation.turns()[0].question, "What color is the sky?");
    }

    #[tokio::test]
    async fn test_session_survives_failed_request() {
        let mut client =
            Client::connect(ScriptedGenerator::answering(&["Blue."]).failing_first(1)).await;

        client.ask("What color is the sky?");
        let failed = client.until_done().await;
        assert_eq!(failed.last().map(|f| f.kind), Some(MessageType::Error));
        assert_eq!(errors(&failed, GENERIC_ERROR_MESSAGE), 1);

        client.ask("What color is the sky, again?");
        let answered = client.until_done().await;
        assert_eq!(answered.last().map(|f| f.kind), Some(MessageType::End));

        let (conversation, _) = client.close().await;
        assert_eq!(conversation.len(), 1);
        assert_eq!(conversation.turns()[0].question, "What color is the sky, again?");
    }

    #[tokio::test]
    async fn test_blank_question_and_verbatim_echo() {
        let mut client = Client::connect(ScriptedGenerator::answering(&["Blue."])).await;

        client.ask("   ");
        let blank = client.next_frame().await;
        assert_eq!(blank.kind, MessageType::Error);
        assert_eq!(blank.message, EMPTY_QUESTION_MESSAGE);

        client.ask("  What color is the sky? ");
        let frames = client.until_done().await;
        assert_eq!(frames[0].sender, Sender::You);
        assert_eq!(frames[0].message, "  What color is the sky? ");

        let (conversation, _) = client.close().await;
        assert_eq!(conversation.len(), 1);
    }

    #[tokio::test]
    async fn test_disconnect_mid_answer_records_no_turn() {
        let generator = ScriptedGenerator::answering(&["Blue"]).ending(StreamEnd::Hang);
        let mut client = Client::connect(generator).await;
        client.ask("What color is the sky?");

        loop {
            let frame = client.next_frame().await;
            if frame.kind == MessageType::Stream && frame.sender == Sender::Bot {
                assert_eq!(frame.message, "Blue");
                break;
            }
        }

        let (conversation, state) = client.close().await;
        assert!(conversation.is_empty());
        assert_eq!(state.active_sessions(), 0);
    }
}
