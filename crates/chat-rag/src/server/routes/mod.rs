//! HTTP API routes for the chat server

pub mod indexes;
pub mod ingest;

use axum::{
    extract::{DefaultBodyLimit, State},
    routing::{get, post},
    Json, Router,
};

use crate::server::state::AppState;

/// Build all API routes
pub fn api_routes(max_upload_size: usize) -> Router<AppState> {
    Router::new()
        // Index management
        .route("/indexes", get(indexes::list_indexes))
        .route("/indexes/select", post(indexes::select_index))
        // Ingestion - with larger body limit for file uploads
        .route(
            "/ingest",
            post(ingest::ingest_file).layer(DefaultBodyLimit::max(max_upload_size)),
        )
        // Info
        .route("/info", get(info))
}

/// API info endpoint
async fn info(State(state): State<AppState>) -> Json<serde_json::Value> {
    let config = state.config();
    Json(serde_json::json!({
        "name": "chat-rag",
        "version": env!("CARGO_PKG_VERSION"),
        "description": "Conversational RAG with streamed answers and citations",
        "current_index": state.registry().current(),
        "active_sessions": state.active_sessions(),
        "models": {
            "generation": state.generator().model(),
            "embeddings": state.embedder().model(),
        },
        "retrieval": {
            "top_k": config.retrieval.top_k,
            "min_similarity": config.retrieval.min_similarity,
        },
        "endpoints": {
            "GET /chat": "Websocket chat against the current index",
            "GET /chat/:index": "Websocket chat against a named index",
            "GET /api/indexes": "List indexes and the current selection",
            "POST /api/indexes/select": "Select the index for new sessions",
            "POST /api/ingest": "Upload a document into a new index (multipart: file, index)"
        }
    }))
}
