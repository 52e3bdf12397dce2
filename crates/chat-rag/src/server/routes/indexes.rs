//! Index listing and selection

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::index::IndexSummary;
use crate::server::state::AppState;

/// GET /api/indexes response
#[derive(Debug, Serialize)]
pub struct IndexListResponse {
    pub indexes: Vec<IndexSummary>,
    pub current: Option<String>,
}

/// POST /api/indexes/select body
#[derive(Debug, Deserialize)]
pub struct SelectIndexRequest {
    pub index: String,
}

/// GET /api/indexes - list persisted indexes
pub async fn list_indexes(State(state): State<AppState>) -> Result<Json<IndexListResponse>> {
    let registry = state.registry();
    Ok(Json(IndexListResponse {
        indexes: registry.list()?,
        current: registry.current(),
    }))
}

/// POST /api/indexes/select - change the index new sessions bind to
pub async fn select_index(
    State(state): State<AppState>,
    Json(request): Json<SelectIndexRequest>,
) -> Result<Json<IndexListResponse>> {
    state.registry().select(&request.index).await?;
    list_indexes(State(state)).await
}
