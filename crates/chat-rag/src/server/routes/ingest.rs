//! Document upload endpoint

use axum::{
    extract::{Multipart, State},
    Json,
};
use serde::Serialize;

use crate::error::{Error, Result};
use crate::ingestion::IngestReport;
use crate::server::state::AppState;

/// POST /api/ingest response
#[derive(Debug, Serialize)]
pub struct IngestResponse {
    #[serde(flatten)]
    pub report: IngestReport,
    /// Index new sessions now bind to
    pub current: Option<String>,
}

/// POST /api/ingest - upload a document, build an index from it and select it
///
/// Multipart fields: `file` (required) and `index` (optional identifier;
/// defaults to the file name without its extension).
pub async fn ingest_file(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<IngestResponse>> {
    let mut upload: Option<(String, Vec<u8>)> = None;
    let mut index: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| Error::ingestion("upload", format!("Failed to read multipart field: {}", e)))?
    {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "index" => {
                let value = field.text().await.map_err(|e| {
                    Error::ingestion("upload", format!("Failed to read index field: {}", e))
                })?;
                let value = value.trim();
                if !value.is_empty() {
                    index = Some(value.to_string());
                }
            }
            "file" => {
                let filename = field
                    .file_name()
                    .map(|s| s.to_string())
                    .ok_or_else(|| Error::ingestion("upload", "file field has no file name"))?;
                let data = field.bytes().await.map_err(|e| {
                    Error::ingestion(&filename, format!("Failed to read file: {}", e))
                })?;
                upload = Some((filename, data.to_vec()));
            }
            other => tracing::debug!("Ignoring multipart field '{}'", other),
        }
    }

    let (filename, data) =
        upload.ok_or_else(|| Error::ingestion("upload", "missing multipart field 'file'"))?;
    let index = index.unwrap_or_else(|| index_name_for(&filename));

    tracing::info!("Upload: {} ({} bytes) -> index '{}'", filename, data.len(), index);

    let report = state.ingestor().ingest_bytes(&index, &filename, data).await?;
    state.registry().select(&index).await?;

    Ok(Json(IngestResponse {
        report,
        current: state.registry().current(),
    }))
}

/// Derive an index identifier from an uploaded file name
fn index_name_for(filename: &str) -> String {
    let stem = filename
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(filename);
    let stem = stem.rsplit_once('.').map(|(s, _)| s).unwrap_or(stem);

    let name: String = stem
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '-' })
        .collect();
    let name = name.trim_matches('-');

    if name.is_empty() {
        "upload".to_string()
    } else {
        name.to_string()
    }
}
