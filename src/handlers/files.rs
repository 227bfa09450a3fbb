use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use tracing::info;

use super::{parse_id, store_error};
use crate::models::{ApiError, FileResponse, SaveFileRequest, SaveFileResponse};
use crate::AppState;

/// Get a file with its live content and the number of connected sessions
pub async fn file_get(
    State(state): State<AppState>,
    Path(file_id): Path<String>,
) -> Result<(StatusCode, Json<FileResponse>), ApiError> {
    let file_id = parse_id("file", &file_id)?;
    let file = state.files.get(file_id).await.map_err(store_error)?;
    let active = state.registry.active_sessions(file_id).await;
    Ok((StatusCode::OK, Json(FileResponse::new(file, active))))
}

/// Persist new content for a file and snapshot it
pub async fn file_save(
    State(state): State<AppState>,
    Path(file_id): Path<String>,
    Json(req): Json<SaveFileRequest>,
) -> Result<(StatusCode, Json<SaveFileResponse>), ApiError> {
    let file_id = parse_id("file", &file_id)?;
    let (file, version) = state
        .files
        .save(file_id, req.content, req.author, req.description)
        .await
        .map_err(store_error)?;
    info!("Saved file {} as version {}", file_id, version.id);

    let active = state.registry.active_sessions(file_id).await;
    Ok((
        StatusCode::OK,
        Json(SaveFileResponse {
            file: FileResponse::new(file, active),
            version,
        }),
    ))
}
