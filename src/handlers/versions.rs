use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use tracing::info;

use super::{parse_id, store_error};
use crate::models::{
    ApiError, CreateVersionRequest, RevertRequest, RevertResponse, Version,
    VersionListResponse,
};
use crate::AppState;

/// List the versions of a file, newest first
pub async fn versions_list(
    State(state): State<AppState>,
    Path(file_id): Path<String>,
) -> Result<(StatusCode, Json<VersionListResponse>), ApiError> {
    let file_id = parse_id("file", &file_id)?;
    // an unknown file is a 404, not an empty history
    state.files.get(file_id).await.map_err(store_error)?;
    let versions = state.versions.list(file_id).await.map_err(store_error)?;
    Ok((StatusCode::OK, Json(VersionListResponse { versions })))
}

/// Record a manual checkpoint of a file
pub async fn version_create(
    State(state): State<AppState>,
    Path(file_id): Path<String>,
    req: Option<Json<CreateVersionRequest>>,
) -> Result<(StatusCode, Json<Version>), ApiError> {
    let file_id = parse_id("file", &file_id)?;
    let req = req.map(|Json(req)| req).unwrap_or_default();
    let version = state
        .files
        .checkpoint(file_id, req.content, req.author, req.description)
        .await
        .map_err(store_error)?;
    info!("Created version {} of file {}", version.id, file_id);
    Ok((StatusCode::CREATED, Json(version)))
}

pub async fn version_get(
    State(state): State<AppState>,
    Path(version_id): Path<String>,
) -> Result<(StatusCode, Json<Version>), ApiError> {
    let version_id = parse_id("version", &version_id)?;
    let version = state.versions.get(version_id).await.map_err(store_error)?;
    Ok((StatusCode::OK, Json(version)))
}

/// Restore a file to an earlier version; the restored content is pushed to every live session
pub async fn version_revert(
    State(state): State<AppState>,
    Path(version_id): Path<String>,
    req: Option<Json<RevertRequest>>,
) -> Result<(StatusCode, Json<RevertResponse>), ApiError> {
    let version_id = parse_id("version", &version_id)?;
    let req = req.map(|Json(req)| req).unwrap_or_default();
    let outcome = state
        .versions
        .revert(version_id, req.author, &state.registry)
        .await
        .map_err(store_error)?;
    info!(
        "Reverted file {} to version {}, pushed to {} sessions",
        outcome.file.id, version_id, outcome.delivered
    );

    Ok((
        StatusCode::OK,
        Json(RevertResponse {
            status: "reverted".to_string(),
            content: outcome.file.content,
            pre_revert: outcome.pre_revert,
            version: outcome.version,
        }),
    ))
}
