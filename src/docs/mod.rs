use utoipa::OpenApi;
use crate::models::*;

/// Health check endpoint
#[utoipa::path(
    get,
    path = "/api/health",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse)
    )
)]
#[allow(dead_code)]
pub async fn health_check_doc() {}

/// Readiness check endpoint
#[utoipa::path(
    get,
    path = "/api/ready",
    responses(
        (status = 200, description = "Service is ready", body = HealthResponse),
        (status = 503, description = "Storage is not reachable", body = HealthResponse)
    )
)]
#[allow(dead_code)]
pub async fn ready_check_doc() {}

/// Hub and host diagnostics
#[utoipa::path(
    get,
    path = "/api/v1/diagnostics",
    responses(
        (status = 200, description = "Diagnostics", body = DiagnosticsResponse)
    )
)]
#[allow(dead_code)]
pub async fn diagnostics_doc() {}

/// Get a file
#[utoipa::path(
    get,
    path = "/api/v1/files/{file_id}",
    params(("file_id" = String, Path, description = "File UUID")),
    responses(
        (status = 200, description = "File with live session count", body = FileResponse),
        (status = 400, description = "Invalid file id", body = ErrorResponse),
        (status = 404, description = "File not found", body = ErrorResponse)
    )
)]
#[allow(dead_code)]
pub async fn file_get_doc() {}

/// Save file content and snapshot it
#[utoipa::path(
    put,
    path = "/api/v1/files/{file_id}/content",
    params(("file_id" = String, Path, description = "File UUID")),
    request_body = SaveFileRequest,
    responses(
        (status = 200, description = "File saved", body = SaveFileResponse),
        (status = 404, description = "File not found", body = ErrorResponse)
    )
)]
#[allow(dead_code)]
pub async fn file_save_doc() {}

/// List versions of a file, newest first
#[utoipa::path(
    get,
    path = "/api/v1/files/{file_id}/versions",
    params(("file_id" = String, Path, description = "File UUID")),
    responses(
        (status = 200, description = "Versions", body = VersionListResponse),
        (status = 404, description = "File not found", body = ErrorResponse)
    )
)]
#[allow(dead_code)]
pub async fn versions_list_doc() {}

/// Record a manual checkpoint
#[utoipa::path(
    post,
    path = "/api/v1/files/{file_id}/versions",
    params(("file_id" = String, Path, description = "File UUID")),
    request_body = CreateVersionRequest,
    responses(
        (status = 201, description = "Version created", body = Version),
        (status = 404, description = "File not found", body = ErrorResponse)
    )
)]
#[allow(dead_code)]
pub async fn version_create_doc() {}

/// Get one version
#[utoipa::path(
    get,
    path = "/api/v1/versions/{version_id}",
    params(("version_id" = String, Path, description = "Version UUID")),
    responses(
        (status = 200, description = "Version", body = Version),
        (status = 404, description = "Version not found", body = ErrorResponse)
    )
)]
#[allow(dead_code)]
pub async fn version_get_doc() {}

/// Revert a file to a version
#[utoipa::path(
    post,
    path = "/api/v1/versions/{version_id}/revert",
    params(("version_id" = String, Path, description = "Version UUID")),
    request_body = RevertRequest,
    responses(
        (status = 200, description = "File reverted", body = RevertResponse),
        (status = 404, description = "Version not found", body = ErrorResponse)
    )
)]
#[allow(dead_code)]
pub async fn version_revert_doc() {}

#[derive(OpenApi)]
#[openapi(
    paths(
        health_check_doc,
        ready_check_doc,
        diagnostics_doc,
        file_get_doc,
        file_save_doc,
        versions_list_doc,
        version_create_doc,
        version_get_doc,
        version_revert_doc,
    ),
    components(
        schemas(
            HealthResponse,
            DiagnosticsResponse,
            ErrorResponse,
            FileResponse,
            SaveFileRequest,
            SaveFileResponse,
            Version,
            VersionListResponse,
            CreateVersionRequest,
            RevertRequest,
            RevertResponse,
        )
    ),
    tags(
        (name = "api", description = "API endpoints")
    )
)]
pub struct ApiDoc;
