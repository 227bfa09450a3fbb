use axum::{
    routing::{get, post, put},
    Router,
};

use crate::handlers::{
    diagnostics, file_get, file_save, health_check, ready_check, version_create, version_get,
    version_revert, versions_list,
};
use crate::AppState;

/// Create API routes
pub fn create_api_routes(state: AppState) -> Router {
    Router::<AppState>::new()
        .route("/health", get(health_check))
        .route("/ready", get(ready_check))
        .route("/v1/diagnostics", get(diagnostics))
        .route("/v1/files/:file_id", get(file_get))
        .route("/v1/files/:file_id/content", put(file_save))
        .route("/v1/files/:file_id/versions", get(versions_list).post(version_create))
        .route("/v1/versions/:version_id", get(version_get))
        .route("/v1/versions/:version_id/revert", post(version_revert))
        .with_state(state)
}
