use axum::{extract::State, http::StatusCode, Json};
use tracing::{debug, warn};

use crate::models::HealthResponse;
use crate::AppState;

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    debug!("Health check requested");
    Json(HealthResponse {
        status: "ok".to_string(),
        message: "Server is running".to_string(),
        storage: state.storage.backend_name().to_string(),
    })
}

/// Readiness check endpoint. Not ready while the content store is unreachable.
pub async fn ready_check(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    debug!("Readiness check requested");
    let storage = state.storage.backend_name().to_string();
    match state.storage.ping().await {
        Ok(()) => (
            StatusCode::OK,
            Json(HealthResponse {
                status: "ok".to_string(),
                message: "Service is ready".to_string(),
                storage,
            }),
        ),
        Err(e) => {
            warn!("Storage not reachable: {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(HealthResponse {
                    status: "unavailable".to_string(),
                    message: format!("Storage not reachable: {}", e),
                    storage,
                }),
            )
        }
    }
}
