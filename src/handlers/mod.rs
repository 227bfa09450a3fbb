pub mod health;
pub mod files;
pub mod versions;
pub mod diagnostics;

pub use health::*;
pub use files::*;
pub use versions::*;
pub use diagnostics::*;

use axum::http::StatusCode;
use tracing::{error, warn};
use uuid::Uuid;

use crate::db::StoreError;
use crate::models::{ApiError, ErrorResponse};

/// Parse a path id, answering 400 when it is not a UUID
pub(crate) fn parse_id(kind: &str, raw: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw).map_err(|e| {
        warn!("Invalid {} UUID '{}': {}", kind, raw, e);
        ErrorResponse::reply(StatusCode::BAD_REQUEST, format!("Invalid {} UUID '{}'", kind, raw))
    })
}

pub(crate) fn store_error(e: StoreError) -> ApiError {
    match e {
        StoreError::NotFound(what) => ErrorResponse::reply(StatusCode::NOT_FOUND, format!("{} not found", what)),
        StoreError::Database(e) => {
            error!("Database error: {}", e);
            ErrorResponse::reply(StatusCode::INTERNAL_SERVER_ERROR, format!("Database error: {}", e))
        }
    }
}
