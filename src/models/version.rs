use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::models::FileResponse;

/// Immutable full-content snapshot of a file
#[derive(Serialize, Deserialize, ToSchema, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Version {
    pub id: Uuid,
    pub file_id: Uuid,
    pub content: String,
    pub created_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub description: Option<String>,
}

/// Request for a manual checkpoint of a file
#[derive(Serialize, Deserialize, ToSchema, Default)]
pub struct CreateVersionRequest {
    /// Content to record; defaults to the file's current content
    pub content: Option<String>,
    pub author: Option<String>,
    pub description: Option<String>,
}

#[derive(Serialize, Deserialize, ToSchema, Default)]
pub struct RevertRequest {
    pub author: Option<String>,
}

/// Response after reverting a file to an earlier version
#[derive(Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RevertResponse {
    pub status: String,
    pub content: String,
    /// Snapshot of the content that was replaced
    pub pre_revert: Version,
    /// Snapshot recording the restored content
    pub version: Version,
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct VersionListResponse {
    pub versions: Vec<Version>,
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct SaveFileResponse {
    pub file: FileResponse,
    pub version: Version,
}
