use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// A file as held by the content store
#[derive(Debug, Clone, PartialEq)]
pub struct FileRecord {
    pub id: Uuid,
    pub name: String,
    pub language: String,
    pub content: String,
    pub updated_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, ToSchema, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct FileResponse {
    pub id: Uuid,
    pub name: String,
    pub language: String,
    pub content: String,
    pub updated_at: DateTime<Utc>,
    pub active_sessions: usize,
}

impl FileResponse {
    pub fn new(file: FileRecord, active_sessions: usize) -> Self {
        Self {
            id: file.id,
            name: file.name,
            language: file.language,
            content: file.content,
            updated_at: file.updated_at,
            active_sessions,
        }
    }
}

/// Request to persist new content for a file
#[derive(Serialize, Deserialize, ToSchema)]
pub struct SaveFileRequest {
    pub content: String,
    pub author: Option<String>,
    pub description: Option<String>,
}
