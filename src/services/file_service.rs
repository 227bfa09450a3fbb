use tracing::info;
use uuid::Uuid;

use crate::db::{Storage, StoreError};
use crate::models::{FileRecord, Version};
use crate::services::version_service::VersionStore;

/// Save path: persists file content and snapshots it, serialized per file with reverts
#[derive(Clone)]
pub struct FileService {
    storage: Storage,
    versions: VersionStore,
}

impl FileService {
    pub fn new(storage: Storage, versions: VersionStore) -> Self {
        Self { storage, versions }
    }

    pub async fn get(&self, file_id: Uuid) -> Result<FileRecord, StoreError> {
        self.storage
            .get_file(file_id)
            .await?
            .ok_or_else(|| StoreError::file_not_found(file_id))
    }

    /// Persist new content and record it as a version
    pub async fn save(
        &self,
        file_id: Uuid,
        content: String,
        author: Option<String>,
        description: Option<String>,
    ) -> Result<(FileRecord, Version), StoreError> {
        let held = self.versions.lock_file(file_id).await;
        let file = self.storage.write_content(file_id, &content).await?;
        let version = self.versions.append(&held, content, author, description).await?;
        info!(file_id = %file_id, version = %version.id, bytes = file.content.len(), "file saved");
        Ok((file, version))
    }

    /// Record a version without changing the file. Defaults to the current live content.
    pub async fn checkpoint(
        &self,
        file_id: Uuid,
        content: Option<String>,
        author: Option<String>,
        description: Option<String>,
    ) -> Result<Version, StoreError> {
        let held = self.versions.lock_file(file_id).await;
        let content = match content {
            Some(content) => content,
            None => self.get(file_id).await?.content,
        };
        self.versions.append(&held, content, author, description).await
    }
}
