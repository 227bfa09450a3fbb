pub mod dbfiles;
pub mod memory;

use std::sync::Arc;

use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use crate::models::{FileRecord, Version};
use dbfiles::PgStore;
use memory::MemoryStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{0} not found")]
    NotFound(String),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl StoreError {
    pub fn file_not_found(id: Uuid) -> Self {
        StoreError::NotFound(format!("File '{}'", id))
    }

    pub fn version_not_found(id: Uuid) -> Self {
        StoreError::NotFound(format!("Version '{}'", id))
    }
}

/// Fields of a version that the caller supplies; id and timestamp are assigned on insert
#[derive(Debug, Clone)]
pub struct NewVersion {
    pub file_id: Uuid,
    pub content: String,
    pub created_by: Option<String>,
    pub description: Option<String>,
}

/// Durable record store for file content and version history
#[derive(Clone)]
pub enum Storage {
    Memory(Arc<MemoryStore>),
    Postgres(Arc<PgStore>),
}

impl Storage {
    pub fn memory() -> Self {
        Storage::Memory(Arc::new(MemoryStore::default()))
    }

    /// Connect to Postgres and make sure the tables exist
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let store = PgStore::new(database_url, max_connections).await?;
        store.ensure_schema().await?;
        info!("Database schema ready");
        Ok(Storage::Postgres(Arc::new(store)))
    }

    pub fn backend_name(&self) -> &'static str {
        match self {
            Storage::Memory(_) => "memory",
            Storage::Postgres(_) => "postgres",
        }
    }

    pub async fn ping(&self) -> Result<(), StoreError> {
        match self {
            Storage::Memory(_) => Ok(()),
            Storage::Postgres(db) => db.ping().await,
        }
    }

    pub async fn get_file(&self, id: Uuid) -> Result<Option<FileRecord>, StoreError> {
        match self {
            Storage::Memory(mem) => Ok(mem.get_file(id)),
            Storage::Postgres(db) => db.get_file(id).await,
        }
    }

    pub async fn create_file(&self, name: &str, language: &str, content: &str) -> Result<FileRecord, StoreError> {
        match self {
            Storage::Memory(mem) => Ok(mem.create_file(name, language, content)),
            Storage::Postgres(db) => db.create_file(name, language, content).await,
        }
    }

    /// Replace a file's live content. Unknown files are `NotFound`.
    pub async fn write_content(&self, id: Uuid, content: &str) -> Result<FileRecord, StoreError> {
        match self {
            Storage::Memory(mem) => mem.write_content(id, content),
            Storage::Postgres(db) => db.write_content(id, content).await,
        }
    }

    pub async fn insert_version(&self, version: NewVersion) -> Result<Version, StoreError> {
        match self {
            Storage::Memory(mem) => mem.insert_version(version),
            Storage::Postgres(db) => db.insert_version(version).await,
        }
    }

    /// Restore earlier content atomically: record `pre`, overwrite the live content, record `post`.
    /// Either all three writes land or none do.
    pub async fn restore(
        &self,
        pre: NewVersion,
        content: &str,
        post: NewVersion,
    ) -> Result<(Version, FileRecord, Version), StoreError> {
        match self {
            Storage::Memory(mem) => mem.restore(pre, content, post),
            Storage::Postgres(db) => db.restore(pre, content, post).await,
        }
    }

    pub async fn get_version(&self, id: Uuid) -> Result<Option<Version>, StoreError> {
        match self {
            Storage::Memory(mem) => Ok(mem.get_version(id)),
            Storage::Postgres(db) => db.get_version(id).await,
        }
    }

    /// Versions of a file, newest first
    pub async fn list_versions(&self, file_id: Uuid) -> Result<Vec<Version>, StoreError> {
        match self {
            Storage::Memory(mem) => Ok(mem.list_versions(file_id)),
            Storage::Postgres(db) => db.list_versions(file_id).await,
        }
    }
}
