use chrono::{DateTime, Utc};
use sqlx::postgres::{PgExecutor, PgPool, PgPoolOptions};
use std::time::Duration;
use tracing::{error, info};
use uuid::Uuid;

use super::{NewVersion, StoreError};
use crate::models::{FileRecord, Version};

const SCHEMA: [&str; 3] = [
    r#"
    CREATE TABLE IF NOT EXISTS files (
        id UUID PRIMARY KEY,
        name TEXT NOT NULL,
        language TEXT NOT NULL DEFAULT 'javascript',
        content TEXT NOT NULL DEFAULT '',
        created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS file_versions (
        seq BIGSERIAL,
        id UUID PRIMARY KEY,
        file_id UUID NOT NULL REFERENCES files(id) ON DELETE CASCADE,
        content TEXT NOT NULL,
        created_by TEXT,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        description TEXT
    )
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS file_versions_file_created
        ON file_versions (file_id, created_at DESC, seq DESC)
    "#,
];

/// File row from database
#[derive(Debug, Clone, sqlx::FromRow)]
struct FileRow {
    id: Uuid,
    name: String,
    language: String,
    content: String,
    updated_at: DateTime<Utc>,
}

impl From<FileRow> for FileRecord {
    fn from(row: FileRow) -> Self {
        FileRecord {
            id: row.id,
            name: row.name,
            language: row.language,
            content: row.content,
            updated_at: row.updated_at,
        }
    }
}

/// Version row from database
#[derive(Debug, Clone, sqlx::FromRow)]
struct VersionRow {
    id: Uuid,
    file_id: Uuid,
    content: String,
    created_by: Option<String>,
    created_at: DateTime<Utc>,
    description: Option<String>,
}

impl From<VersionRow> for Version {
    fn from(row: VersionRow) -> Self {
        Version {
            id: row.id,
            file_id: row.file_id,
            content: row.content,
            created_by: row.created_by,
            created_at: row.created_at,
            description: row.description,
        }
    }
}

/// Postgres-backed file and version store
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Create a new database connection pool
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        info!("Connecting to database...");

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(2)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(600))
            .max_lifetime(Duration::from_secs(1800))
            .connect(database_url)
            .await?;

        info!("Database connection pool created successfully");

        Ok(Self { pool })
    }

    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    pub async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    pub async fn get_file(&self, id: Uuid) -> Result<Option<FileRecord>, StoreError> {
        let row = sqlx::query_as::<_, FileRow>(
            "SELECT id, name, language, content, updated_at FROM files WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(FileRecord::from))
    }

    pub async fn create_file(&self, name: &str, language: &str, content: &str) -> Result<FileRecord, StoreError> {
        let row = sqlx::query_as::<_, FileRow>(
            r#"
            INSERT INTO files (id, name, language, content)
            VALUES ($1, $2, $3, $4)
            RETURNING id, name, language, content, updated_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(name)
        .bind(language)
        .bind(content)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.into())
    }

    pub async fn write_content(&self, id: Uuid, content: &str) -> Result<FileRecord, StoreError> {
        write_content(&self.pool, id, content).await
    }

    pub async fn insert_version(&self, new: NewVersion) -> Result<Version, StoreError> {
        insert_version(&self.pool, new).await
    }

    /// Snapshot, overwrite and snapshot again in one transaction
    pub async fn restore(
        &self,
        pre: NewVersion,
        content: &str,
        post: NewVersion,
    ) -> Result<(Version, FileRecord, Version), StoreError> {
        let mut tx = self.pool.begin().await?;
        let pre_revert = insert_version(&mut *tx, pre).await?;
        let file = write_content(&mut *tx, pre_revert.file_id, content).await?;
        let version = insert_version(&mut *tx, post).await?;
        tx.commit().await?;
        Ok((pre_revert, file, version))
    }

    pub async fn get_version(&self, id: Uuid) -> Result<Option<Version>, StoreError> {
        let row = sqlx::query_as::<_, VersionRow>(
            "SELECT id, file_id, content, created_by, created_at, description FROM file_versions WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Version::from))
    }

    pub async fn list_versions(&self, file_id: Uuid) -> Result<Vec<Version>, StoreError> {
        let rows = sqlx::query_as::<_, VersionRow>(
            r#"
            SELECT id, file_id, content, created_by, created_at, description
            FROM file_versions
            WHERE file_id = $1
            ORDER BY created_at DESC, seq DESC
            "#,
        )
        .bind(file_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Version::from).collect())
    }
}

async fn write_content<'e, E: PgExecutor<'e>>(exec: E, id: Uuid, content: &str) -> Result<FileRecord, StoreError> {
    let row = sqlx::query_as::<_, FileRow>(
        r#"
        UPDATE files SET content = $2, updated_at = now()
        WHERE id = $1
        RETURNING id, name, language, content, updated_at
        "#,
    )
    .bind(id)
    .bind(content)
    .fetch_optional(exec)
    .await?;
    row.map(FileRecord::from).ok_or_else(|| StoreError::file_not_found(id))
}

async fn insert_version<'e, E: PgExecutor<'e>>(exec: E, new: NewVersion) -> Result<Version, StoreError> {
    let result = sqlx::query_as::<_, VersionRow>(
        r#"
        INSERT INTO file_versions (id, file_id, content, created_by, description)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING id, file_id, content, created_by, created_at, description
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(new.file_id)
    .bind(&new.content)
    .bind(&new.created_by)
    .bind(&new.description)
    .fetch_one(exec)
    .await;

    match result {
        Ok(row) => Ok(row.into()),
        Err(sqlx::Error::Database(db_err)) if db_err.is_foreign_key_violation() => {
            Err(StoreError::file_not_found(new.file_id))
        }
        Err(e) => {
            error!("Failed to insert version for file {}: {}", new.file_id, e);
            Err(e.into())
        }
    }
}
