use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use uuid::Uuid;

use super::{NewVersion, StoreError};
use crate::models::{FileRecord, Version};

#[derive(Default)]
struct Tables {
    files: HashMap<Uuid, FileRecord>,
    versions: HashMap<Uuid, Version>,
    // file -> version ids in insertion order
    history: HashMap<Uuid, Vec<Uuid>>,
}

impl Tables {
    fn write_content(&mut self, id: Uuid, content: &str) -> Result<FileRecord, StoreError> {
        let file = self.files.get_mut(&id).ok_or_else(|| StoreError::file_not_found(id))?;
        file.content = content.to_string();
        file.updated_at = Utc::now();
        Ok(file.clone())
    }

    fn insert_version(&mut self, new: NewVersion) -> Result<Version, StoreError> {
        if !self.files.contains_key(&new.file_id) {
            return Err(StoreError::file_not_found(new.file_id));
        }
        let version = Version {
            id: Uuid::new_v4(),
            file_id: new.file_id,
            content: new.content,
            created_by: new.created_by,
            created_at: Utc::now(),
            description: new.description,
        };
        self.history.entry(version.file_id).or_default().push(version.id);
        self.versions.insert(version.id, version.clone());
        Ok(version)
    }
}

/// In-process store used when no database is configured
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    fn tables(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn get_file(&self, id: Uuid) -> Option<FileRecord> {
        self.tables().files.get(&id).cloned()
    }

    pub fn create_file(&self, name: &str, language: &str, content: &str) -> FileRecord {
        let file = FileRecord {
            id: Uuid::new_v4(),
            name: name.to_string(),
            language: language.to_string(),
            content: content.to_string(),
            updated_at: Utc::now(),
        };
        self.tables().files.insert(file.id, file.clone());
        file
    }

    pub fn write_content(&self, id: Uuid, content: &str) -> Result<FileRecord, StoreError> {
        self.tables().write_content(id, content)
    }

    pub fn insert_version(&self, new: NewVersion) -> Result<Version, StoreError> {
        self.tables().insert_version(new)
    }

    /// Snapshot, overwrite and snapshot again under one lock; nothing is written if the file is unknown
    pub fn restore(&self, pre: NewVersion, content: &str, post: NewVersion) -> Result<(Version, FileRecord, Version), StoreError> {
        let mut tables = self.tables();
        if !tables.files.contains_key(&pre.file_id) {
            return Err(StoreError::file_not_found(pre.file_id));
        }
        let pre_revert = tables.insert_version(pre)?;
        let file = tables.write_content(pre_revert.file_id, content)?;
        let version = tables.insert_version(post)?;
        Ok((pre_revert, file, version))
    }

    pub fn get_version(&self, id: Uuid) -> Option<Version> {
        self.tables().versions.get(&id).cloned()
    }

    pub fn list_versions(&self, file_id: Uuid) -> Vec<Version> {
        let tables = self.tables();
        tables
            .history
            .get(&file_id)
            .map(|ids| ids.iter().rev().filter_map(|id| tables.versions.get(id).cloned()).collect())
            .unwrap_or_default()
    }
}
