use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::info;
use uuid::Uuid;

use crate::db::{NewVersion, Storage, StoreError};
use crate::models::{FileRecord, ServerMessage, Version};
use crate::ws::HubRegistry;

/// One async lock per file, created on demand and dropped once nobody holds or waits on it
#[derive(Default)]
pub struct FileLocks {
    locks: Mutex<HashMap<Uuid, Arc<AsyncMutex<()>>>>,
}

/// Held while a file's content or history is being changed
pub struct FileGuard<'a> {
    owner: &'a FileLocks,
    file_id: Uuid,
    lock: Arc<AsyncMutex<()>>,
    guard: Option<OwnedMutexGuard<()>>,
}

impl FileLocks {
    pub async fn lock(&self, file_id: Uuid) -> FileGuard<'_> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            locks.entry(file_id).or_default().clone()
        };
        let guard = lock.clone().lock_owned().await;
        FileGuard { owner: self, file_id, lock, guard: Some(guard) }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.locks.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

impl FileGuard<'_> {
    pub fn file_id(&self) -> Uuid {
        self.file_id
    }
}

impl Drop for FileGuard<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        let mut locks = self.owner.locks.lock().unwrap_or_else(PoisonError::into_inner);
        // only the map and this guard still reference it
        if Arc::strong_count(&self.lock) == 2 {
            locks.remove(&self.file_id);
        }
    }
}

/// Result of restoring an earlier version
#[derive(Debug, Clone)]
pub struct RevertOutcome {
    /// Snapshot of the content that was live before the revert
    pub pre_revert: Version,
    /// Snapshot of the restored content
    pub version: Version,
    pub file: FileRecord,
    /// Live sessions the restored content was pushed to
    pub delivered: usize,
}

/// Append-only snapshot log per file
#[derive(Clone)]
pub struct VersionStore {
    storage: Storage,
    locks: Arc<FileLocks>,
}

impl VersionStore {
    pub fn new(storage: Storage) -> Self {
        Self { storage, locks: Arc::default() }
    }

    pub async fn lock_file(&self, file_id: Uuid) -> FileGuard<'_> {
        self.locks.lock(file_id).await
    }

    /// Record `content` as a new version of the file
    pub async fn snapshot(
        &self,
        file_id: Uuid,
        content: String,
        author: Option<String>,
        description: Option<String>,
    ) -> Result<Version, StoreError> {
        let held = self.lock_file(file_id).await;
        self.append(&held, content, author, description).await
    }

    /// Append while the caller already holds the file's lock
    pub async fn append(
        &self,
        held: &FileGuard<'_>,
        content: String,
        author: Option<String>,
        description: Option<String>,
    ) -> Result<Version, StoreError> {
        self.storage
            .insert_version(NewVersion {
                file_id: held.file_id(),
                content,
                created_by: author,
                description,
            })
            .await
    }

    /// Versions of a file, newest first
    pub async fn list(&self, file_id: Uuid) -> Result<Vec<Version>, StoreError> {
        self.storage.list_versions(file_id).await
    }

    pub async fn get(&self, version_id: Uuid) -> Result<Version, StoreError> {
        self.storage
            .get_version(version_id)
            .await?
            .ok_or_else(|| StoreError::version_not_found(version_id))
    }

    /// Restore the content of `version_id`. The replaced content and the restored
    /// content are both recorded as new versions, so no history is lost. The restored
    /// content is pushed to the file's live sessions before the file lock is released,
    /// so concurrent reverts reach editors in the order they were stored.
    pub async fn revert(
        &self,
        version_id: Uuid,
        author: Option<String>,
        registry: &HubRegistry,
    ) -> Result<RevertOutcome, StoreError> {
        let target = self.get(version_id).await?;
        let held = self.lock_file(target.file_id).await;

        let current = self
            .storage
            .get_file(target.file_id)
            .await?
            .ok_or_else(|| StoreError::file_not_found(target.file_id))?;

        let pre = NewVersion {
            file_id: held.file_id(),
            content: current.content,
            created_by: author.clone(),
            description: Some(format!("Auto-save before revert to {}", target.created_at.to_rfc3339())),
        };
        let post = NewVersion {
            file_id: held.file_id(),
            content: target.content.clone(),
            created_by: author,
            description: Some(format!("Reverted to version {}", target.id)),
        };
        let (pre_revert, file, version) = self.storage.restore(pre, &target.content, post).await?;

        let delivered = registry
            .publish(file.id, ServerMessage::ContentUpdate { content: file.content.clone() })
            .await;
        drop(held);

        info!(file_id = %target.file_id, version = %target.id, delivered, "file reverted");
        Ok(RevertOutcome { pre_revert, version, file, delivered })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn store_with_file(content: &str) -> (VersionStore, Storage, Uuid) {
        let storage = Storage::memory();
        let file = storage.create_file("main.js", "javascript", content).await.unwrap();
        (VersionStore::new(storage.clone()), storage, file.id)
    }

    #[tokio::test]
    async fn snapshots_only_ever_grow_the_log() {
        let (versions, _, file) = store_with_file("").await;
        let mut last_len = 0;
        for i in 0..5 {
            versions.snapshot(file, format!("v{i}"), Some("alice".into()), None).await.unwrap();
            let len = versions.list(file).await.unwrap().len();
            assert!(len > last_len);
            last_len = len;
        }
        let listed = versions.list(file).await.unwrap();
        assert_eq!(listed.first().unwrap().content, "v4");
        assert_eq!(listed.last().unwrap().content, "v0");
    }

    #[tokio::test]
    async fn snapshot_of_unknown_file_is_not_found() {
        let versions = VersionStore::new(Storage::memory());
        let err = versions.snapshot(Uuid::new_v4(), "x".into(), None, None).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn revert_restores_content_and_keeps_history() {
        let (versions, storage, file) = store_with_file("").await;
        let v1 = versions.snapshot(file, "a".into(), Some("alice".into()), None).await.unwrap();
        storage.write_content(file, "b").await.unwrap();
        let v2 = versions.snapshot(file, "b".into(), Some("alice".into()), None).await.unwrap();

        let outcome = versions.revert(v1.id, Some("bob".into()), &HubRegistry::new(8)).await.unwrap();

        assert_eq!(storage.get_file(file).await.unwrap().unwrap().content, "a");
        assert_eq!(outcome.file.content, "a");
        assert_eq!(outcome.pre_revert.content, "b");
        assert_eq!(outcome.version.content, "a");
        assert_eq!(outcome.version.created_by.as_deref(), Some("bob"));

        let listed = versions.list(file).await.unwrap();
        assert_eq!(listed.len(), 4);
        assert_eq!(listed[0].id, outcome.version.id);
        assert_eq!(listed[1].id, outcome.pre_revert.id);
        assert!(listed.iter().any(|v| v.id == v1.id));
        assert!(listed.iter().any(|v| v.id == v2.id));
    }

    #[tokio::test]
    async fn revert_of_missing_version_is_not_found() {
        let (versions, _, file) = store_with_file("x").await;
        let err = versions.revert(Uuid::new_v4(), None, &HubRegistry::new(8)).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
        assert!(versions.list(file).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn revert_pushes_restored_content_to_live_sessions() {
        let (versions, _, file) = store_with_file("").await;
        let v1 = versions.snapshot(file, "a".into(), None, None).await.unwrap();
        let registry = HubRegistry::new(8);
        let hub = registry.acquire(file).await;
        let mut mailbox = hub.lock().await.join(1, None, None);

        let outcome = versions.revert(v1.id, None, &registry).await.unwrap();

        assert_eq!(outcome.delivered, 1);
        assert_eq!(mailbox.drain(), vec![ServerMessage::ContentUpdate { content: "a".into() }]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_reverts_leave_editors_on_the_stored_content() {
        let (versions, storage, file) = store_with_file("").await;
        let registry = Arc::new(HubRegistry::new(256));
        let hub = registry.acquire(file).await;
        let mut mailbox = hub.lock().await.join(1, None, None);

        let targets = [
            versions.snapshot(file, "a".into(), None, None).await.unwrap(),
            versions.snapshot(file, "b".into(), None, None).await.unwrap(),
        ];
        for _ in 0..20 {
            let tasks: Vec<_> = targets
                .iter()
                .map(|target| {
                    let versions = versions.clone();
                    let registry = registry.clone();
                    let id = target.id;
                    tokio::spawn(async move { versions.revert(id, None, &registry).await.unwrap() })
                })
                .collect();
            for task in tasks {
                task.await.unwrap();
            }

            let stored = storage.get_file(file).await.unwrap().unwrap().content;
            let pushed = mailbox.drain();
            assert_eq!(pushed.len(), 2);
            assert_eq!(pushed.last(), Some(&ServerMessage::ContentUpdate { content: stored }));
        }
    }

    #[tokio::test]
    async fn concurrent_snapshots_all_land() {
        let (versions, _, file) = store_with_file("").await;
        let mut tasks = Vec::new();
        for i in 0..20 {
            let versions = versions.clone();
            tasks.push(tokio::spawn(async move {
                versions.snapshot(file, format!("edit {i}"), None, None).await.unwrap()
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }
        let listed = versions.list(file).await.unwrap();
        assert_eq!(listed.len(), 20);
        for i in 0..20 {
            assert!(listed.iter().any(|v| v.content == format!("edit {i}")));
        }
        assert_eq!(versions.locks.len(), 0);
    }

    #[tokio::test]
    async fn file_lock_serializes_holders() {
        let locks = Arc::new(FileLocks::default());
        let file = Uuid::new_v4();
        let held = locks.lock(file).await;

        let waiter = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let _g = locks.lock(file).await;
            })
        };
        tokio::task::yield_now().await;
        assert!(!waiter.is_finished());
        drop(held);
        waiter.await.unwrap();
        assert_eq!(locks.len(), 0);
    }
}
