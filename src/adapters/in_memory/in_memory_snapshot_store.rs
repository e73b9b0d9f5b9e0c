// In memory implementation of the SnapshotStore port.
//
// Purpose
// - Support repository and command handler tests without touching the disk.
//
// Responsibilities
// - Keep the current contents and the previous contents (the backup).
// - Count successful persists so tests can assert that nothing was written.
// - Fail on demand with `toggle_offline`, or only the writes after a number
//   of successful ones with `fail_persists_after`.

use crate::core::ports::{SnapshotStore, SnapshotStoreError};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::RwLock;

#[derive(Default)]
struct Files {
    primary: Option<String>,
    backup: Option<String>,
}

#[derive(Default)]
pub struct InMemorySnapshotStore {
    files: RwLock<Files>,
    offline: AtomicBool,
    persists: AtomicUsize,
    // 0 means unlimited.
    persist_limit: AtomicUsize,
}

impl InMemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_contents(contents: impl Into<String>) -> Self {
        Self {
            files: RwLock::new(Files {
                primary: Some(contents.into()),
                backup: None,
            }),
            ..Self::default()
        }
    }

    pub fn with_backup(mut self, contents: impl Into<String>) -> Self {
        self.files.get_mut().backup = Some(contents.into());
        self
    }

    pub fn toggle_offline(&self) {
        self.offline.fetch_xor(true, Ordering::SeqCst);
    }

    /// Lets the next `successes` persists through and fails the ones after.
    pub fn fail_persists_after(&self, successes: usize) {
        self.persist_limit
            .store(self.persist_count() + successes + 1, Ordering::SeqCst);
    }

    pub fn persist_count(&self) -> usize {
        self.persists.load(Ordering::SeqCst)
    }

    pub async fn contents(&self) -> Option<String> {
        self.files.read().await.primary.clone()
    }

    fn check_online(&self) -> Result<(), SnapshotStoreError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(SnapshotStoreError::Backend("Snapshot store offline".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl SnapshotStore for InMemorySnapshotStore {
    async fn load(&self) -> Result<Option<String>, SnapshotStoreError> {
        self.check_online()?;
        Ok(self.files.read().await.primary.clone())
    }

    async fn load_backup(&self) -> Result<Option<String>, SnapshotStoreError> {
        self.check_online()?;
        Ok(self.files.read().await.backup.clone())
    }

    async fn persist(&self, contents: &str) -> Result<(), SnapshotStoreError> {
        self.check_online()?;
        let limit = self.persist_limit.load(Ordering::SeqCst);
        if limit != 0 && self.persist_count() + 1 >= limit {
            return Err(SnapshotStoreError::Backend("Snapshot store write failed".into()));
        }
        let mut files = self.files.write().await;
        let previous = files.primary.replace(contents.to_string());
        files.backup = previous;
        self.persists.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn restore_backup(&self) -> Result<bool, SnapshotStoreError> {
        self.check_online()?;
        let mut files = self.files.write().await;
        let Some(backup) = files.backup.clone() else {
            return Ok(false);
        };
        files.primary = Some(backup);
        self.persists.fetch_add(1, Ordering::SeqCst);
        Ok(true)
    }

    fn backup_location(&self) -> String {
        "memory://worklog.json.bak".to_string()
    }
}
