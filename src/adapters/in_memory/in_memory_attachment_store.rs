// In memory implementation of the AttachmentStore port.
//
// Purpose
// - Exercise the staged attachment protocol in handler tests.
//
// Responsibilities
// - Keep staged and finalized files apart, like the directory adapter.
// - `toggle_offline` fails every call; `toggle_fail_finalize` fails only the
//   move into the final location.

use crate::core::ports::{AttachmentStore, AttachmentStoreError, StagedAttachment, StagingSweep};
use crate::core::work_log::rules::storage_filename_for;
use async_trait::async_trait;
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;

#[derive(Default)]
struct Files {
    staged: BTreeMap<String, Vec<u8>>,
    finalized: BTreeMap<String, Vec<u8>>,
}

#[derive(Default)]
pub struct InMemoryAttachmentStore {
    files: Mutex<Files>,
    offline: AtomicBool,
    fail_finalize: AtomicBool,
}

impl InMemoryAttachmentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn toggle_offline(&self) {
        self.offline.fetch_xor(true, Ordering::SeqCst);
    }

    pub fn toggle_fail_finalize(&self) {
        self.fail_finalize.fetch_xor(true, Ordering::SeqCst);
    }

    pub async fn staged_names(&self) -> Vec<String> {
        self.files.lock().await.staged.keys().cloned().collect()
    }

    pub async fn finalized_names(&self) -> Vec<String> {
        self.files.lock().await.finalized.keys().cloned().collect()
    }

    pub async fn read(&self, storage_filename: &str) -> Option<Vec<u8>> {
        self.files.lock().await.finalized.get(storage_filename).cloned()
    }

    fn check_online(&self) -> Result<(), AttachmentStoreError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(AttachmentStoreError::Backend("Attachment store offline".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl AttachmentStore for InMemoryAttachmentStore {
    async fn stage(
        &self,
        original_filename: &str,
        bytes: &[u8],
    ) -> Result<StagedAttachment, AttachmentStoreError> {
        self.check_online()?;
        let storage_filename = storage_filename_for(original_filename);
        self.files
            .lock()
            .await
            .staged
            .insert(storage_filename.clone(), bytes.to_vec());
        Ok(StagedAttachment {
            storage_filename,
            original_filename: original_filename.to_string(),
        })
    }

    async fn finalize(&self, staged: &StagedAttachment) -> Result<(), AttachmentStoreError> {
        self.check_online()?;
        if self.fail_finalize.load(Ordering::SeqCst) {
            return Err(AttachmentStoreError::Backend("Attachment finalize failed".into()));
        }
        let mut files = self.files.lock().await;
        let bytes = files
            .staged
            .remove(&staged.storage_filename)
            .ok_or_else(|| AttachmentStoreError::NotStaged(staged.storage_filename.clone()))?;
        files.finalized.insert(staged.storage_filename.clone(), bytes);
        Ok(())
    }

    async fn discard(&self, staged: &StagedAttachment) -> Result<(), AttachmentStoreError> {
        self.check_online()?;
        self.files.lock().await.staged.remove(&staged.storage_filename);
        Ok(())
    }

    async fn remove(&self, storage_filename: &str) -> Result<bool, AttachmentStoreError> {
        self.check_online()?;
        Ok(self
            .files
            .lock()
            .await
            .finalized
            .remove(storage_filename)
            .is_some())
    }

    async fn exists(&self, storage_filename: &str) -> Result<bool, AttachmentStoreError> {
        self.check_online()?;
        Ok(self.files.lock().await.finalized.contains_key(storage_filename))
    }

    async fn sweep_staging(&self, referenced: &HashSet<String>) -> Result<StagingSweep, AttachmentStoreError> {
        self.check_online()?;
        let mut files = self.files.lock().await;
        let mut sweep = StagingSweep::default();
        for (name, bytes) in std::mem::take(&mut files.staged) {
            if referenced.contains(&name) {
                files.finalized.insert(name, bytes);
                sweep.finalized += 1;
            } else {
                sweep.removed += 1;
            }
        }
        Ok(sweep)
    }
}
