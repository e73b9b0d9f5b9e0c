// Directory backed implementation of the AttachmentStore port.
//
// Layout
// - `<root>/<storage_filename>` for attachments referenced by a persisted entry.
// - `<root>/.staging/<storage_filename>` for bytes written ahead of the
//   snapshot that will reference them.
//
// Staged files are moved into place with a rename, so a final file is either
// complete or absent. Partial staged files are removed when a write fails.

use crate::core::ports::{AttachmentStore, AttachmentStoreError, StagedAttachment, StagingSweep};
use crate::core::work_log::rules::storage_filename_for;
use async_trait::async_trait;
use std::collections::HashSet;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;

const STAGING_DIR: &str = ".staging";

pub struct FileAttachmentStore {
    root: PathBuf,
}

impl FileAttachmentStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn staging_dir(&self) -> PathBuf {
        self.root.join(STAGING_DIR)
    }

    fn checked_name(storage_filename: &str) -> Result<&str, AttachmentStoreError> {
        let is_plain = !storage_filename.is_empty()
            && !storage_filename.contains(['/', '\\'])
            && storage_filename != "."
            && storage_filename != ".."
            && storage_filename != STAGING_DIR;
        if !is_plain {
            return Err(AttachmentStoreError::Backend(format!(
                "invalid storage filename '{storage_filename}'"
            )));
        }
        Ok(storage_filename)
    }

    /// Final location of an attachment, if it exists.
    pub async fn path_of(&self, storage_filename: &str) -> Result<Option<PathBuf>, AttachmentStoreError> {
        let path = self.root.join(Self::checked_name(storage_filename)?);
        match fs::try_exists(&path).await {
            Ok(true) => Ok(Some(path)),
            Ok(false) => Ok(None),
            Err(e) => Err(AttachmentStoreError::io(path, e)),
        }
    }

    async fn write_new(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
        let mut file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
            .await?;
        file.write_all(bytes).await?;
        file.flush().await?;
        file.sync_all().await?;
        Ok(())
    }
}

#[async_trait]
impl AttachmentStore for FileAttachmentStore {
    async fn stage(
        &self,
        original_filename: &str,
        bytes: &[u8],
    ) -> Result<StagedAttachment, AttachmentStoreError> {
        let staging = self.staging_dir();
        fs::create_dir_all(&staging)
            .await
            .map_err(|e| AttachmentStoreError::io(&staging, e))?;

        let storage_filename = storage_filename_for(original_filename);
        let path = staging.join(&storage_filename);
        if let Err(e) = Self::write_new(&path, bytes).await {
            let _ = fs::remove_file(&path).await;
            return Err(AttachmentStoreError::io(path, e));
        }
        tracing::debug!(storage_filename = %storage_filename, bytes = bytes.len(), "attachment staged");
        Ok(StagedAttachment {
            storage_filename,
            original_filename: original_filename.to_string(),
        })
    }

    async fn finalize(&self, staged: &StagedAttachment) -> Result<(), AttachmentStoreError> {
        let name = Self::checked_name(&staged.storage_filename)?;
        let from = self.staging_dir().join(name);
        let to = self.root.join(name);
        match fs::rename(&from, &to).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(AttachmentStoreError::NotStaged(name.to_string()))
            }
            Err(e) => Err(AttachmentStoreError::io(to, e)),
        }
    }

    async fn discard(&self, staged: &StagedAttachment) -> Result<(), AttachmentStoreError> {
        let path = self
            .staging_dir()
            .join(Self::checked_name(&staged.storage_filename)?);
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(AttachmentStoreError::io(path, e)),
        }
    }

    async fn remove(&self, storage_filename: &str) -> Result<bool, AttachmentStoreError> {
        let path = self.root.join(Self::checked_name(storage_filename)?);
        match fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(AttachmentStoreError::io(path, e)),
        }
    }

    async fn exists(&self, storage_filename: &str) -> Result<bool, AttachmentStoreError> {
        Ok(self.path_of(storage_filename).await?.is_some())
    }

    async fn sweep_staging(&self, referenced: &HashSet<String>) -> Result<StagingSweep, AttachmentStoreError> {
        let staging = self.staging_dir();
        let mut entries = match fs::read_dir(&staging).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(StagingSweep::default()),
            Err(e) => return Err(AttachmentStoreError::io(staging, e)),
        };
        let mut sweep = StagingSweep::default();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| AttachmentStoreError::io(&staging, e))?
        {
            let path = entry.path();
            let name = entry.file_name().to_string_lossy().into_owned();
            if referenced.contains(&name) {
                // A crash hit between the persist and the move into place.
                match fs::rename(&path, self.root.join(&name)).await {
                    Ok(()) => sweep.finalized += 1,
                    Err(e) => tracing::error!(path = %path.display(), error = %e, "could not move referenced staged attachment into place"),
                }
                continue;
            }
            match fs::remove_file(&path).await {
                Ok(()) => sweep.removed += 1,
                Err(e) => tracing::warn!(path = %path.display(), error = %e, "could not remove leftover staged attachment"),
            }
        }
        if sweep != StagingSweep::default() {
            tracing::info!(finalized = sweep.finalized, removed = sweep.removed, "settled leftover staged attachments");
        }
        Ok(sweep)
    }
}
