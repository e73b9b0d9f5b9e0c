// Ports define what the core needs from the outside world, without implementing it.
//
// Purpose
// - Describe the durable snapshot file and the attachment directory as traits.
//
// Responsibilities
// - Keep the repository and command handlers independent of the file system.
//
// Boundaries
// - No concrete input or output here. Adapters implement these traits in the adapters layer.
//
// Testing guidance
// - In memory implementations with failure switches live in adapters/in_memory.

use crate::core::work_log::model::InvoiceRef;
use async_trait::async_trait;
use std::collections::HashSet;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SnapshotStoreError {
    #[error("i/o error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("could not encode snapshot: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("backend error: {0}")]
    Backend(String),
}

impl SnapshotStoreError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Whole-file storage of the encoded snapshot.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// `None` when nothing has been persisted yet.
    async fn load(&self) -> Result<Option<String>, SnapshotStoreError>;

    async fn load_backup(&self) -> Result<Option<String>, SnapshotStoreError>;

    /// Replaces the stored contents atomically. Readers see either the old
    /// or the new contents, never a mix.
    async fn persist(&self, contents: &str) -> Result<(), SnapshotStoreError>;

    /// Replaces the primary with the backup contents, leaving the backup as
    /// it is. Returns false when there is no backup.
    async fn restore_backup(&self) -> Result<bool, SnapshotStoreError>;

    /// Where the previous good snapshot is kept, for messages to the user.
    fn backup_location(&self) -> String;
}

#[derive(Debug, Error)]
pub enum AttachmentStoreError {
    #[error("i/o error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("no staged attachment named {0}")]
    NotStaged(String),

    #[error("backend error: {0}")]
    Backend(String),
}

impl AttachmentStoreError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Attachment bytes written outside the final location, waiting for the
/// snapshot that references them to be persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedAttachment {
    pub storage_filename: String,
    pub original_filename: String,
}

impl StagedAttachment {
    pub fn invoice_ref(&self) -> InvoiceRef {
        InvoiceRef {
            storage_filename: self.storage_filename.clone(),
            original_filename: self.original_filename.clone(),
        }
    }
}

/// Outcome of settling the staging area at startup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StagingSweep {
    pub finalized: usize,
    pub removed: usize,
}

#[async_trait]
pub trait AttachmentStore: Send + Sync {
    /// Writes the bytes under a fresh unique storage name in the staging area.
    async fn stage(&self, original_filename: &str, bytes: &[u8])
    -> Result<StagedAttachment, AttachmentStoreError>;

    /// Moves a staged file into its final location.
    async fn finalize(&self, staged: &StagedAttachment) -> Result<(), AttachmentStoreError>;

    /// Drops a staged file. Missing files are not an error.
    async fn discard(&self, staged: &StagedAttachment) -> Result<(), AttachmentStoreError>;

    /// Deletes a finalized file. Returns false when it did not exist.
    async fn remove(&self, storage_filename: &str) -> Result<bool, AttachmentStoreError>;

    async fn exists(&self, storage_filename: &str) -> Result<bool, AttachmentStoreError>;

    /// Settles staged files left behind by an interrupted process. Names in
    /// `referenced` already belong to a persisted entry and are moved into
    /// place; every other staged file is deleted.
    async fn sweep_staging(&self, referenced: &HashSet<String>) -> Result<StagingSweep, AttachmentStoreError>;
}
