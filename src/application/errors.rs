use crate::core::ports::{AttachmentStoreError, SnapshotStoreError};
use crate::core::work_log::rules::ValidationError;
use crate::core::work_log::schema::CorruptionError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApplicationError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("store file is corrupt: {source}. The previous good snapshot is kept at {backup}")]
    Corruption {
        #[source]
        source: CorruptionError,
        backup: String,
    },

    #[error("no backup snapshot found at {0}")]
    NoBackup(String),

    #[error(transparent)]
    Store(#[from] SnapshotStoreError),

    #[error(transparent)]
    Attachment(#[from] AttachmentStoreError),

    #[error("unexpected: {0}")]
    Unexpected(String),
}
