// Attachment steps shared by the command handlers.
//
// Cleanup of staged or replaced files never fails the command. Errors are
// logged, and leftover staged files are settled at the next startup.

use crate::application::errors::ApplicationError;
use crate::application::repository::UnitOfWork;
use crate::core::ports::{AttachmentStore, SnapshotStore, StagedAttachment};
use crate::core::work_log::commands::InvoiceUpload;
use crate::core::work_log::rules::AttachmentPolicy;

/// Checks the upload against the policy, then writes it to the staging area.
pub async fn stage_checked<A: AttachmentStore + ?Sized>(
    attachments: &A,
    policy: &AttachmentPolicy,
    upload: &InvoiceUpload,
) -> Result<StagedAttachment, ApplicationError> {
    policy.check(&upload.original_filename, &upload.bytes)?;
    Ok(attachments
        .stage(&upload.original_filename, &upload.bytes)
        .await?)
}

pub async fn discard_quietly<A: AttachmentStore + ?Sized>(attachments: &A, staged: &StagedAttachment) {
    if let Err(e) = attachments.discard(staged).await {
        tracing::warn!(storage_filename = %staged.storage_filename, error = %e, "could not discard staged attachment");
    }
}

pub async fn remove_quietly<A: AttachmentStore + ?Sized>(attachments: &A, storage_filename: &str) {
    match attachments.remove(storage_filename).await {
        Ok(true) => tracing::debug!(storage_filename, "attachment removed"),
        Ok(false) => tracing::warn!(storage_filename, "attachment to remove was already gone"),
        Err(e) => tracing::warn!(storage_filename, error = %e, "could not remove attachment"),
    }
}

/// Undoes a persisted change whose staged file could not be finalized.
///
/// The staged file is dropped only after the store stops referencing it. If
/// the compensating write fails, the file stays staged and the next startup
/// moves it into place for the entry that still names it.
pub async fn revert_and_discard<S, A>(unit: UnitOfWork<'_, S>, attachments: &A, staged: &StagedAttachment)
where
    S: SnapshotStore,
    A: AttachmentStore + ?Sized,
{
    match unit.revert().await {
        Ok(()) => discard_quietly(attachments, staged).await,
        Err(e) => tracing::error!(
            storage_filename = %staged.storage_filename,
            error = %e,
            "change stays persisted; staged attachment kept for the next startup"
        ),
    }
}
