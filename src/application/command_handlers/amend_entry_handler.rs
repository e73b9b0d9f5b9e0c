// Amend entry command handler.
//
// Responsibilities
// - Replace date, matter and actions of an entry and apply the invoice change.
// - A new invoice is staged first and finalized after the persist, the same
//   way a new entry is recorded.
// - The file that was replaced or removed is deleted only once the updated
//   record is durable, so a failed amend never loses the old invoice.

use crate::application::command_handlers::staging::{
    discard_quietly, remove_quietly, revert_and_discard, stage_checked,
};
use crate::application::errors::ApplicationError;
use crate::application::repository::{Repository, UnitOfWork};
use crate::core::ports::{AttachmentStore, SnapshotStore, StagedAttachment};
use crate::core::work_log::commands::{AmendEntry, InvoiceChange};
use crate::core::work_log::model::{Entry, InvoiceRef};
use crate::core::work_log::rules::{AttachmentPolicy, ValidationError};
use crate::shared::core::primitives::now;
use std::sync::Arc;

pub struct AmendEntryHandler<TStore, TAttachments>
where
    TStore: SnapshotStore + 'static,
    TAttachments: AttachmentStore + 'static,
{
    repository: Arc<Repository<TStore>>,
    attachments: Arc<TAttachments>,
    policy: AttachmentPolicy,
}

impl<TStore, TAttachments> AmendEntryHandler<TStore, TAttachments>
where
    TStore: SnapshotStore + 'static,
    TAttachments: AttachmentStore + 'static,
{
    pub fn new(
        repository: Arc<Repository<TStore>>,
        attachments: Arc<TAttachments>,
        policy: AttachmentPolicy,
    ) -> Self {
        Self {
            repository,
            attachments,
            policy,
        }
    }

    pub async fn handle(&self, command: AmendEntry) -> Result<Entry, ApplicationError> {
        let staged = match &command.invoice {
            InvoiceChange::Replace(upload) => {
                Some(stage_checked(&*self.attachments, &self.policy, upload).await?)
            }
            InvoiceChange::Keep | InvoiceChange::Remove => None,
        };

        let mut unit = self.repository.begin().await;
        let (entry, previous) = match amend_and_persist(&mut unit, &command, staged.as_ref()).await {
            Ok(amended) => amended,
            Err(e) => {
                drop(unit);
                if let Some(staged) = &staged {
                    discard_quietly(&*self.attachments, staged).await;
                }
                tracing::debug!(entry_id = %command.entry_id, error = %e, "amend entry rolled back");
                return Err(e);
            }
        };

        if let Some(staged) = &staged {
            if let Err(e) = self.attachments.finalize(staged).await {
                tracing::warn!(entry_id = %entry.id, error = %e, "replacement invoice could not be moved into place, reverting entry");
                revert_and_discard(unit, &*self.attachments, staged).await;
                return Err(e.into());
            }
        }
        unit.finish();

        let still_referenced = entry
            .invoice_ref
            .as_ref()
            .map(|current| current.storage_filename.as_str());
        if let Some(previous) = previous {
            if still_referenced != Some(previous.storage_filename.as_str()) {
                remove_quietly(&*self.attachments, &previous.storage_filename).await;
            }
        }

        tracing::info!(
            entry_id = %entry.id,
            week = entry.week_index,
            minutes = entry.total_minutes,
            "entry amended"
        );
        Ok(entry)
    }
}

/// Returns the amended entry and the invoice reference it no longer holds.
async fn amend_and_persist<S: SnapshotStore>(
    unit: &mut UnitOfWork<'_, S>,
    command: &AmendEntry,
    staged: Option<&StagedAttachment>,
) -> Result<(Entry, Option<InvoiceRef>), ApplicationError> {
    let at = now();
    let snapshot = unit.snapshot_mut();
    snapshot.replace_entry(&command.entry_id, &command.draft, at)?;
    let previous = match &command.invoice {
        InvoiceChange::Keep => None,
        InvoiceChange::Remove => snapshot.set_invoice(&command.entry_id, None, at)?,
        InvoiceChange::Replace(_) => {
            snapshot.set_invoice(&command.entry_id, staged.map(StagedAttachment::invoice_ref), at)?
        }
    };
    let entry = snapshot
        .entry(&command.entry_id)
        .cloned()
        .ok_or_else(|| ValidationError::UnknownEntry {
            entry_id: command.entry_id.clone(),
        })?;
    unit.persist().await?;
    Ok((entry, previous))
}
