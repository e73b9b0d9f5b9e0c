// Delete entry command handler.
//
// The record is removed and persisted first; its invoice file is deleted
// afterwards on a best-effort basis.

use crate::application::command_handlers::staging::remove_quietly;
use crate::application::errors::ApplicationError;
use crate::application::repository::Repository;
use crate::core::ports::{AttachmentStore, SnapshotStore};
use crate::core::work_log::model::Entry;
use std::sync::Arc;

pub struct DeleteEntryHandler<TStore, TAttachments>
where
    TStore: SnapshotStore + 'static,
    TAttachments: AttachmentStore + 'static,
{
    repository: Arc<Repository<TStore>>,
    attachments: Arc<TAttachments>,
}

impl<TStore, TAttachments> DeleteEntryHandler<TStore, TAttachments>
where
    TStore: SnapshotStore + 'static,
    TAttachments: AttachmentStore + 'static,
{
    pub fn new(repository: Arc<Repository<TStore>>, attachments: Arc<TAttachments>) -> Self {
        Self {
            repository,
            attachments,
        }
    }

    pub async fn handle(&self, entry_id: &str) -> Result<Entry, ApplicationError> {
        let entry = self.repository.delete_entry(entry_id).await?;
        if let Some(invoice) = &entry.invoice_ref {
            remove_quietly(&*self.attachments, &invoice.storage_filename).await;
        }
        Ok(entry)
    }
}
