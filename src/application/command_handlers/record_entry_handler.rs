// Record entry command handler orchestrates the write flow.
//
// Responsibilities
// - Check and stage the invoice before the snapshot is touched.
// - Resolve or create the matter and insert the entry in one unit of work.
// - Persist, then move the staged invoice into place.
// - On any failure leave the store as it was: roll back the unit, write the
//   pre-image back if it was already persisted, and discard the staged file.
//   If the pre-image cannot be written, the staged file is kept so the entry
//   that still names it can be completed at the next startup.

use crate::application::command_handlers::staging::{discard_quietly, revert_and_discard, stage_checked};
use crate::application::errors::ApplicationError;
use crate::application::repository::{Repository, UnitOfWork};
use crate::core::ports::{AttachmentStore, SnapshotStore, StagedAttachment};
use crate::core::work_log::commands::{EntryDraft, RecordEntry};
use crate::core::work_log::model::Entry;
use crate::core::work_log::rules::AttachmentPolicy;
use crate::shared::core::primitives::now;
use std::sync::Arc;

pub struct RecordEntryHandler<TStore, TAttachments>
where
    TStore: SnapshotStore + 'static,
    TAttachments: AttachmentStore + 'static,
{
    repository: Arc<Repository<TStore>>,
    attachments: Arc<TAttachments>,
    policy: AttachmentPolicy,
}

impl<TStore, TAttachments> RecordEntryHandler<TStore, TAttachments>
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

    pub async fn handle(&self, command: RecordEntry) -> Result<Entry, ApplicationError> {
        let staged = match &command.invoice {
            Some(upload) => Some(stage_checked(&*self.attachments, &self.policy, upload).await?),
            None => None,
        };

        let mut unit = self.repository.begin().await;
        let entry = match insert_and_persist(&mut unit, &command.draft, staged.as_ref()).await {
            Ok(entry) => entry,
            Err(e) => {
                drop(unit);
                if let Some(staged) = &staged {
                    discard_quietly(&*self.attachments, staged).await;
                }
                tracing::debug!(error = %e, "record entry rolled back");
                return Err(e);
            }
        };

        if let Some(staged) = &staged {
            if let Err(e) = self.attachments.finalize(staged).await {
                tracing::warn!(entry_id = %entry.id, error = %e, "invoice could not be moved into place, reverting entry");
                revert_and_discard(unit, &*self.attachments, staged).await;
                return Err(e.into());
            }
        }
        unit.finish();

        tracing::info!(
            entry_id = %entry.id,
            matter_id = %entry.matter_id,
            week = entry.week_index,
            minutes = entry.total_minutes,
            invoice = staged.is_some(),
            "entry recorded"
        );
        Ok(entry)
    }
}

async fn insert_and_persist<S: SnapshotStore>(
    unit: &mut UnitOfWork<'_, S>,
    draft: &EntryDraft,
    staged: Option<&StagedAttachment>,
) -> Result<Entry, ApplicationError> {
    let entry = unit
        .snapshot_mut()
        .insert_entry(draft, staged.map(StagedAttachment::invoice_ref), now())?;
    unit.persist().await?;
    Ok(entry)
}

#[cfg(test)]
mod record_entry_handler_tests {
    use super::*;
    use crate::adapters::in_memory::in_memory_attachment_store::InMemoryAttachmentStore;
    use crate::adapters::in_memory::in_memory_snapshot_store::InMemorySnapshotStore;
    use crate::core::ports::{AttachmentStoreError, SnapshotStoreError};
    use crate::core::work_log::commands::MatterRef;
    use crate::core::work_log::model::Action;
    use crate::core::work_log::rules::ValidationError;
    use crate::test_support::fixtures::commands::record_entry::{PDF_BYTES, RecordEntryBuilder};
    use chrono::NaiveDate;
    use rstest::{fixture, rstest};

    type Handler = RecordEntryHandler<InMemorySnapshotStore, InMemoryAttachmentStore>;

    type BeforeEachReturn = (
        Handler,
        Arc<Repository<InMemorySnapshotStore>>,
        Arc<InMemorySnapshotStore>,
        Arc<InMemoryAttachmentStore>,
    );

    #[fixture]
    async fn before_each() -> BeforeEachReturn {
        let store = Arc::new(InMemorySnapshotStore::new());
        let attachments = Arc::new(InMemoryAttachmentStore::new());
        let (repository, _) = Repository::open(store.clone()).await.unwrap();
        let repository = Arc::new(repository);
        let handler = RecordEntryHandler::new(
            repository.clone(),
            attachments.clone(),
            AttachmentPolicy::default(),
        );
        (handler, repository, store, attachments)
    }

    #[rstest]
    #[tokio::test]
    async fn handle_record_creates_matter_entry_and_invoice(#[future] before_each: BeforeEachReturn) {
        let (handler, repository, store, attachments) = before_each.await;
        let entry = handler
            .handle(RecordEntryBuilder::new().build())
            .await
            .expect("handle failed");

        assert_eq!(entry.total_minutes, 120);
        assert_eq!(entry.week_index, 3);
        let matter = repository.get_matter_by_name("acme corp").await.unwrap();
        assert_eq!(matter.id, entry.matter_id);
        assert_eq!(matter.case_type.as_deref(), Some("Litigation"));

        let invoice = entry.invoice_ref.clone().unwrap();
        assert_eq!(invoice.original_filename, "invoice.pdf");
        assert_eq!(attachments.read(&invoice.storage_filename).await.as_deref(), Some(PDF_BYTES));
        assert!(attachments.staged_names().await.is_empty());
        assert_eq!(store.persist_count(), 1);

        let (reopened, _) = Repository::open(store).await.unwrap();
        assert_eq!(reopened.get_entry(&entry.id).await, Some(entry));
    }

    #[rstest]
    #[tokio::test]
    async fn handle_record_without_invoice(#[future] before_each: BeforeEachReturn) {
        let (handler, _, _, attachments) = before_each.await;
        let entry = handler
            .handle(RecordEntryBuilder::new().without_invoice().build())
            .await
            .unwrap();
        assert!(entry.invoice_ref.is_none());
        assert!(attachments.finalized_names().await.is_empty());
    }

    #[rstest]
    #[tokio::test]
    async fn handle_record_rolls_back_when_the_store_is_offline(#[future] before_each: BeforeEachReturn) {
        let (handler, repository, store, attachments) = before_each.await;
        store.toggle_offline();
        let result = handler.handle(RecordEntryBuilder::new().build()).await;

        assert_eq!(
            result.unwrap_err().to_string(),
            ApplicationError::Store(SnapshotStoreError::Backend("Snapshot store offline".into())).to_string()
        );
        assert!(repository.list_matters().await.is_empty());
        assert!(repository.snapshot().await.entries.is_empty());
        assert!(attachments.staged_names().await.is_empty());
        assert!(attachments.finalized_names().await.is_empty());
    }

    #[rstest]
    #[tokio::test]
    async fn handle_record_reverts_when_the_invoice_cannot_be_finalized(
        #[future] before_each: BeforeEachReturn,
    ) {
        let (handler, repository, store, attachments) = before_each.await;
        attachments.toggle_fail_finalize();
        let result = handler.handle(RecordEntryBuilder::new().build()).await;

        assert_eq!(
            result.unwrap_err().to_string(),
            ApplicationError::Attachment(AttachmentStoreError::Backend("Attachment finalize failed".into()))
                .to_string()
        );
        assert!(repository.snapshot().await.entries.is_empty());
        assert!(attachments.staged_names().await.is_empty());

        let (reopened, _) = Repository::open(store).await.unwrap();
        assert!(reopened.snapshot().await.entries.is_empty());
        assert!(reopened.list_matters().await.is_empty());
    }

    #[rstest]
    #[tokio::test]
    async fn handle_record_keeps_the_staged_invoice_when_the_revert_cannot_be_written(
        #[future] before_each: BeforeEachReturn,
    ) {
        let (handler, repository, store, attachments) = before_each.await;
        store.fail_persists_after(1);
        attachments.toggle_fail_finalize();
        let result = handler.handle(RecordEntryBuilder::new().build()).await;
        assert!(matches!(result, Err(ApplicationError::Attachment(_))));

        let in_memory = repository.snapshot().await;
        let (reopened, _) = Repository::open(store).await.unwrap();
        assert_eq!(reopened.snapshot().await, in_memory);

        let entry = in_memory.entries.values().next().unwrap();
        let invoice = entry.invoice_ref.clone().unwrap();
        assert_eq!(attachments.staged_names().await, vec![invoice.storage_filename]);
        assert!(attachments.finalized_names().await.is_empty());
    }

    #[rstest]
    #[tokio::test]
    async fn handle_record_rejects_an_oversized_invoice_before_writing(
        #[future] before_each: BeforeEachReturn,
    ) {
        let (_, repository, store, attachments) = before_each.await;
        let handler = RecordEntryHandler::new(repository.clone(), attachments.clone(), AttachmentPolicy::new(8));
        let result = handler.handle(RecordEntryBuilder::new().build()).await;

        assert!(matches!(
            result,
            Err(ApplicationError::Validation(ValidationError::AttachmentTooLarge { max: 8, .. }))
        ));
        assert!(attachments.staged_names().await.is_empty());
        assert_eq!(store.persist_count(), 0);
    }

    #[rstest]
    #[case(RecordEntryBuilder::new().actions(vec![Action::new("Research", 20)]).build())]
    #[case(RecordEntryBuilder::new().actions(vec![]).build())]
    #[case(RecordEntryBuilder::new().entry_date(NaiveDate::from_ymd_opt(2025, 1, 1).unwrap()).build())]
    #[case(RecordEntryBuilder::new().matter(MatterRef::existing("missing")).build())]
    #[case(RecordEntryBuilder::new().invoice("payload.exe", b"MZ".to_vec()).build())]
    #[case(RecordEntryBuilder::new().invoice("invoice.pdf", b"PK\x03\x04".to_vec()).build())]
    #[tokio::test]
    async fn handle_record_rejects_invalid_commands_without_side_effects(
        #[future] before_each: BeforeEachReturn,
        #[case] command: RecordEntry,
    ) {
        let (handler, repository, store, attachments) = before_each.await;
        let result = handler.handle(command).await;

        assert!(matches!(result, Err(ApplicationError::Validation(_))));
        assert!(repository.list_matters().await.is_empty());
        assert_eq!(store.persist_count(), 0);
        assert!(attachments.staged_names().await.is_empty());
        assert!(attachments.finalized_names().await.is_empty());
    }
}
