use crate::adapters::file_system::file_attachment_store::FileAttachmentStore;
use crate::adapters::file_system::file_snapshot_store::FileSnapshotStore;
use crate::application::command_handlers::amend_entry_handler::AmendEntryHandler;
use crate::application::command_handlers::delete_entry_handler::DeleteEntryHandler;
use crate::application::command_handlers::record_entry_handler::RecordEntryHandler;
use crate::application::errors::ApplicationError;
use crate::application::query_handlers::work_log_queries::WorkLogQueries;
use crate::application::repository::Repository;
use crate::core::ports::AttachmentStore;
use crate::core::work_log::model::Snapshot;
use crate::core::work_log::schema::LoadReport;
use crate::shell::config::WorkLogConfig;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub repository: Arc<Repository<FileSnapshotStore>>,
    pub queries: Arc<dyn WorkLogQueries>,
    pub attachments: Arc<FileAttachmentStore>,
    pub record_handler: Arc<RecordEntryHandler<FileSnapshotStore, FileAttachmentStore>>,
    pub amend_handler: Arc<AmendEntryHandler<FileSnapshotStore, FileAttachmentStore>>,
    pub delete_handler: Arc<DeleteEntryHandler<FileSnapshotStore, FileAttachmentStore>>,
}

impl AppState {
    /// Loads the store, then settles attachments left in staging by an
    /// interrupted run: files a loaded entry refers to are moved into place,
    /// the rest are deleted. With `recover` the primary is replaced by the
    /// backup first.
    pub async fn open(
        config: &WorkLogConfig,
        recover: bool,
    ) -> Result<(Self, LoadReport), ApplicationError> {
        let store = Arc::new(FileSnapshotStore::new(&config.data_file));
        let (repository, report) = if recover {
            Repository::recover_from_backup(store).await?
        } else {
            Repository::open(store).await?
        };
        let repository = Arc::new(repository);

        let attachments = Arc::new(FileAttachmentStore::new(&config.invoices_dir));
        let referenced = repository.read(Snapshot::invoice_filenames).await;
        attachments.sweep_staging(&referenced).await?;
        let policy = config.attachment_policy();

        let state = Self {
            queries: repository.clone(),
            record_handler: Arc::new(RecordEntryHandler::new(
                repository.clone(),
                attachments.clone(),
                policy,
            )),
            amend_handler: Arc::new(AmendEntryHandler::new(
                repository.clone(),
                attachments.clone(),
                policy,
            )),
            delete_handler: Arc::new(DeleteEntryHandler::new(
                repository.clone(),
                attachments.clone(),
            )),
            repository,
            attachments,
        };
        Ok((state, report))
    }
}
