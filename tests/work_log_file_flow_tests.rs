// End to end test of the write flow against the file backed stores.
//
// Responsibilities
// - Record, amend and delete entries through the command handlers with a
//   real store file and attachment directory in a temp dir.
// - Assert on what is on disk: primary, backup, invoice files, no temp files.

use chrono::{NaiveDate, Utc};
use rstest::{fixture, rstest};
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;
use work_log::adapters::file_system::file_attachment_store::FileAttachmentStore;
use work_log::adapters::file_system::file_snapshot_store::FileSnapshotStore;
use work_log::application::command_handlers::amend_entry_handler::AmendEntryHandler;
use work_log::application::command_handlers::delete_entry_handler::DeleteEntryHandler;
use work_log::application::command_handlers::record_entry_handler::RecordEntryHandler;
use work_log::application::errors::ApplicationError;
use work_log::application::repository::Repository;
use work_log::core::ports::AttachmentStore;
use work_log::core::work_log::commands::{
    AmendEntry, EntryDraft, InvoiceChange, InvoiceUpload, MatterRef, RecordEntry,
};
use work_log::core::work_log::model::Action;
use work_log::core::work_log::rules::AttachmentPolicy;
use work_log::core::work_log::schema::ExclusionReason;
use work_log::shell::config::WorkLogConfig;
use work_log::shell::state::AppState;

const PDF: &[u8] = b"%PDF-1.4\n%%EOF";

struct Env {
    dir: TempDir,
}

impl Env {
    fn data_file(&self) -> std::path::PathBuf {
        self.dir.path().join("data").join("worklog.json")
    }

    fn invoices(&self) -> std::path::PathBuf {
        self.dir.path().join("invoices")
    }

    async fn open(
        &self,
    ) -> (
        Arc<Repository<FileSnapshotStore>>,
        Arc<FileAttachmentStore>,
    ) {
        let store = Arc::new(FileSnapshotStore::new(self.data_file()));
        let (repository, _) = Repository::open(store).await.unwrap();
        (Arc::new(repository), Arc::new(FileAttachmentStore::new(self.invoices())))
    }
}

#[fixture]
fn env() -> Env {
    Env {
        dir: tempfile::tempdir().unwrap(),
    }
}

fn record(matter: &str, month: u32, day: u32, invoice: bool) -> RecordEntry {
    RecordEntry {
        draft: EntryDraft {
            matter: MatterRef::named(matter, Some("Litigation")),
            entry_date: NaiveDate::from_ymd_opt(2024, month, day).unwrap(),
            actions: vec![Action::new("Court hearing", 60), Action::new("Notes", 15)],
        },
        invoice: invoice.then(|| InvoiceUpload::new("invoice.pdf", PDF)),
    }
}

fn temp_files(dir: &Path) -> Vec<String> {
    std::fs::read_dir(dir)
        .unwrap()
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.file_name().to_string_lossy().into_owned())
        .filter(|name| name.contains(".tmp"))
        .collect()
}

#[rstest]
#[tokio::test]
async fn it_should_keep_store_backup_and_invoices_consistent(env: Env) {
    let (repository, attachments) = env.open().await;
    let policy = AttachmentPolicy::default();
    let record_handler = RecordEntryHandler::new(repository.clone(), attachments.clone(), policy);
    let amend_handler = AmendEntryHandler::new(repository.clone(), attachments.clone(), policy);
    let delete_handler = DeleteEntryHandler::new(repository.clone(), attachments.clone());

    let first = record_handler.handle(record("Acme", 6, 3, true)).await.unwrap();
    let after_first = std::fs::read_to_string(env.data_file()).unwrap();
    let second = record_handler.handle(record("ACME", 6, 12, false)).await.unwrap();
    assert_eq!(first.matter_id, second.matter_id);

    let backup = std::fs::read_to_string(env.data_file().with_file_name("worklog.json.bak")).unwrap();
    assert_eq!(backup, after_first);

    let invoice = first.invoice_ref.clone().unwrap();
    assert!(env.invoices().join(&invoice.storage_filename).exists());
    assert_eq!(std::fs::read_dir(env.invoices().join(".staging")).unwrap().count(), 0);

    let amended = amend_handler
        .handle(AmendEntry {
            entry_id: first.id.clone(),
            draft: record("Globex", 6, 4, false).draft,
            invoice: InvoiceChange::Replace(InvoiceUpload::new("second.pdf", PDF)),
        })
        .await
        .unwrap();
    let replacement = amended.invoice_ref.clone().unwrap();
    assert!(!env.invoices().join(&invoice.storage_filename).exists());
    assert!(env.invoices().join(&replacement.storage_filename).exists());

    delete_handler.handle(&amended.id).await.unwrap();
    assert!(!env.invoices().join(&replacement.storage_filename).exists());
    let data_file = env.data_file();
    assert!(temp_files(data_file.parent().unwrap()).is_empty());

    let (reopened, _) = env.open().await;
    let snapshot = reopened.snapshot().await;
    assert_eq!(snapshot.entries.len(), 1);
    assert_eq!(snapshot.matters.len(), 2);
}

#[rstest]
#[tokio::test]
async fn it_should_load_around_bad_entries_and_refuse_broken_structure(env: Env) {
    std::fs::create_dir_all(env.data_file().parent().unwrap()).unwrap();
    std::fs::write(
        env.data_file(),
        r#"{
            "matters": {
                "m-1": {"id": "m-1", "name": "Acme", "case_type": "", "created_at": "2024-06-01T09:00:00"}
            },
            "entries": {
                "e-1": {"id": "e-1", "entry_date": "2024-06-08", "week_index": 1, "matter_id": "m-1",
                        "actions": [{"action_description": "Call", "duration_minutes": 30}], "total_minutes": 45},
                "e-2": {"id": "e-2", "entry_date": "2023-12-31", "matter_id": "m-1",
                        "actions": [], "total_minutes": 0},
                "e-3": {"id": "e-3", "entry_date": "2024-06-09", "week_index": 2, "matter_id": "gone",
                        "actions": [{"description": "Orphan", "duration_minutes": 15}], "total_minutes": 15}
            }
        }"#,
    )
    .unwrap();

    let store = Arc::new(FileSnapshotStore::new(env.data_file()));
    let (repository, report) = Repository::open(store.clone()).await.unwrap();
    assert_eq!(report.excluded.len(), 1);
    assert_eq!(report.excluded[0].entry_id, "e-2");
    assert!(matches!(report.excluded[0].reason, ExclusionReason::DateOutOfRange(_)));
    assert_eq!(report.corrections.len(), 2);

    let corrected = repository.get_entry("e-1").await.unwrap();
    assert_eq!(corrected.week_index, 2);
    assert_eq!(corrected.total_minutes, 30);
    assert!(repository.get_entry("e-3").await.is_some());
    assert_eq!(repository.get_matter_by_id("gone").await, None);
    assert_eq!(repository.get_matter_by_id("m-1").await.unwrap().case_type, None);

    std::fs::write(env.data_file(), r#"{"matters": {}, "entries": {"e-1": {"id": "e-1"}}}"#).unwrap();
    let error = Repository::open(store).await.err().unwrap();
    assert!(matches!(error, ApplicationError::Corruption { .. }));
    assert!(error.to_string().contains("entry_date"));
    assert!(error.to_string().contains("worklog.json.bak"));
}

#[rstest]
#[tokio::test]
async fn it_should_leave_no_invoice_behind_when_the_store_cannot_be_written(env: Env) {
    let (repository, attachments) = env.open().await;
    let handler = RecordEntryHandler::new(repository.clone(), attachments, AttachmentPolicy::default());
    std::fs::create_dir_all(env.data_file().join("blocker")).unwrap();

    let result = handler.handle(record("Acme", 6, 3, true)).await;

    assert!(matches!(result, Err(ApplicationError::Store(_))));
    assert!(repository.snapshot().await.entries.is_empty());
    let invoices: Vec<String> = std::fs::read_dir(env.invoices())
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(invoices, vec![".staging"]);
    assert_eq!(std::fs::read_dir(env.invoices().join(".staging")).unwrap().count(), 0);
    assert!(temp_files(env.data_file().parent().unwrap()).is_empty());
}

#[rstest]
#[tokio::test]
async fn it_should_settle_staged_files_left_by_an_interrupted_run(env: Env) {
    let config = WorkLogConfig {
        data_file: env.data_file(),
        invoices_dir: env.invoices(),
        ..WorkLogConfig::default()
    };
    let (repository, attachments) = env.open().await;
    let persisted = attachments.stage("invoice.pdf", PDF).await.unwrap();
    let abandoned = attachments.stage("scan.pdf", PDF).await.unwrap();

    let mut unit = repository.begin().await;
    let entry = unit
        .snapshot_mut()
        .insert_entry(&record("Acme", 6, 3, false).draft, Some(persisted.invoice_ref()), Utc::now())
        .unwrap();
    unit.persist().await.unwrap();
    unit.finish();

    let (state, _) = AppState::open(&config, false).await.unwrap();

    assert!(env.invoices().join(&persisted.storage_filename).exists());
    assert!(!env.invoices().join(&abandoned.storage_filename).exists());
    assert_eq!(std::fs::read_dir(env.invoices().join(".staging")).unwrap().count(), 0);
    let reloaded = state.repository.get_entry(&entry.id).await.unwrap();
    assert_eq!(reloaded.invoice_ref, Some(persisted.invoice_ref()));
}
