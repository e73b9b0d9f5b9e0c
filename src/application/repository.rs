// Repository over the work log snapshot.
//
// Purpose
// - Own the single in-memory snapshot and make every change durable.
//
// Responsibilities
// - Load and validate the store on open; refuse to start on corruption and
//   point the user at the backup file.
// - Run every mutation inside a UnitOfWork: the lock is held for the whole
//   read, validate, mutate and persist sequence, and the pre-image is put back
//   if the unit is dropped without being finished.
//
// Boundaries
// - Attachments are not handled here. The command handlers coordinate them
//   with a unit of work.

use crate::application::errors::ApplicationError;
use crate::core::ports::{SnapshotStore, SnapshotStoreError};
use crate::core::work_log::commands::EntryDraft;
use crate::core::work_log::model::{Entry, Matter, Snapshot};
use crate::core::work_log::schema::{LoadReport, ValidatedSnapshot, validate_str};
use crate::shared::core::primitives::now;
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};

pub struct Repository<S: SnapshotStore> {
    store: Arc<S>,
    state: Mutex<Snapshot>,
}

/// Exclusive access to the snapshot for one logical change.
///
/// Dropping the unit before `commit`, `finish` or `revert` restores the
/// snapshot as it was when the unit began.
pub struct UnitOfWork<'a, S: SnapshotStore> {
    guard: MutexGuard<'a, Snapshot>,
    before: Option<Snapshot>,
    store: &'a S,
}

impl<S: SnapshotStore> UnitOfWork<'_, S> {
    pub fn snapshot(&self) -> &Snapshot {
        &self.guard
    }

    pub fn snapshot_mut(&mut self) -> &mut Snapshot {
        &mut self.guard
    }

    pub fn is_dirty(&self) -> bool {
        self.before
            .as_ref()
            .is_some_and(|before| before != &*self.guard)
    }

    /// Writes the current snapshot. The unit stays open.
    pub async fn persist(&mut self) -> Result<(), ApplicationError> {
        let encoded = self.guard.encode().map_err(SnapshotStoreError::from)?;
        self.store.persist(&encoded).await?;
        Ok(())
    }

    /// Keeps the in-memory changes without writing them again.
    pub fn finish(mut self) {
        self.before = None;
    }

    pub async fn commit(mut self) -> Result<(), ApplicationError> {
        if self.is_dirty() {
            self.persist().await?;
        }
        self.finish();
        Ok(())
    }

    /// Puts the pre-image back and writes it, undoing a change that was
    /// already persisted.
    ///
    /// When that write fails the store still holds the change, so the
    /// snapshot keeps it too and memory never disagrees with the file.
    pub async fn revert(mut self) -> Result<(), ApplicationError> {
        let Some(before) = self.before.take() else {
            return Ok(());
        };
        let changed = std::mem::replace(&mut *self.guard, before);
        if let Err(e) = self.persist().await {
            tracing::error!(error = %e, "compensating write failed, keeping the persisted change");
            *self.guard = changed;
            return Err(e);
        }
        tracing::debug!("persisted change reverted");
        Ok(())
    }
}

impl<S: SnapshotStore> Drop for UnitOfWork<'_, S> {
    fn drop(&mut self) {
        if let Some(before) = self.before.take() {
            if *self.guard != before {
                tracing::debug!("rolling back uncommitted changes");
                *self.guard = before;
            }
        }
    }
}

impl<S: SnapshotStore> Repository<S> {
    pub async fn open(store: Arc<S>) -> Result<(Self, LoadReport), ApplicationError> {
        let validated = match store.load().await? {
            Some(raw) => Self::validated(&store, &raw)?,
            None => {
                tracing::info!(backup = %store.backup_location(), "no store file yet, starting empty");
                ValidatedSnapshot {
                    snapshot: Snapshot::default(),
                    report: LoadReport::default(),
                }
            }
        };
        Ok(Self::from_validated(store, validated))
    }

    /// Replaces a corrupt primary with the backup, provided the backup itself
    /// validates.
    pub async fn recover_from_backup(store: Arc<S>) -> Result<(Self, LoadReport), ApplicationError> {
        let raw = store
            .load_backup()
            .await?
            .ok_or_else(|| ApplicationError::NoBackup(store.backup_location()))?;
        let validated = Self::validated(&store, &raw)?;
        if !store.restore_backup().await? {
            return Err(ApplicationError::NoBackup(store.backup_location()));
        }
        tracing::info!(backup = %store.backup_location(), "store recovered from backup");
        Ok(Self::from_validated(store, validated))
    }

    fn validated(store: &S, raw: &str) -> Result<ValidatedSnapshot, ApplicationError> {
        validate_str(raw).map_err(|source| {
            tracing::error!(error = %source, backup = %store.backup_location(), "store file failed validation");
            ApplicationError::Corruption {
                source,
                backup: store.backup_location(),
            }
        })
    }

    fn from_validated(store: Arc<S>, validated: ValidatedSnapshot) -> (Self, LoadReport) {
        let ValidatedSnapshot { snapshot, report } = validated;
        tracing::info!(
            matters = snapshot.matters.len(),
            entries = snapshot.entries.len(),
            excluded = report.excluded.len(),
            corrections = report.corrections.len(),
            "work log loaded"
        );
        let repository = Self {
            store,
            state: Mutex::new(snapshot),
        };
        (repository, report)
    }

    pub async fn begin(&self) -> UnitOfWork<'_, S> {
        let guard = self.state.lock().await;
        let before = Some(guard.clone());
        UnitOfWork {
            guard,
            before,
            store: self.store.as_ref(),
        }
    }

    /// Case-insensitive upsert by name.
    pub async fn create_matter(
        &self,
        name: &str,
        case_type: Option<&str>,
    ) -> Result<Matter, ApplicationError> {
        let mut unit = self.begin().await;
        let matter = unit.snapshot_mut().upsert_matter(name, case_type, now())?;
        unit.commit().await?;
        tracing::info!(matter_id = %matter.id, name = %matter.name, "matter saved");
        Ok(matter)
    }

    pub async fn update_matter(
        &self,
        matter_id: &str,
        name: &str,
        case_type: Option<&str>,
    ) -> Result<Matter, ApplicationError> {
        let mut unit = self.begin().await;
        let matter = unit
            .snapshot_mut()
            .update_matter(matter_id, name, case_type)?;
        unit.commit().await?;
        tracing::info!(matter_id = %matter.id, name = %matter.name, "matter updated");
        Ok(matter)
    }

    /// Entries that referenced the matter are kept as orphans.
    pub async fn delete_matter(&self, matter_id: &str) -> Result<Matter, ApplicationError> {
        let mut unit = self.begin().await;
        let matter = unit.snapshot_mut().remove_matter(matter_id)?;
        let orphaned = unit
            .snapshot()
            .entries
            .values()
            .filter(|entry| entry.matter_id == matter_id)
            .count();
        unit.commit().await?;
        tracing::info!(matter_id, orphaned, "matter deleted");
        Ok(matter)
    }

    pub async fn create_entry(&self, draft: &EntryDraft) -> Result<Entry, ApplicationError> {
        let mut unit = self.begin().await;
        let entry = unit.snapshot_mut().insert_entry(draft, None, now())?;
        unit.commit().await?;
        tracing::info!(entry_id = %entry.id, week = entry.week_index, minutes = entry.total_minutes, "entry recorded");
        Ok(entry)
    }

    pub async fn update_entry(
        &self,
        entry_id: &str,
        draft: &EntryDraft,
    ) -> Result<Entry, ApplicationError> {
        let mut unit = self.begin().await;
        let entry = unit.snapshot_mut().replace_entry(entry_id, draft, now())?;
        unit.commit().await?;
        tracing::info!(entry_id = %entry.id, week = entry.week_index, minutes = entry.total_minutes, "entry updated");
        Ok(entry)
    }

    /// Removes the record only. The caller owns the cleanup of its invoice.
    pub async fn delete_entry(&self, entry_id: &str) -> Result<Entry, ApplicationError> {
        let mut unit = self.begin().await;
        let entry = unit.snapshot_mut().remove_entry(entry_id)?;
        unit.commit().await?;
        tracing::info!(entry_id, "entry deleted");
        Ok(entry)
    }

    /// Runs a read-only query against the current snapshot.
    pub async fn read<T>(&self, query: impl FnOnce(&Snapshot) -> T) -> T {
        query(&*self.state.lock().await)
    }

    pub async fn get_matter_by_id(&self, matter_id: &str) -> Option<Matter> {
        self.read(|snapshot| snapshot.matter(matter_id).cloned()).await
    }

    pub async fn get_matter_by_name(&self, name: &str) -> Option<Matter> {
        self.read(|snapshot| snapshot.matter_by_name(name).cloned()).await
    }

    pub async fn get_entry(&self, entry_id: &str) -> Option<Entry> {
        self.read(|snapshot| snapshot.entry(entry_id).cloned()).await
    }

    /// Sorted by name, ignoring case.
    pub async fn list_matters(&self) -> Vec<Matter> {
        let mut matters: Vec<Matter> = self
            .read(|snapshot| snapshot.matters.values().cloned().collect())
            .await;
        matters.sort_by_key(|matter| matter.name.to_lowercase());
        matters
    }

    pub async fn snapshot(&self) -> Snapshot {
        self.read(Snapshot::clone).await
    }
}

#[cfg(test)]
mod repository_tests {
    use super::*;
    use crate::adapters::in_memory::in_memory_snapshot_store::InMemorySnapshotStore;
    use crate::core::work_log::commands::MatterRef;
    use crate::core::work_log::model::Action;
    use crate::core::work_log::rules::ValidationError;
    use crate::core::work_log::week::OutOfRangeError;
    use chrono::NaiveDate;
    use rstest::{fixture, rstest};

    type BeforeEachReturn = (Arc<InMemorySnapshotStore>, Repository<InMemorySnapshotStore>);

    #[fixture]
    async fn before_each() -> BeforeEachReturn {
        let store = Arc::new(InMemorySnapshotStore::new());
        let (repository, report) = Repository::open(store.clone()).await.unwrap();
        assert!(report.is_clean());
        (store, repository)
    }

    fn draft(matter: MatterRef, month: u32, day: u32, minutes: u32) -> EntryDraft {
        EntryDraft {
            matter,
            entry_date: NaiveDate::from_ymd_opt(2024, month, day).unwrap(),
            actions: vec![Action::new("Research", minutes)],
        }
    }

    #[rstest]
    #[tokio::test]
    async fn it_should_persist_created_records(#[future] before_each: BeforeEachReturn) {
        let (store, repository) = before_each.await;
        let entry = repository
            .create_entry(&draft(MatterRef::named("Acme", Some("Litigation")), 6, 8, 45))
            .await
            .unwrap();
        assert_eq!(entry.week_index, 2);
        assert_eq!(entry.total_minutes, 45);

        let (reopened, _) = Repository::open(store.clone()).await.unwrap();
        assert_eq!(reopened.get_entry(&entry.id).await, Some(entry.clone()));
        let matter = reopened.get_matter_by_name("ACME").await.unwrap();
        assert_eq!(matter.id, entry.matter_id);
        assert_eq!(store.persist_count(), 1);
    }

    #[rstest]
    #[tokio::test]
    async fn it_should_return_the_same_matter_for_names_differing_in_case(
        #[future] before_each: BeforeEachReturn,
    ) {
        let (store, repository) = before_each.await;
        let first = repository.create_matter("Acme", None).await.unwrap();
        let second = repository.create_matter("  ACME ", None).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(repository.list_matters().await.len(), 1);
        assert_eq!(store.persist_count(), 1, "an unchanged snapshot is not written again");
    }

    #[rstest]
    #[tokio::test]
    async fn it_should_roll_back_when_the_store_is_offline(#[future] before_each: BeforeEachReturn) {
        let (store, repository) = before_each.await;
        repository.create_matter("Acme", None).await.unwrap();
        let before = repository.snapshot().await;

        store.toggle_offline();
        let result = repository
            .create_entry(&draft(MatterRef::named("Globex", None), 7, 1, 30))
            .await;
        assert!(matches!(result, Err(ApplicationError::Store(_))));
        assert_eq!(repository.snapshot().await, before);
        assert!(repository.get_matter_by_name("Globex").await.is_none());
    }

    #[rstest]
    #[tokio::test]
    async fn it_should_reject_invalid_entries_without_writing(#[future] before_each: BeforeEachReturn) {
        let (store, repository) = before_each.await;
        let out_of_window = repository
            .create_entry(&draft(MatterRef::named("Acme", None), 5, 31, 30))
            .await;
        assert!(matches!(
            out_of_window,
            Err(ApplicationError::Validation(ValidationError::DateOutOfRange(
                OutOfRangeError::Date(_)
            )))
        ));
        let off_quarter = repository
            .create_entry(&draft(MatterRef::named("Acme", None), 6, 3, 20))
            .await;
        assert!(matches!(
            off_quarter,
            Err(ApplicationError::Validation(ValidationError::DurationNotQuarterHour { .. }))
        ));
        assert!(repository.list_matters().await.is_empty());
        assert_eq!(store.persist_count(), 0);
    }

    #[rstest]
    #[tokio::test]
    async fn it_should_leave_orphans_when_a_matter_is_deleted(#[future] before_each: BeforeEachReturn) {
        let (_, repository) = before_each.await;
        let entry = repository
            .create_entry(&draft(MatterRef::named("Acme", None), 6, 3, 30))
            .await
            .unwrap();
        repository.delete_matter(&entry.matter_id).await.unwrap();
        assert_eq!(repository.get_matter_by_id(&entry.matter_id).await, None);
        assert!(repository.get_entry(&entry.id).await.is_some());
    }

    #[rstest]
    #[tokio::test]
    async fn it_should_update_and_delete_entries(#[future] before_each: BeforeEachReturn) {
        let (_, repository) = before_each.await;
        let entry = repository
            .create_entry(&draft(MatterRef::named("Acme", None), 6, 3, 30))
            .await
            .unwrap();
        let updated = repository
            .update_entry(&entry.id, &draft(MatterRef::existing(&entry.matter_id), 12, 30, 60))
            .await
            .unwrap();
        assert_eq!(updated.week_index, 31);
        assert_eq!(updated.total_minutes, 60);
        assert_eq!(updated.created_at, entry.created_at);

        repository.delete_entry(&entry.id).await.unwrap();
        assert!(repository.get_entry(&entry.id).await.is_none());
        assert!(matches!(
            repository.delete_entry(&entry.id).await,
            Err(ApplicationError::Validation(ValidationError::UnknownEntry { .. }))
        ));
    }

    #[rstest]
    #[tokio::test]
    async fn it_should_refuse_to_rename_onto_another_matter(#[future] before_each: BeforeEachReturn) {
        let (_, repository) = before_each.await;
        repository.create_matter("Acme", None).await.unwrap();
        let globex = repository.create_matter("Globex", None).await.unwrap();
        assert!(matches!(
            repository.update_matter(&globex.id, "acme", None).await,
            Err(ApplicationError::Validation(ValidationError::DuplicateMatterName { .. }))
        ));
        let renamed = repository
            .update_matter(&globex.id, "Globex Corp", Some("Advisory"))
            .await
            .unwrap();
        assert_eq!(renamed.case_type.as_deref(), Some("Advisory"));
        let names: Vec<String> = repository.list_matters().await.into_iter().map(|m| m.name).collect();
        assert_eq!(names, vec!["Acme", "Globex Corp"]);
    }

    #[rstest]
    #[tokio::test]
    async fn it_should_restore_the_pre_image_when_a_unit_is_dropped(
        #[future] before_each: BeforeEachReturn,
    ) {
        let (store, repository) = before_each.await;
        {
            let mut unit = repository.begin().await;
            unit.snapshot_mut().upsert_matter("Acme", None, now()).unwrap();
            assert!(unit.is_dirty());
        }
        assert!(repository.list_matters().await.is_empty());
        assert_eq!(store.persist_count(), 0);
    }

    #[rstest]
    #[tokio::test]
    async fn it_should_write_the_pre_image_back_on_revert(#[future] before_each: BeforeEachReturn) {
        let (store, repository) = before_each.await;
        let mut unit = repository.begin().await;
        unit.snapshot_mut().upsert_matter("Acme", None, now()).unwrap();
        unit.persist().await.unwrap();
        unit.revert().await.unwrap();

        assert!(repository.list_matters().await.is_empty());
        let (reopened, _) = Repository::open(store).await.unwrap();
        assert!(reopened.list_matters().await.is_empty());
    }

    #[rstest]
    #[tokio::test]
    async fn it_should_keep_the_change_when_the_revert_cannot_be_written(
        #[future] before_each: BeforeEachReturn,
    ) {
        let (store, repository) = before_each.await;
        let mut unit = repository.begin().await;
        unit.snapshot_mut().upsert_matter("Acme", None, now()).unwrap();
        unit.persist().await.unwrap();
        store.toggle_offline();
        assert!(matches!(unit.revert().await, Err(ApplicationError::Store(_))));
        store.toggle_offline();

        let in_memory: Vec<String> = repository.list_matters().await.into_iter().map(|m| m.name).collect();
        let (reopened, _) = Repository::open(store).await.unwrap();
        let on_disk: Vec<String> = reopened.list_matters().await.into_iter().map(|m| m.name).collect();
        assert_eq!(in_memory, vec!["Acme"]);
        assert_eq!(on_disk, in_memory);
    }

    #[rstest]
    #[tokio::test]
    async fn it_should_refuse_to_open_a_corrupt_store_and_name_the_backup() {
        let store = Arc::new(InMemorySnapshotStore::with_contents("{\"matters\": 3}"));
        let error = Repository::open(store).await.err().unwrap();
        assert!(matches!(error, ApplicationError::Corruption { .. }));
        assert!(error.to_string().contains("memory://worklog.json.bak"));
    }

    #[rstest]
    #[tokio::test]
    async fn it_should_recover_from_a_valid_backup() {
        let good = Snapshot::default().encode().unwrap();
        let store = Arc::new(InMemorySnapshotStore::with_contents("not json").with_backup(good.clone()));
        let (repository, report) = Repository::recover_from_backup(store.clone()).await.unwrap();
        assert!(report.is_clean());
        assert!(repository.list_matters().await.is_empty());
        assert_eq!(store.contents().await, Some(good));
    }

    #[rstest]
    #[tokio::test]
    async fn it_should_fail_recovery_without_a_backup() {
        let store = Arc::new(InMemorySnapshotStore::with_contents("not json"));
        assert!(matches!(
            Repository::recover_from_backup(store).await,
            Err(ApplicationError::NoBackup(_))
        ));
    }
}
