// Read port for the presentation layer.
//
// Purpose
// - Let screens and exporters query the work log without holding the
//   repository's unit of work machinery.
//
// Queries run against the in-memory snapshot and cannot fail.

use crate::application::repository::Repository;
use crate::core::ports::SnapshotStore;
use crate::core::work_log::filter::{
    EntryFilter, ExportView, ResolvedEntry, WeekSummary, action_suggestions, export_view,
    matter_total_minutes, resolve_entries, weekly_summary,
};
use crate::core::work_log::model::Matter;
use async_trait::async_trait;

#[async_trait]
pub trait WorkLogQueries: Send + Sync {
    async fn matter(&self, matter_id: &str) -> Option<Matter>;
    async fn matters(&self) -> Vec<Matter>;
    async fn entries(&self, filter: &EntryFilter) -> Vec<ResolvedEntry>;
    async fn weekly_summary(&self, filter: &EntryFilter) -> Vec<WeekSummary>;
    async fn export_view(&self, filter: &EntryFilter) -> ExportView;
    async fn matter_total_minutes(&self, matter_id: &str) -> u32;
    async fn action_suggestions(&self, matter_id: Option<&str>) -> Vec<String>;
}

#[async_trait]
impl<S: SnapshotStore> WorkLogQueries for Repository<S> {
    async fn matter(&self, matter_id: &str) -> Option<Matter> {
        self.get_matter_by_id(matter_id).await
    }

    async fn matters(&self) -> Vec<Matter> {
        self.list_matters().await
    }

    async fn entries(&self, filter: &EntryFilter) -> Vec<ResolvedEntry> {
        self.read(|snapshot| resolve_entries(snapshot, filter)).await
    }

    async fn weekly_summary(&self, filter: &EntryFilter) -> Vec<WeekSummary> {
        self.read(|snapshot| weekly_summary(snapshot, filter)).await
    }

    async fn export_view(&self, filter: &EntryFilter) -> ExportView {
        self.read(|snapshot| export_view(snapshot, filter)).await
    }

    async fn matter_total_minutes(&self, matter_id: &str) -> u32 {
        self.read(|snapshot| matter_total_minutes(snapshot, matter_id)).await
    }

    async fn action_suggestions(&self, matter_id: Option<&str>) -> Vec<String> {
        self.read(|snapshot| action_suggestions(snapshot, matter_id)).await
    }
}

#[cfg(test)]
mod work_log_queries_tests {
    use super::*;
    use crate::adapters::in_memory::in_memory_snapshot_store::InMemorySnapshotStore;
    use crate::core::work_log::commands::{EntryDraft, MatterRef};
    use crate::core::work_log::model::Action;
    use chrono::NaiveDate;
    use rstest::rstest;
    use std::sync::Arc;

    #[rstest]
    #[tokio::test]
    async fn it_should_answer_queries_through_the_trait_object() {
        let (repository, _) = Repository::open(Arc::new(InMemorySnapshotStore::new()))
            .await
            .unwrap();
        let entry = repository
            .create_entry(&EntryDraft {
                matter: MatterRef::named("Acme", Some("Litigation")),
                entry_date: NaiveDate::from_ymd_opt(2024, 6, 15).unwrap(),
                actions: vec![Action::new("Court hearing", 120)],
            })
            .await
            .unwrap();
        let queries: Arc<dyn WorkLogQueries> = Arc::new(repository);

        assert_eq!(queries.matters().await.len(), 1);
        assert_eq!(queries.matter_total_minutes(&entry.matter_id).await, 120);
        let rows = queries.entries(&EntryFilter::all().with_case_type("Litigation")).await;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].week_index, 3);
        let weeks = queries.weekly_summary(&EntryFilter::all()).await;
        assert_eq!(weeks[2].total_hhmm(), "02:00");
        assert_eq!(queries.export_view(&EntryFilter::all()).await.entries, rows);
        assert_eq!(
            queries.action_suggestions(Some(&entry.matter_id)).await,
            vec!["Court hearing"]
        );
        assert_eq!(
            queries.matter(&entry.matter_id).await.map(|m| m.name),
            Some("Acme".to_string())
        );
    }
}
