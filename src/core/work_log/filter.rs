// Read-side queries over a validated snapshot.
//
// Purpose
// - Filtering, weekly grouping and fully resolved rows for exporters.
//
// Boundaries
// - Pure functions over &Snapshot. A query never fails and never mutates.
// - An entry whose matter no longer exists shows up in views that do not
//   scope by matter, with its matter left empty. Matter and case type
//   filters skip it.

use crate::core::work_log::model::{Action, Entry, InvoiceRef, Matter, Snapshot};
use crate::core::work_log::week::{Week, all_weeks, week_bounds};
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntryFilter {
    pub matter_id: Option<String>,
    pub case_type: Option<String>,
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
    pub week_index: Option<u32>,
}

impl EntryFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn for_matter(mut self, matter_id: impl Into<String>) -> Self {
        self.matter_id = Some(matter_id.into());
        self
    }

    pub fn with_case_type(mut self, case_type: impl Into<String>) -> Self {
        self.case_type = Some(case_type.into());
        self
    }

    pub fn between(mut self, from: Option<NaiveDate>, to: Option<NaiveDate>) -> Self {
        self.date_from = from;
        self.date_to = to;
        self
    }

    pub fn in_week(mut self, week_index: u32) -> Self {
        self.week_index = Some(week_index);
        self
    }

    pub fn matches(&self, snapshot: &Snapshot, entry: &Entry) -> bool {
        if self.date_from.is_some_and(|from| entry.entry_date < from)
            || self.date_to.is_some_and(|to| entry.entry_date > to)
            || self.week_index.is_some_and(|week| entry.week_index != week)
        {
            return false;
        }
        if let Some(matter_id) = &self.matter_id {
            if &entry.matter_id != matter_id || snapshot.matter(matter_id).is_none() {
                return false;
            }
        }
        if let Some(case_type) = &self.case_type {
            let matter_case_type = snapshot
                .matter(&entry.matter_id)
                .and_then(|matter| matter.case_type.as_deref());
            if matter_case_type != Some(case_type.as_str()) {
                return false;
            }
        }
        true
    }
}

/// Matching entries ordered by date, then id.
pub fn filter_entries<'a>(snapshot: &'a Snapshot, filter: &EntryFilter) -> Vec<&'a Entry> {
    let mut entries: Vec<&Entry> = snapshot
        .entries
        .values()
        .filter(|entry| filter.matches(snapshot, entry))
        .collect();
    entries.sort_by(|a, b| a.entry_date.cmp(&b.entry_date).then_with(|| a.id.cmp(&b.id)));
    entries
}

pub fn format_hhmm(minutes: u32) -> String {
    format!("{:02}:{:02}", minutes / 60, minutes % 60)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WeekSummary {
    pub week: Week,
    pub total_minutes: u32,
    pub entry_count: usize,
}

impl WeekSummary {
    pub fn total_hhmm(&self) -> String {
        format_hhmm(self.total_minutes)
    }
}

/// One row per week of the window, including empty weeks.
pub fn weekly_summary(snapshot: &Snapshot, filter: &EntryFilter) -> Vec<WeekSummary> {
    let mut totals: BTreeMap<u32, (u32, usize)> = BTreeMap::new();
    for entry in filter_entries(snapshot, filter) {
        let (minutes, count) = totals.entry(entry.week_index).or_default();
        *minutes = minutes.saturating_add(entry.total_minutes);
        *count += 1;
    }
    all_weeks()
        .into_iter()
        .map(|week| {
            let (total_minutes, entry_count) = totals.get(&week.index).copied().unwrap_or_default();
            WeekSummary {
                week,
                total_minutes,
                entry_count,
            }
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedMatter {
    pub id: String,
    pub name: String,
    pub case_type: Option<String>,
}

impl From<&Matter> for ResolvedMatter {
    fn from(matter: &Matter) -> Self {
        Self {
            id: matter.id.clone(),
            name: matter.name.clone(),
            case_type: matter.case_type.clone(),
        }
    }
}

/// One exported action row. Undated actions take the entry date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedAction {
    pub action_date: NaiveDate,
    pub description: String,
    pub duration_minutes: u32,
    pub duration_hhmm: String,
}

impl ResolvedAction {
    fn from_action(action: &Action, entry_date: NaiveDate) -> Self {
        Self {
            action_date: action.date_or(entry_date),
            description: action.description.clone(),
            duration_minutes: action.duration_minutes,
            duration_hhmm: format_hhmm(action.duration_minutes),
        }
    }
}

/// Entry joined with its matter and week, ready for a report or export.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedEntry {
    pub entry_id: String,
    pub entry_date: NaiveDate,
    pub week_index: u32,
    pub week_start: Option<NaiveDate>,
    pub week_end: Option<NaiveDate>,
    pub matter_id: String,
    pub matter: Option<ResolvedMatter>,
    pub actions: Vec<ResolvedAction>,
    pub total_minutes: u32,
    pub total_hhmm: String,
    pub invoice: Option<InvoiceRef>,
}

fn resolve(snapshot: &Snapshot, entry: &Entry) -> ResolvedEntry {
    let bounds = week_bounds(entry.week_index).ok();
    ResolvedEntry {
        entry_id: entry.id.clone(),
        entry_date: entry.entry_date,
        week_index: entry.week_index,
        week_start: bounds.map(|(start, _)| start),
        week_end: bounds.map(|(_, end)| end),
        matter_id: entry.matter_id.clone(),
        matter: snapshot.matter(&entry.matter_id).map(ResolvedMatter::from),
        actions: entry
            .actions
            .iter()
            .map(|action| ResolvedAction::from_action(action, entry.entry_date))
            .collect(),
        total_minutes: entry.total_minutes,
        total_hhmm: format_hhmm(entry.total_minutes),
        invoice: entry.invoice_ref.clone(),
    }
}

pub fn resolve_entries(snapshot: &Snapshot, filter: &EntryFilter) -> Vec<ResolvedEntry> {
    filter_entries(snapshot, filter)
        .into_iter()
        .map(|entry| resolve(snapshot, entry))
        .collect()
}

/// Everything an exporter needs, detached from the live snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExportView {
    pub entries: Vec<ResolvedEntry>,
    pub weeks: Vec<WeekSummary>,
}

pub fn export_view(snapshot: &Snapshot, filter: &EntryFilter) -> ExportView {
    ExportView {
        entries: resolve_entries(snapshot, filter),
        weeks: weekly_summary(snapshot, filter),
    }
}

pub fn matter_total_minutes(snapshot: &Snapshot, matter_id: &str) -> u32 {
    snapshot
        .entries
        .values()
        .filter(|entry| entry.matter_id == matter_id)
        .fold(0u32, |total, entry| total.saturating_add(entry.total_minutes))
}

/// Distinct action descriptions for autocompletion. Those already used for
/// `matter_id` come first, each group sorted.
pub fn action_suggestions(snapshot: &Snapshot, matter_id: Option<&str>) -> Vec<String> {
    let mut preferred = BTreeSet::new();
    let mut others = BTreeSet::new();
    for entry in snapshot.entries.values() {
        let is_preferred = matter_id.is_some_and(|id| id == entry.matter_id);
        for action in &entry.actions {
            let description = action.description.trim();
            if description.is_empty() {
                continue;
            }
            if is_preferred {
                preferred.insert(description.to_string());
            } else {
                others.insert(description.to_string());
            }
        }
    }
    let mut suggestions: Vec<String> = preferred.iter().cloned().collect();
    suggestions.extend(others.into_iter().filter(|d| !preferred.contains(d)));
    suggestions
}
