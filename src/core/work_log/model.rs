// Data model of the work log store.
//
// Purpose
// - Typed shape of matters, entries, actions and the persisted snapshot.
//
// Boundaries
// - Values of these types are only produced by the schema validator (on load)
//   or by the snapshot mutations (in memory). Raw JSON never reaches
//   business logic directly.
//
// Notes
// - Maps are BTreeMaps so the serialized file is stable between saves.
// - `week_index` and `total_minutes` are derived values stored for fast reads.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Matter {
    pub id: String,
    pub name: String,
    pub case_type: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Action {
    #[serde(alias = "action_description")]
    pub description: String,
    pub duration_minutes: u32,
    /// Day the work was done. Actions without one belong to the entry date.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_date: Option<NaiveDate>,
}

impl Action {
    pub fn new(description: impl Into<String>, duration_minutes: u32) -> Self {
        Self {
            description: description.into(),
            duration_minutes,
            action_date: None,
        }
    }

    pub fn on(mut self, action_date: NaiveDate) -> Self {
        self.action_date = Some(action_date);
        self
    }

    pub fn date_or(&self, entry_date: NaiveDate) -> NaiveDate {
        self.action_date.unwrap_or(entry_date)
    }
}

/// Earliest action date, or `fallback` when no action carries one.
pub fn earliest_action_date(actions: &[Action], fallback: NaiveDate) -> NaiveDate {
    actions
        .iter()
        .filter_map(|action| action.action_date)
        .min()
        .unwrap_or(fallback)
}

/// Reference from an entry to a file in the attachment store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceRef {
    pub storage_filename: String,
    pub original_filename: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    pub id: String,
    pub entry_date: NaiveDate,
    pub week_index: u32,
    pub matter_id: String,
    pub actions: Vec<Action>,
    pub total_minutes: u32,
    pub invoice_ref: Option<InvoiceRef>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Entry {
    pub fn actions_total(&self) -> u32 {
        sum_minutes(&self.actions)
    }
}

pub fn sum_minutes(actions: &[Action]) -> u32 {
    actions
        .iter()
        .fold(0u32, |total, action| total.saturating_add(action.duration_minutes))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub schema_version: u32,
    pub matters: BTreeMap<String, Matter>,
    pub entries: BTreeMap<String, Entry>,
}

impl Default for Snapshot {
    fn default() -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            matters: BTreeMap::new(),
            entries: BTreeMap::new(),
        }
    }
}

impl Snapshot {
    pub fn encode(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
