// Schema validator for the persisted store.
//
// Purpose
// - Turn raw JSON into a trusted Snapshot before any other component sees it.
//
// Policy
// - Structural corruption (not JSON, missing mappings, records without their
//   required keys or with keys of the wrong type) aborts the whole load.
// - Semantic outliers (unparseable or out-of-window dates, malformed actions)
//   exclude only the affected entry and are reported to the caller.
// - Derived fields that disagree with their sources are recomputed and the
//   correction is reported. When actions carry dates, the entry date is the
//   earliest of them.
//
// Checks run in order: top-level shape, matters, entries.

use crate::core::work_log::model::{
    Action, Entry, InvoiceRef, Matter, SCHEMA_VERSION, Snapshot, earliest_action_date,
    sum_minutes,
};
use crate::core::work_log::rules::{DURATION_STEP_MINUTES, normalize_matter_name};
use crate::core::work_log::week::{is_in_window, week_index};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::fmt;
use thiserror::Error;

const MATTER: &str = "matter";
const ENTRY: &str = "entry";

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CorruptionError {
    #[error("store file is not valid JSON: {0}")]
    InvalidJson(String),

    #[error("store file must contain a JSON object at the top level")]
    NotAnObject,

    #[error("store file is missing the '{0}' mapping")]
    MissingMapping(&'static str),

    #[error("'{0}' must be a mapping of id to record")]
    NotAMapping(&'static str),

    #[error("unsupported schema version {found} (expected {expected})")]
    UnsupportedSchemaVersion { found: String, expected: u32 },

    #[error("{kind} '{key}' is not an object")]
    RecordNotAnObject { kind: &'static str, key: String },

    #[error("{kind} '{key}' is missing required field '{field}'")]
    MissingField {
        kind: &'static str,
        key: String,
        field: &'static str,
    },

    #[error("{kind} '{key}' has an empty '{field}'")]
    EmptyField {
        kind: &'static str,
        key: String,
        field: &'static str,
    },

    #[error("{kind} '{key}' has an invalid '{field}'")]
    InvalidField {
        kind: &'static str,
        key: String,
        field: &'static str,
    },

    #[error("{kind} stored under key '{key}' carries id '{id}'")]
    KeyMismatch {
        kind: &'static str,
        key: String,
        id: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExclusionReason {
    UnparseableDate(String),
    DateOutOfRange(NaiveDate),
    MalformedAction { action: usize, detail: String },
}

impl fmt::Display for ExclusionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnparseableDate(raw) => write!(f, "entry_date '{raw}' is not a YYYY-MM-DD date"),
            Self::DateOutOfRange(date) => write!(f, "entry_date {date} is outside the logging window"),
            Self::MalformedAction { action, detail } => write!(f, "action {action} is malformed: {detail}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExcludedEntry {
    pub entry_id: String,
    pub reason: ExclusionReason,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Correction {
    EntryDate {
        entry_id: String,
        stored: NaiveDate,
        derived: NaiveDate,
    },
    WeekIndex {
        entry_id: String,
        stored: Option<u64>,
        computed: u32,
    },
    TotalMinutes {
        entry_id: String,
        stored: u64,
        computed: u32,
    },
    InvoiceRefDropped {
        entry_id: String,
    },
}

/// What the load had to exclude or correct, for display to the user.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadReport {
    pub excluded: Vec<ExcludedEntry>,
    pub corrections: Vec<Correction>,
}

impl LoadReport {
    pub fn is_clean(&self) -> bool {
        self.excluded.is_empty() && self.corrections.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedSnapshot {
    pub snapshot: Snapshot,
    pub report: LoadReport,
}

pub fn validate_str(raw: &str) -> Result<ValidatedSnapshot, CorruptionError> {
    let value: Value =
        serde_json::from_str(raw).map_err(|e| CorruptionError::InvalidJson(e.to_string()))?;
    validate(&value)
}

pub fn validate(raw: &Value) -> Result<ValidatedSnapshot, CorruptionError> {
    let root = raw.as_object().ok_or(CorruptionError::NotAnObject)?;
    let matters_raw = mapping(root, "matters")?;
    let entries_raw = mapping(root, "entries")?;

    if let Some(version) = root.get("schema_version") {
        if version.as_u64() != Some(u64::from(SCHEMA_VERSION)) {
            return Err(CorruptionError::UnsupportedSchemaVersion {
                found: version.to_string(),
                expected: SCHEMA_VERSION,
            });
        }
    }

    let mut snapshot = Snapshot::default();
    let mut report = LoadReport::default();

    let mut seen_names = HashSet::new();
    for (key, value) in matters_raw {
        let matter = parse_matter(key, value)?;
        if !seen_names.insert(normalize_matter_name(&matter.name)) {
            tracing::warn!(matter_id = %matter.id, name = %matter.name, "duplicate matter name in store");
        }
        snapshot.matters.insert(matter.id.clone(), matter);
    }

    for (key, value) in entries_raw {
        let raw_entry = parse_entry_shape(key, value)?;
        match raw_entry.into_entry(&mut report) {
            Ok(entry) => {
                snapshot.entries.insert(entry.id.clone(), entry);
            }
            Err(excluded) => {
                tracing::warn!(entry_id = %excluded.entry_id, reason = %excluded.reason, "entry excluded from load");
                report.excluded.push(excluded);
            }
        }
    }

    Ok(ValidatedSnapshot { snapshot, report })
}

fn mapping<'a>(
    root: &'a Map<String, Value>,
    name: &'static str,
) -> Result<&'a Map<String, Value>, CorruptionError> {
    root.get(name)
        .ok_or(CorruptionError::MissingMapping(name))?
        .as_object()
        .ok_or(CorruptionError::NotAMapping(name))
}

fn required_text<'a>(
    record: &'a Map<String, Value>,
    kind: &'static str,
    key: &str,
    field: &'static str,
) -> Result<&'a str, CorruptionError> {
    match record.get(field) {
        None | Some(Value::Null) => Err(CorruptionError::MissingField {
            kind,
            key: key.to_string(),
            field,
        }),
        Some(Value::String(text)) if text.trim().is_empty() => Err(CorruptionError::EmptyField {
            kind,
            key: key.to_string(),
            field,
        }),
        Some(Value::String(text)) => Ok(text),
        Some(_) => Err(CorruptionError::InvalidField {
            kind,
            key: key.to_string(),
            field,
        }),
    }
}

fn optional_text<'a>(record: &'a Map<String, Value>, field: &str) -> Option<&'a str> {
    record.get(field).and_then(Value::as_str)
}

fn check_key(kind: &'static str, key: &str, id: &str) -> Result<(), CorruptionError> {
    if key != id {
        return Err(CorruptionError::KeyMismatch {
            kind,
            key: key.to_string(),
            id: id.to_string(),
        });
    }
    Ok(())
}

/// Accepts RFC 3339 and naive ISO timestamps (read as UTC).
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|parsed| parsed.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
                .ok()
                .map(|naive| naive.and_utc())
        })
}

fn parse_matter(key: &str, value: &Value) -> Result<Matter, CorruptionError> {
    let record = value
        .as_object()
        .ok_or_else(|| CorruptionError::RecordNotAnObject {
            kind: MATTER,
            key: key.to_string(),
        })?;
    let id = required_text(record, MATTER, key, "id")?;
    let name = required_text(record, MATTER, key, "name")?;
    let created_at_raw = required_text(record, MATTER, key, "created_at")?;
    check_key(MATTER, key, id)?;

    let created_at =
        parse_timestamp(created_at_raw).ok_or_else(|| CorruptionError::InvalidField {
            kind: MATTER,
            key: key.to_string(),
            field: "created_at",
        })?;
    let case_type = match record.get("case_type") {
        None | Some(Value::Null) => None,
        Some(Value::String(text)) if text.trim().is_empty() => None,
        Some(Value::String(text)) => Some(text.clone()),
        Some(_) => {
            return Err(CorruptionError::InvalidField {
                kind: MATTER,
                key: key.to_string(),
                field: "case_type",
            });
        }
    };

    Ok(Matter {
        id: id.to_string(),
        name: name.to_string(),
        case_type,
        created_at,
    })
}

/// Entry whose required keys are present and well-typed, but whose content
/// has not been checked yet.
struct RawEntry<'a> {
    id: &'a str,
    entry_date: &'a str,
    matter_id: &'a str,
    actions: &'a [Value],
    total_minutes: u64,
    week_index: Option<u64>,
    record: &'a Map<String, Value>,
}

fn non_negative_integer(value: &Value) -> Option<u64> {
    value.as_u64().or_else(|| {
        value
            .as_f64()
            .filter(|number| *number >= 0.0 && number.fract() == 0.0)
            .map(|number| number as u64)
    })
}

fn parse_entry_shape<'a>(key: &str, value: &'a Value) -> Result<RawEntry<'a>, CorruptionError> {
    let record = value
        .as_object()
        .ok_or_else(|| CorruptionError::RecordNotAnObject {
            kind: ENTRY,
            key: key.to_string(),
        })?;
    let invalid = |field: &'static str| CorruptionError::InvalidField {
        kind: ENTRY,
        key: key.to_string(),
        field,
    };
    let missing = |field: &'static str| CorruptionError::MissingField {
        kind: ENTRY,
        key: key.to_string(),
        field,
    };

    let id = required_text(record, ENTRY, key, "id")?;
    let entry_date = match record.get("entry_date") {
        None | Some(Value::Null) => return Err(missing("entry_date")),
        Some(Value::String(text)) => text.as_str(),
        Some(_) => return Err(invalid("entry_date")),
    };
    let matter_id = required_text(record, ENTRY, key, "matter_id")?;
    let actions = match record.get("actions") {
        None | Some(Value::Null) => return Err(missing("actions")),
        Some(Value::Array(items)) => items.as_slice(),
        Some(_) => return Err(invalid("actions")),
    };
    let total_minutes = match record.get("total_minutes") {
        None | Some(Value::Null) => return Err(missing("total_minutes")),
        Some(number) => non_negative_integer(number).ok_or_else(|| invalid("total_minutes"))?,
    };
    check_key(ENTRY, key, id)?;

    Ok(RawEntry {
        id,
        entry_date,
        matter_id,
        actions,
        total_minutes,
        week_index: record.get("week_index").and_then(Value::as_u64),
        record,
    })
}

impl RawEntry<'_> {
    fn exclude(&self, reason: ExclusionReason) -> ExcludedEntry {
        ExcludedEntry {
            entry_id: self.id.to_string(),
            reason,
        }
    }

    fn invoice_ref(&self, report: &mut LoadReport) -> Option<InvoiceRef> {
        match self.record.get("invoice_ref") {
            Some(Value::Null) => None,
            Some(value) => match serde_json::from_value::<InvoiceRef>(value.clone()) {
                Ok(invoice) => Some(invoice),
                Err(e) => {
                    tracing::warn!(entry_id = %self.id, error = %e, "dropping malformed invoice reference");
                    report.corrections.push(Correction::InvoiceRefDropped {
                        entry_id: self.id.to_string(),
                    });
                    None
                }
            },
            // Flat fields written by older versions of the tool.
            None => optional_text(self.record, "invoice_storage_filename")
                .filter(|name| !name.is_empty())
                .map(|storage_filename| InvoiceRef {
                    storage_filename: storage_filename.to_string(),
                    original_filename: optional_text(self.record, "invoice_original_filename")
                        .unwrap_or(storage_filename)
                        .to_string(),
                }),
        }
    }

    fn into_entry(self, report: &mut LoadReport) -> Result<Entry, ExcludedEntry> {
        let entry_date = NaiveDate::parse_from_str(self.entry_date, "%Y-%m-%d").map_err(|_| {
            self.exclude(ExclusionReason::UnparseableDate(self.entry_date.to_string()))
        })?;
        if !is_in_window(entry_date) {
            return Err(self.exclude(ExclusionReason::DateOutOfRange(entry_date)));
        }

        let mut actions = Vec::with_capacity(self.actions.len());
        for (position, raw) in self.actions.iter().enumerate() {
            let action = serde_json::from_value::<Action>(raw.clone()).map_err(|e| {
                self.exclude(ExclusionReason::MalformedAction {
                    action: position + 1,
                    detail: e.to_string(),
                })
            })?;
            if let Some(date) = action.action_date.filter(|date| !is_in_window(*date)) {
                return Err(self.exclude(ExclusionReason::MalformedAction {
                    action: position + 1,
                    detail: format!("action_date {date} is outside the logging window"),
                }));
            }
            if action.duration_minutes == 0 || action.duration_minutes % DURATION_STEP_MINUTES != 0 {
                tracing::warn!(
                    entry_id = %self.id,
                    action = position + 1,
                    minutes = action.duration_minutes,
                    "stored duration breaks the quarter-hour rule; it must be fixed before the entry is saved again"
                );
            }
            actions.push(action);
        }
        if actions.is_empty() {
            tracing::warn!(entry_id = %self.id, "entry has no actions");
        }

        let derived_date = earliest_action_date(&actions, entry_date);
        if derived_date != entry_date {
            tracing::warn!(entry_id = %self.id, stored = %entry_date, derived = %derived_date, "entry_date moved to the earliest action date");
            report.corrections.push(Correction::EntryDate {
                entry_id: self.id.to_string(),
                stored: entry_date,
                derived: derived_date,
            });
        }
        let entry_date = derived_date;
        let Ok(week) = week_index(entry_date) else {
            return Err(self.exclude(ExclusionReason::DateOutOfRange(entry_date)));
        };

        if self.week_index != Some(u64::from(week)) {
            tracing::warn!(entry_id = %self.id, stored = ?self.week_index, computed = week, "week_index corrected");
            report.corrections.push(Correction::WeekIndex {
                entry_id: self.id.to_string(),
                stored: self.week_index,
                computed: week,
            });
        }

        let total_minutes = sum_minutes(&actions);
        if self.total_minutes != u64::from(total_minutes) {
            tracing::warn!(entry_id = %self.id, stored = self.total_minutes, computed = total_minutes, "total_minutes corrected");
            report.corrections.push(Correction::TotalMinutes {
                entry_id: self.id.to_string(),
                stored: self.total_minutes,
                computed: total_minutes,
            });
        }

        let invoice_ref = self.invoice_ref(report);
        let created_at = optional_text(self.record, "created_at").and_then(parse_timestamp);
        let updated_at = optional_text(self.record, "updated_at").and_then(parse_timestamp);

        Ok(Entry {
            id: self.id.to_string(),
            entry_date,
            week_index: week,
            matter_id: self.matter_id.to_string(),
            actions,
            total_minutes,
            invoice_ref,
            created_at,
            updated_at,
        })
    }
}
