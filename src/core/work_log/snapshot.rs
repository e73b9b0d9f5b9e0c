// Pure mutations of the in-memory snapshot.
//
// Responsibilities
// - Enforce the business rules on every change: case-insensitive unique
//   matter names, window-bound dates, validated actions.
// - Keep the derived fields (`entry_date` when actions are dated,
//   `week_index`, `total_minutes`) consistent with their sources.
//
// Boundaries
// - Never performs input or output. Durability and rollback are the
//   repository's job; a failed call here may leave partial changes that the
//   repository discards with the rest of the unit of work.

use crate::core::work_log::commands::{EntryDraft, MatterRef};
use crate::core::work_log::model::{Entry, InvoiceRef, Matter, Snapshot, earliest_action_date};
use crate::core::work_log::rules::{
    ValidationError, normalize_matter_name, validate_actions, validate_matter_name,
};
use crate::core::work_log::week::week_index;
use crate::shared::core::primitives::new_id;
use chrono::{DateTime, Utc};
use std::collections::HashSet;

fn clean_case_type(case_type: Option<&str>) -> Option<String> {
    case_type
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

impl Snapshot {
    pub fn matter(&self, matter_id: &str) -> Option<&Matter> {
        self.matters.get(matter_id)
    }

    pub fn matter_by_name(&self, name: &str) -> Option<&Matter> {
        let key = normalize_matter_name(name);
        self.matters
            .values()
            .find(|matter| normalize_matter_name(&matter.name) == key)
    }

    pub fn entry(&self, entry_id: &str) -> Option<&Entry> {
        self.entries.get(entry_id)
    }

    /// Storage names of every attachment an entry refers to.
    pub fn invoice_filenames(&self) -> HashSet<String> {
        self.entries
            .values()
            .filter_map(|entry| entry.invoice_ref.as_ref())
            .map(|invoice| invoice.storage_filename.clone())
            .collect()
    }

    /// Returns the matter with the same name (ignoring case) or creates one.
    /// A non-empty `case_type` different from the stored one replaces it.
    pub fn upsert_matter(
        &mut self,
        name: &str,
        case_type: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Matter, ValidationError> {
        let name = validate_matter_name(name)?;
        let case_type = clean_case_type(case_type);
        let key = normalize_matter_name(&name);

        if let Some(existing) = self
            .matters
            .values_mut()
            .find(|matter| normalize_matter_name(&matter.name) == key)
        {
            if case_type.is_some() && existing.case_type != case_type {
                existing.case_type = case_type;
            }
            return Ok(existing.clone());
        }

        let matter = Matter {
            id: new_id(),
            name,
            case_type,
            created_at: now,
        };
        self.matters.insert(matter.id.clone(), matter.clone());
        Ok(matter)
    }

    pub fn update_matter(
        &mut self,
        matter_id: &str,
        name: &str,
        case_type: Option<&str>,
    ) -> Result<Matter, ValidationError> {
        let name = validate_matter_name(name)?;
        let key = normalize_matter_name(&name);
        if self
            .matters
            .values()
            .any(|other| other.id != matter_id && normalize_matter_name(&other.name) == key)
        {
            return Err(ValidationError::DuplicateMatterName { name });
        }

        let matter = self
            .matters
            .get_mut(matter_id)
            .ok_or_else(|| ValidationError::UnknownMatter {
                matter_id: matter_id.to_string(),
            })?;
        matter.name = name;
        matter.case_type = clean_case_type(case_type);
        Ok(matter.clone())
    }

    /// Entries that referenced the matter stay in place as soft orphans.
    pub fn remove_matter(&mut self, matter_id: &str) -> Result<Matter, ValidationError> {
        self.matters
            .remove(matter_id)
            .ok_or_else(|| ValidationError::UnknownMatter {
                matter_id: matter_id.to_string(),
            })
    }

    pub fn resolve_matter(
        &mut self,
        matter: &MatterRef,
        now: DateTime<Utc>,
    ) -> Result<Matter, ValidationError> {
        match matter {
            MatterRef::Existing(matter_id) => {
                self.matter(matter_id)
                    .cloned()
                    .ok_or_else(|| ValidationError::UnknownMatter {
                        matter_id: matter_id.clone(),
                    })
            }
            MatterRef::Named { name, case_type } => {
                self.upsert_matter(name, case_type.as_deref(), now)
            }
        }
    }

    pub fn insert_entry(
        &mut self,
        draft: &EntryDraft,
        invoice_ref: Option<InvoiceRef>,
        now: DateTime<Utc>,
    ) -> Result<Entry, ValidationError> {
        let total_minutes = validate_actions(&draft.actions)?;
        let entry_date = earliest_action_date(&draft.actions, draft.entry_date);
        let week = week_index(entry_date)?;
        let matter = self.resolve_matter(&draft.matter, now)?;

        let entry = Entry {
            id: new_id(),
            entry_date,
            week_index: week,
            matter_id: matter.id,
            actions: draft.actions.clone(),
            total_minutes,
            invoice_ref,
            created_at: Some(now),
            updated_at: Some(now),
        };
        self.entries.insert(entry.id.clone(), entry.clone());
        Ok(entry)
    }

    /// Replaces date, matter and actions of an entry. The invoice reference
    /// and creation time are left untouched.
    pub fn replace_entry(
        &mut self,
        entry_id: &str,
        draft: &EntryDraft,
        now: DateTime<Utc>,
    ) -> Result<Entry, ValidationError> {
        if !self.entries.contains_key(entry_id) {
            return Err(ValidationError::UnknownEntry {
                entry_id: entry_id.to_string(),
            });
        }
        let total_minutes = validate_actions(&draft.actions)?;
        let entry_date = earliest_action_date(&draft.actions, draft.entry_date);
        let week = week_index(entry_date)?;
        let matter = self.resolve_matter(&draft.matter, now)?;

        let entry = self
            .entries
            .get_mut(entry_id)
            .ok_or_else(|| ValidationError::UnknownEntry {
                entry_id: entry_id.to_string(),
            })?;
        entry.entry_date = entry_date;
        entry.week_index = week;
        entry.matter_id = matter.id;
        entry.actions = draft.actions.clone();
        entry.total_minutes = total_minutes;
        entry.updated_at = Some(now);
        Ok(entry.clone())
    }

    /// Returns the reference that was replaced, if any.
    pub fn set_invoice(
        &mut self,
        entry_id: &str,
        invoice_ref: Option<InvoiceRef>,
        now: DateTime<Utc>,
    ) -> Result<Option<InvoiceRef>, ValidationError> {
        let entry = self
            .entries
            .get_mut(entry_id)
            .ok_or_else(|| ValidationError::UnknownEntry {
                entry_id: entry_id.to_string(),
            })?;
        entry.updated_at = Some(now);
        Ok(std::mem::replace(&mut entry.invoice_ref, invoice_ref))
    }

    pub fn remove_entry(&mut self, entry_id: &str) -> Result<Entry, ValidationError> {
        self.entries
            .remove(entry_id)
            .ok_or_else(|| ValidationError::UnknownEntry {
                entry_id: entry_id.to_string(),
            })
    }
}
