// Command data types for the write flow.
//
// Purpose
// - Express caller intent (record, amend) independent of any transport.
// - Carry input for the snapshot mutations and the command handlers to
//   validate. Nothing here is trusted until validated.

use crate::core::work_log::model::Action;
use chrono::NaiveDate;

/// The matter an entry is logged against: an existing id, or a name that is
/// resolved case-insensitively and created when missing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatterRef {
    Existing(String),
    Named {
        name: String,
        case_type: Option<String>,
    },
}

impl MatterRef {
    pub fn existing(matter_id: impl Into<String>) -> Self {
        Self::Existing(matter_id.into())
    }

    pub fn named(name: impl Into<String>, case_type: Option<&str>) -> Self {
        Self::Named {
            name: name.into(),
            case_type: case_type.map(str::to_string),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryDraft {
    pub matter: MatterRef,
    pub entry_date: NaiveDate,
    pub actions: Vec<Action>,
}

/// Uploaded file contents as handed over by the presentation layer.
#[derive(Clone, PartialEq, Eq)]
pub struct InvoiceUpload {
    pub original_filename: String,
    pub bytes: Vec<u8>,
}

impl InvoiceUpload {
    pub fn new(original_filename: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            original_filename: original_filename.into(),
            bytes: bytes.into(),
        }
    }
}

impl std::fmt::Debug for InvoiceUpload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InvoiceUpload")
            .field("original_filename", &self.original_filename)
            .field("bytes", &self.bytes.len())
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordEntry {
    pub draft: EntryDraft,
    pub invoice: Option<InvoiceUpload>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum InvoiceChange {
    #[default]
    Keep,
    Replace(InvoiceUpload),
    Remove,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AmendEntry {
    pub entry_id: String,
    pub draft: EntryDraft,
    pub invoice: InvoiceChange,
}
