// Shared test fixture for the RecordEntry command.
// Compiled only for tests, exposed as `crate::test_support::fixtures::commands::record_entry`.

use crate::core::work_log::commands::{EntryDraft, InvoiceUpload, MatterRef, RecordEntry};
use crate::core::work_log::model::Action;
use chrono::NaiveDate;
use serde::Deserialize;

pub const PDF_BYTES: &[u8] = b"%PDF-1.7\n1 0 obj\n<<>>\nendobj\n%%EOF";

// JSON -> DTO (transport shape)
#[derive(Debug, Clone, Deserialize)]
pub struct RecordEntryDto {
    pub matter_name: String,
    pub case_type: Option<String>,
    pub entry_date: NaiveDate,
    pub actions: Vec<Action>,
    pub invoice_original_filename: Option<String>,
}

pub struct RecordEntryBuilder {
    inner: RecordEntry,
}

impl Default for RecordEntryBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[allow(dead_code)]
impl RecordEntryBuilder {
    pub fn new() -> Self {
        let dto: RecordEntryDto =
            serde_json::from_str(include_str!("json/record_entry.json")).unwrap();

        Self {
            inner: RecordEntry {
                draft: EntryDraft {
                    matter: MatterRef::named(dto.matter_name, dto.case_type.as_deref()),
                    entry_date: dto.entry_date,
                    actions: dto.actions,
                },
                invoice: dto
                    .invoice_original_filename
                    .map(|name| InvoiceUpload::new(name, PDF_BYTES)),
            },
        }
    }

    pub fn matter(mut self, v: MatterRef) -> Self {
        self.inner.draft.matter = v;
        self
    }

    pub fn entry_date(mut self, v: NaiveDate) -> Self {
        self.inner.draft.entry_date = v;
        self
    }

    pub fn actions(mut self, v: Vec<Action>) -> Self {
        self.inner.draft.actions = v;
        self
    }

    pub fn invoice(mut self, filename: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        self.inner.invoice = Some(InvoiceUpload::new(filename, bytes));
        self
    }

    pub fn without_invoice(mut self) -> Self {
        self.inner.invoice = None;
        self
    }

    pub fn build(self) -> RecordEntry {
        self.inner
    }
}
