// Business rules applied before anything is written.
//
// Responsibilities
// - Action and duration rules (positive, quarter-hour multiples, described).
// - Matter name normalization for case-insensitive lookup.
// - Attachment policy (allowed document/image types, signature, size cap).
//
// Boundaries
// - Pure functions. No input or output.

use crate::core::work_log::model::{Action, sum_minutes};
use crate::core::work_log::week::{OutOfRangeError, is_in_window};
use chrono::NaiveDate;
use crate::shared::core::primitives::new_id;
use std::path::Path;
use thiserror::Error;

pub const DURATION_STEP_MINUTES: u32 = 15;
pub const DEFAULT_MAX_ATTACHMENT_BYTES: usize = 10 * 1024 * 1024;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("matter name cannot be empty")]
    EmptyMatterName,

    #[error("another matter is already named '{name}'")]
    DuplicateMatterName { name: String },

    #[error("matter {matter_id} does not exist")]
    UnknownMatter { matter_id: String },

    #[error("entry {entry_id} does not exist")]
    UnknownEntry { entry_id: String },

    #[error("at least one action is required")]
    NoActions,

    #[error("action {action}: description cannot be empty")]
    EmptyActionDescription { action: usize },

    #[error("action {action}: duration must be greater than 0")]
    NonPositiveDuration { action: usize },

    #[error(
        "action {action}: duration of {minutes} minutes is not a multiple of {step}",
        step = DURATION_STEP_MINUTES
    )]
    DurationNotQuarterHour { action: usize, minutes: u32 },

    #[error("action {action}: date {date} is outside the logging window")]
    ActionDateOutOfRange { action: usize, date: NaiveDate },

    #[error(transparent)]
    DateOutOfRange(#[from] OutOfRangeError),

    #[error("attachment '{filename}' is empty")]
    EmptyAttachment { filename: String },

    #[error("attachment '{filename}' is {size} bytes, the limit is {max} bytes")]
    AttachmentTooLarge {
        filename: String,
        size: usize,
        max: usize,
    },

    #[error("attachment '{filename}' is not an accepted type (pdf, png, jpg, jpeg, doc, docx)")]
    UnsupportedAttachmentType { filename: String },

    #[error("attachment '{filename}' content does not match its extension")]
    AttachmentSignatureMismatch { filename: String },
}

pub fn normalize_matter_name(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Returns the trimmed name that is stored.
pub fn validate_matter_name(name: &str) -> Result<String, ValidationError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::EmptyMatterName);
    }
    Ok(trimmed.to_string())
}

/// `action` is the 1-based position used in messages.
pub fn validate_duration(action: usize, minutes: u32) -> Result<(), ValidationError> {
    if minutes == 0 {
        return Err(ValidationError::NonPositiveDuration { action });
    }
    if minutes % DURATION_STEP_MINUTES != 0 {
        return Err(ValidationError::DurationNotQuarterHour { action, minutes });
    }
    Ok(())
}

pub fn validate_action(action: usize, candidate: &Action) -> Result<(), ValidationError> {
    if candidate.description.trim().is_empty() {
        return Err(ValidationError::EmptyActionDescription { action });
    }
    validate_duration(action, candidate.duration_minutes)?;
    match candidate.action_date {
        Some(date) if !is_in_window(date) => Err(ValidationError::ActionDateOutOfRange { action, date }),
        _ => Ok(()),
    }
}

/// Validates every action and returns the total minutes.
pub fn validate_actions(actions: &[Action]) -> Result<u32, ValidationError> {
    if actions.is_empty() {
        return Err(ValidationError::NoActions);
    }
    for (position, action) in actions.iter().enumerate() {
        validate_action(position + 1, action)?;
    }
    Ok(sum_minutes(actions))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachmentKind {
    Pdf,
    Png,
    Jpeg,
    Doc,
    Docx,
}

impl AttachmentKind {
    fn from_filename(filename: &str) -> Option<Self> {
        let extension = Path::new(filename)
            .extension()
            .and_then(|ext| ext.to_str())?
            .to_ascii_lowercase();
        match extension.as_str() {
            "pdf" => Some(Self::Pdf),
            "png" => Some(Self::Png),
            "jpg" | "jpeg" => Some(Self::Jpeg),
            "doc" => Some(Self::Doc),
            "docx" => Some(Self::Docx),
            _ => None,
        }
    }

    fn signature(&self) -> &'static [u8] {
        match self {
            Self::Pdf => b"%PDF",
            Self::Png => b"\x89PNG\r\n\x1a\n",
            Self::Jpeg => b"\xff\xd8\xff",
            Self::Doc => b"\xd0\xcf\x11\xe0\xa1\xb1\x1a\xe1",
            Self::Docx => b"PK\x03\x04",
        }
    }

    fn matches(&self, bytes: &[u8]) -> bool {
        bytes.starts_with(self.signature())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttachmentPolicy {
    pub max_bytes: usize,
}

impl Default for AttachmentPolicy {
    fn default() -> Self {
        Self {
            max_bytes: DEFAULT_MAX_ATTACHMENT_BYTES,
        }
    }
}

impl AttachmentPolicy {
    pub fn new(max_bytes: usize) -> Self {
        Self { max_bytes }
    }

    /// Checks run in order: type by extension, emptiness, size, then the
    /// signature. The first failure is returned.
    pub fn check(&self, filename: &str, bytes: &[u8]) -> Result<AttachmentKind, ValidationError> {
        let kind = AttachmentKind::from_filename(filename).ok_or_else(|| {
            ValidationError::UnsupportedAttachmentType {
                filename: filename.to_string(),
            }
        })?;
        if bytes.is_empty() {
            return Err(ValidationError::EmptyAttachment {
                filename: filename.to_string(),
            });
        }
        if bytes.len() > self.max_bytes {
            return Err(ValidationError::AttachmentTooLarge {
                filename: filename.to_string(),
                size: bytes.len(),
                max: self.max_bytes,
            });
        }
        if !kind.matches(bytes) {
            return Err(ValidationError::AttachmentSignatureMismatch {
                filename: filename.to_string(),
            });
        }
        Ok(kind)
    }
}

/// Fresh storage name: `<uuid>_<sanitized original name>`.
pub fn storage_filename_for(original_filename: &str) -> String {
    let base = original_filename
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default();
    let sanitized: String = base
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let sanitized = sanitized.trim_start_matches('.');
    let sanitized = if sanitized.is_empty() {
        "attachment"
    } else {
        sanitized
    };
    format!("{}_{}", new_id(), sanitized)
}
