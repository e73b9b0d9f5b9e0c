// Runtime configuration read from the environment.
//
// Variables
// - WORK_LOG_DATA_FILE: primary store file (default data/worklog.json)
// - WORK_LOG_INVOICES_DIR: attachment directory (default invoices)
// - WORK_LOG_MAX_ATTACHMENT_BYTES: upload size cap (default 10 MiB)

use crate::core::work_log::rules::{AttachmentPolicy, DEFAULT_MAX_ATTACHMENT_BYTES};
use std::path::PathBuf;
use thiserror::Error;

pub const DATA_FILE_VAR: &str = "WORK_LOG_DATA_FILE";
pub const INVOICES_DIR_VAR: &str = "WORK_LOG_INVOICES_DIR";
pub const MAX_ATTACHMENT_BYTES_VAR: &str = "WORK_LOG_MAX_ATTACHMENT_BYTES";

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{key} must be {expected}, got '{value}'")]
    InvalidValue {
        key: &'static str,
        value: String,
        expected: &'static str,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkLogConfig {
    pub data_file: PathBuf,
    pub invoices_dir: PathBuf,
    pub max_attachment_bytes: usize,
}

impl Default for WorkLogConfig {
    fn default() -> Self {
        Self {
            data_file: PathBuf::from("data").join("worklog.json"),
            invoices_dir: PathBuf::from("invoices"),
            max_attachment_bytes: DEFAULT_MAX_ATTACHMENT_BYTES,
        }
    }
}

impl WorkLogConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Unset variables fall back to the defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let path = |key: &'static str, default: PathBuf| match lookup(key) {
            None => Ok(default),
            Some(value) if value.trim().is_empty() => Err(ConfigError::InvalidValue {
                key,
                value,
                expected: "a non-empty path",
            }),
            Some(value) => Ok(PathBuf::from(value.trim())),
        };

        let data_file = path(DATA_FILE_VAR, defaults.data_file)?;
        let invoices_dir = path(INVOICES_DIR_VAR, defaults.invoices_dir)?;
        let max_attachment_bytes = match lookup(MAX_ATTACHMENT_BYTES_VAR) {
            None => defaults.max_attachment_bytes,
            Some(value) => match value.trim().parse::<usize>() {
                Ok(bytes) if bytes > 0 => bytes,
                _ => {
                    return Err(ConfigError::InvalidValue {
                        key: MAX_ATTACHMENT_BYTES_VAR,
                        value,
                        expected: "a positive number of bytes",
                    });
                }
            },
        };

        Ok(Self {
            data_file,
            invoices_dir,
            max_attachment_bytes,
        })
    }

    pub fn attachment_policy(&self) -> AttachmentPolicy {
        AttachmentPolicy::new(self.max_attachment_bytes)
    }
}
