// File backed implementation of the SnapshotStore port.
//
// Purpose
// - Keep the primary store file intact across crashes and failed writes.
//
// Responsibilities
// - Write the new contents to a unique temp file next to the primary, flush
//   and fsync it, then rename it over the primary. The rename is the only
//   operation that touches the primary path.
// - Before the rename, copy the current primary to `<name>.bak` so the
//   previous good snapshot survives a bad save. Backup failures are logged
//   and never abort the save.
// - Remove the temp file on every failure path.

use crate::core::ports::{SnapshotStore, SnapshotStoreError};
use crate::shared::core::primitives::new_id;
use async_trait::async_trait;
use std::ffi::OsString;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;

pub struct FileSnapshotStore {
    path: PathBuf,
}

impl FileSnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn backup_path(&self) -> PathBuf {
        self.sibling(".bak")
    }

    fn sibling(&self, suffix: &str) -> PathBuf {
        let mut name: OsString = self
            .path
            .file_name()
            .map(OsString::from)
            .unwrap_or_else(|| OsString::from("worklog.json"));
        name.push(suffix);
        self.path.with_file_name(name)
    }

    fn parent_dir(&self) -> PathBuf {
        match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        }
    }

    async fn read_optional(path: &Path) -> Result<Option<String>, SnapshotStoreError> {
        match fs::read_to_string(path).await {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(SnapshotStoreError::io(path, e)),
        }
    }

    async fn write_temp(temp: &Path, contents: &str) -> std::io::Result<()> {
        let mut file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(temp)
            .await?;
        file.write_all(contents.as_bytes()).await?;
        file.flush().await?;
        file.sync_all().await?;
        Ok(())
    }

    async fn refresh_backup(&self) {
        match fs::try_exists(&self.path).await {
            Ok(true) => {}
            Ok(false) => return,
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "could not check primary before backup");
                return;
            }
        }
        let staging = self.sibling(".bak.tmp");
        let backup = self.backup_path();
        let result = async {
            fs::copy(&self.path, &staging).await?;
            fs::rename(&staging, &backup).await
        }
        .await;
        if let Err(e) = result {
            tracing::warn!(backup = %backup.display(), error = %e, "backup refresh failed, continuing with save");
            let _ = fs::remove_file(&staging).await;
        }
    }

    async fn replace_primary(&self, contents: &str, refresh_backup: bool) -> Result<(), SnapshotStoreError> {
        let dir = self.parent_dir();
        fs::create_dir_all(&dir)
            .await
            .map_err(|e| SnapshotStoreError::io(&dir, e))?;

        let temp = self.sibling(&format!(".tmp.{}.{}", std::process::id(), new_id()));
        if let Err(e) = Self::write_temp(&temp, contents).await {
            let _ = fs::remove_file(&temp).await;
            return Err(SnapshotStoreError::io(&temp, e));
        }

        if refresh_backup {
            self.refresh_backup().await;
        }

        if let Err(e) = fs::rename(&temp, &self.path).await {
            let _ = fs::remove_file(&temp).await;
            return Err(SnapshotStoreError::io(&self.path, e));
        }
        Self::sync_dir(&dir).await;
        Ok(())
    }

    #[cfg(unix)]
    async fn sync_dir(dir: &Path) {
        let result = async { fs::File::open(dir).await?.sync_all().await }.await;
        if let Err(e) = result {
            tracing::debug!(dir = %dir.display(), error = %e, "directory fsync skipped");
        }
    }

    #[cfg(not(unix))]
    async fn sync_dir(_dir: &Path) {}
}

#[async_trait]
impl SnapshotStore for FileSnapshotStore {
    async fn load(&self) -> Result<Option<String>, SnapshotStoreError> {
        Self::read_optional(&self.path).await
    }

    async fn load_backup(&self) -> Result<Option<String>, SnapshotStoreError> {
        Self::read_optional(&self.backup_path()).await
    }

    async fn persist(&self, contents: &str) -> Result<(), SnapshotStoreError> {
        self.replace_primary(contents, true).await?;
        tracing::debug!(path = %self.path.display(), bytes = contents.len(), "snapshot persisted");
        Ok(())
    }

    async fn restore_backup(&self) -> Result<bool, SnapshotStoreError> {
        let Some(contents) = self.load_backup().await? else {
            return Ok(false);
        };
        self.replace_primary(&contents, false).await?;
        tracing::info!(path = %self.path.display(), "primary restored from backup");
        Ok(true)
    }

    fn backup_location(&self) -> String {
        self.backup_path().display().to_string()
    }
}
