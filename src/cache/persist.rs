//! Durable copy of the last published snapshot as a JSON record
//! `{entries, generated_at, next_refresh_at}`.

use crate::errors::PersistError;
use crate::models::Snapshot;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

pub struct SnapshotFile {
    path: PathBuf,
}

impl SnapshotFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Writes to a sibling temp file and renames it over the record, so a
    /// crash mid-write leaves the previous record intact.
    pub async fn save(&self, snapshot: &Snapshot) -> Result<(), PersistError> {
        let body = serde_json::to_vec_pretty(snapshot)?;
        let tmp = self.path.with_extension("tmp");

        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(dir).await?;
        }
        tokio::fs::write(&tmp, body).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }

    /// `Ok(None)` when no record has been written yet.
    pub async fn load(&self) -> Result<Option<Snapshot>, PersistError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
