//! Dump directory lifecycle.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tokio::fs;
use tracing::info;

use crate::error::{MigrateError, Result};

/// Directory holding a directory-format archive.
#[derive(Debug, Clone)]
pub struct DumpDir {
    path: PathBuf,
}

impl DumpDir {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Remove the directory if present and recreate it empty.
    pub async fn reset(&self) -> Result<()> {
        info!("Removing existing dump directory {}", self.path.display());
        self.remove().await?;

        info!("Creating dump directory {}", self.path.display());
        fs::create_dir_all(&self.path)
            .await
            .map_err(|e| MigrateError::filesystem(&self.path, e))
    }

    /// Remove the directory so pg_dump can create it. A missing directory is fine.
    ///
    /// Returns whether anything was removed.
    pub async fn remove(&self) -> Result<bool> {
        match fs::remove_dir_all(&self.path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(MigrateError::filesystem(&self.path, e)),
        }
    }

    /// Whether the directory exists and holds at least one entry.
    #[cfg(test)]
    async fn is_populated(&self) -> Result<bool> {
        let mut entries = match fs::read_dir(&self.path).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(MigrateError::filesystem(&self.path, e)),
        };
        Ok(entries
            .next_entry()
            .await
            .map_err(|e| MigrateError::filesystem(&self.path, e))?
            .is_some())
    }
}
