//! Record management on top of a [`MetadataStore`].

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::db::{MetadataStore, StoreError};
use crate::models::{sanitize_name, Job};
use crate::workspace;

/// Missing files are reported and skipped; the record still goes.
async fn remove_artifact(id: Uuid, path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => debug!(%id, path = %path.display(), "Removed artifact"),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            warn!(%id, path = %path.display(), "Artifact already missing")
        }
        Err(e) => warn!(%id, path = %path.display(), "Failed to remove artifact: {}", e),
    }
}

#[derive(Error, Debug)]
pub enum LibraryError {
    #[error("invalid name")]
    InvalidName,
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("export failed: {0}")]
    Export(#[from] io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Variant {
    Original,
    Processed,
}

impl Variant {
    fn path(self, job: &Job) -> &Path {
        match self {
            Variant::Original => &job.original_path,
            Variant::Processed => &job.processed_path,
        }
    }
}

/// Suggested file name when exporting one of a job's artifacts.
pub fn download_name(job: &Job, variant: Variant, excluded_stem: &str) -> String {
    let extension = variant
        .path(job)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("mp3");
    match variant {
        Variant::Original => format!("{}_original.{extension}", job.display_name),
        Variant::Processed => format!("{}_no_{excluded_stem}.{extension}", job.display_name),
    }
}

pub struct Library {
    store: Arc<dyn MetadataStore>,
    excluded_stem: String,
}

impl Library {
    pub fn new(store: Arc<dyn MetadataStore>, excluded_stem: impl Into<String>) -> Self {
        Self {
            store,
            excluded_stem: excluded_stem.into(),
        }
    }

    pub async fn list(&self) -> Result<Vec<Job>, LibraryError> {
        Ok(self.store.list_all().await?)
    }

    pub async fn show(&self, id: Uuid) -> Result<Job, LibraryError> {
        Ok(self.store.get(id).await?)
    }

    /// Concurrent renames resolve as last writer wins.
    pub async fn rename(&self, id: Uuid, name: &str) -> Result<Job, LibraryError> {
        let name = sanitize_name(name);
        if name.is_empty() {
            return Err(LibraryError::InvalidName);
        }
        let job = self.store.rename(id, &name).await?;
        info!(%id, name = %job.display_name, "Renamed job");
        Ok(job)
    }

    /// Removes both artifact files, then the record.
    pub async fn delete(&self, id: Uuid) -> Result<(), LibraryError> {
        let job = self.store.get(id).await?;
        remove_artifact(id, &job.original_path).await;
        remove_artifact(id, &job.processed_path).await;
        self.store.delete(id).await?;
        info!(%id, "Deleted job");
        Ok(())
    }

    /// Copies one artifact into `dest_dir` under its suggested name.
    pub async fn export(&self, id: Uuid, variant: Variant, dest_dir: &Path) -> Result<PathBuf, LibraryError> {
        let job = self.store.get(id).await?;
        let dest = dest_dir.join(download_name(&job, variant, &self.excluded_stem));
        workspace::promote(variant.path(&job), &dest).await?;
        info!(%id, dest = %dest.display(), "Exported artifact");
        Ok(dest)
    }
}
