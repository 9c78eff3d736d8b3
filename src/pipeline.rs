//! One job, end to end: acquire, process, commit, or roll back.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::acquire::{Acquired, Resolver};
use crate::db::MetadataStore;
use crate::error::{AcquisitionFailure, JobError};
use crate::models::{Job, JobSource};
use crate::stems::StemStage;
use crate::workspace::{self, Workspace, Workspaces};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Created,
    Acquiring,
    Processing,
    Committing,
    Done,
    Failed,
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            JobState::Created => "created",
            JobState::Acquiring => "acquiring",
            JobState::Processing => "processing",
            JobState::Committing => "committing",
            JobState::Done => "done",
            JobState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Permanent homes for committed artifacts.
#[derive(Debug, Clone)]
pub struct Layout {
    pub uploads_dir: PathBuf,
    pub processed_dir: PathBuf,
}

impl Layout {
    pub fn original_path(&self, id: Uuid, extension: &str) -> PathBuf {
        self.uploads_dir.join(format!("{id}.{extension}"))
    }

    pub fn processed_path(&self, id: Uuid, extension: &str) -> PathBuf {
        self.processed_dir.join(format!("{id}.{extension}"))
    }
}

pub struct Pipeline {
    resolver: Resolver,
    stage: StemStage,
    workspaces: Workspaces,
    layout: Layout,
    store: Arc<dyn MetadataStore>,
}

impl Pipeline {
    pub fn new(
        resolver: Resolver,
        stage: StemStage,
        workspaces: Workspaces,
        layout: Layout,
        store: Arc<dyn MetadataStore>,
    ) -> Self {
        Self {
            resolver,
            stage,
            workspaces,
            layout,
            store,
        }
    }

    pub fn store(&self) -> &Arc<dyn MetadataStore> {
        &self.store
    }

    /// Runs one job to `Done` or `Failed`.
    ///
    /// On success both artifacts exist and the record is saved. On failure
    /// nothing produced for the job is left behind. Either way the job's
    /// workspace is gone by the time this returns.
    pub async fn run(&self, source: JobSource) -> Result<Job, JobError> {
        let id = Uuid::new_v4();
        let span = info_span!("job", %id, source = source.kind());

        async move {
            info!(state = %JobState::Created, "Job accepted");
            let result = self.execute(id, source).await;
            match &result {
                Ok(job) => info!(state = %JobState::Done, name = %job.display_name, "Job committed"),
                Err(e) => error!(state = %JobState::Failed, "Job failed: {}", e),
            }
            result
        }
        .instrument(span)
        .await
    }

    async fn execute(&self, id: Uuid, source: JobSource) -> Result<Job, JobError> {
        match &source {
            JobSource::Upload { filename, .. } => self.resolver.validate_upload(filename)?,
            JobSource::Remote { url } => self.resolver.validate_url(url)?,
        }

        let workspace = self
            .workspaces
            .allocate(id)
            .await
            .map_err(|e| JobError::acquisition(AcquisitionFailure::LocalStorage, e.to_string()))?;

        let result = self.stages(id, source, &workspace).await;
        workspace.release().await;
        result
    }

    async fn stages(&self, id: Uuid, source: JobSource, workspace: &Workspace) -> Result<Job, JobError> {
        info!(state = %JobState::Acquiring, "Acquiring audio");
        let acquired = match source {
            JobSource::Upload { filename, body } => {
                self.resolver.stage_upload(&filename, body, workspace).await?
            }
            JobSource::Remote { url } => self.resolver.fetch_remote(&url, workspace).await?,
        };

        info!(state = %JobState::Processing, "Processing audio");
        let extension = self.resolver.audio_extension();
        let processed = workspace.join(format!("processed.{extension}"));
        self.stage.run(&acquired.path, &processed, workspace).await?;

        info!(state = %JobState::Committing, "Committing artifacts");
        self.commit(id, acquired, &processed).await
    }

    async fn commit(&self, id: Uuid, acquired: Acquired, processed: &Path) -> Result<Job, JobError> {
        let extension = self.resolver.audio_extension();
        let original_path = self.layout.original_path(id, extension);
        let processed_path = self.layout.processed_path(id, extension);

        workspace::promote(&acquired.path, &original_path)
            .await
            .map_err(|e| JobError::Commit(format!("promoting original: {e}")))?;

        if let Err(e) = workspace::promote(processed, &processed_path).await {
            workspace::discard(&original_path).await;
            return Err(JobError::Commit(format!("promoting processed file: {e}")));
        }

        let job = Job {
            id,
            display_name: acquired.display_name,
            original_path,
            processed_path,
            created_at: Utc::now(),
        };

        if let Err(e) = self.store.save(&job).await {
            warn!("Saving record failed, removing promoted files");
            workspace::discard(&job.original_path).await;
            workspace::discard(&job.processed_path).await;
            return Err(JobError::Commit(format!("saving record: {e}")));
        }

        Ok(job)
    }
}
