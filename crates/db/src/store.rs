use std::path::Path;

use async_trait::async_trait;
use pipes_core::{PipeConfig, RunDocument};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::error::{DbError, Result};
use crate::models::{Attachment, RUN_LOG_ATTACHMENT};
use crate::repositories::{PipeRepository, RunRepository};

/// Receives the currently stored pipe and returns the mutated pipe, or `None`
/// when no change is needed.
pub type PipeMutator = Box<dyn Fn(PipeConfig) -> Option<PipeConfig> + Send + Sync>;

const UPSERT_MAX_ATTEMPTS: usize = 5;

/// Storage used by the run engine and the HTTP adapter.
#[async_trait]
pub trait PersistenceStore: Send + Sync {
    /// Persist the full run document, replacing any previous version.
    async fn save_run_document(&self, pipe: &PipeConfig, run: &RunDocument) -> Result<RunDocument>;

    /// Read-modify-write of a stored pipe.
    async fn upsert_pipe(&self, pipe_id: Uuid, mutator: PipeMutator) -> Result<PipeConfig>;

    /// Attach the file at `path` to the run as its log and record the
    /// attachment name on the stored document.
    async fn attach_log_file(&self, path: &Path, run: &RunDocument) -> Result<()>;

    async fn get_run(&self, run_id: Uuid) -> Result<Option<RunDocument>>;

    async fn get_pipe(&self, pipe_id: Uuid) -> Result<Option<PipeConfig>>;

    async fn save_pipe(&self, pipe: &PipeConfig) -> Result<PipeConfig>;

    async fn list_pipes(&self) -> Result<Vec<PipeConfig>>;

    async fn delete_pipe(&self, pipe_id: Uuid) -> Result<bool>;

    async fn list_recent_runs(&self, limit: u32) -> Result<Vec<RunDocument>>;

    async fn list_runs_for_pipe(&self, pipe_id: Uuid, limit: u32) -> Result<Vec<RunDocument>>;

    async fn get_attachment(&self, run_id: Uuid, name: &str) -> Result<Option<Attachment>>;
}

/// SQLite backed [`PersistenceStore`].
#[derive(Clone)]
pub struct SqliteStore {
    pipes: PipeRepository,
    runs: RunRepository,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pipes: PipeRepository::new(pool.clone()),
            runs: RunRepository::new(pool),
        }
    }
}

#[async_trait]
impl PersistenceStore for SqliteStore {
    async fn save_run_document(&self, pipe: &PipeConfig, run: &RunDocument) -> Result<RunDocument> {
        tracing::trace!(
            run_id = %run.id,
            pipe_id = %pipe.id,
            status = %run.status,
            "Saving run document"
        );
        self.runs.save(run).await?;
        Ok(run.clone())
    }

    async fn upsert_pipe(&self, pipe_id: Uuid, mutator: PipeMutator) -> Result<PipeConfig> {
        for attempt in 1..=UPSERT_MAX_ATTEMPTS {
            let current = self
                .pipes
                .find_by_id(pipe_id)
                .await?
                .ok_or(DbError::PipeNotFound(pipe_id))?;

            let Some(mut updated) = mutator(current.clone()) else {
                return Ok(current);
            };
            updated.revision = current.revision;

            if let Some(stored) = self.pipes.update_if_revision(&updated).await? {
                return Ok(stored);
            }

            tracing::debug!(
                pipe_id = %pipe_id,
                attempt,
                "Pipe changed underneath upsert, retrying"
            );
        }

        Err(DbError::Conflict(pipe_id))
    }

    async fn attach_log_file(&self, path: &Path, run: &RunDocument) -> Result<()> {
        let data = tokio::fs::read(path).await?;
        self.runs
            .attach(run.id, RUN_LOG_ATTACHMENT, "text/plain", &data)
            .await?;

        let mut stored = self
            .runs
            .find_by_id(run.id)
            .await?
            .unwrap_or_else(|| run.clone());
        stored.log_file = Some(RUN_LOG_ATTACHMENT.to_string());
        self.runs.save(&stored).await?;

        tracing::debug!(
            run_id = %run.id,
            path = %path.display(),
            bytes = data.len(),
            "Attached run log"
        );
        Ok(())
    }

    async fn get_run(&self, run_id: Uuid) -> Result<Option<RunDocument>> {
        self.runs.find_by_id(run_id).await
    }

    async fn get_pipe(&self, pipe_id: Uuid) -> Result<Option<PipeConfig>> {
        self.pipes.find_by_id(pipe_id).await
    }

    async fn save_pipe(&self, pipe: &PipeConfig) -> Result<PipeConfig> {
        self.pipes.save(pipe).await
    }

    async fn list_pipes(&self) -> Result<Vec<PipeConfig>> {
        self.pipes.find_all().await
    }

    async fn delete_pipe(&self, pipe_id: Uuid) -> Result<bool> {
        self.pipes.delete(pipe_id).await
    }

    async fn list_recent_runs(&self, limit: u32) -> Result<Vec<RunDocument>> {
        self.runs.find_recent(limit).await
    }

    async fn list_runs_for_pipe(&self, pipe_id: Uuid, limit: u32) -> Result<Vec<RunDocument>> {
        self.runs.find_by_pipe(pipe_id, limit).await
    }

    async fn get_attachment(&self, run_id: Uuid, name: &str) -> Result<Option<Attachment>> {
        self.runs.find_attachment(run_id, name).await
    }
}
