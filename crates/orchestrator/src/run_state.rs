//! Live state of one pipe run.
//!
//! A [`RunState`] owns the evolving [`RunDocument`] of a run. Mutations are
//! synchronous; persistence happens on spawned tasks that are tracked by a
//! pending-save counter so `done` can wait for them before attaching the run
//! log.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use db::{PersistenceStore, RUN_LOG_ATTACHMENT};
use events::EventBus;
use pipes_core::{PipeConfig, RunDocument, RunStatus, StepStatus, TableStats};
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::engine::EngineContext;
use crate::error::{EngineError, Result, StepError};
use crate::resources::{ConcurrencyGuard, PendingSaves};
use crate::run_log::RunLog;
use crate::state_machine::RunStateMachine;

const RUN_COMPLETED_MESSAGE: &str = "Pipe run completed";

/// Cheaply cloneable handle to a run.
#[derive(Clone)]
pub struct RunState {
    inner: Arc<RunStateInner>,
}

struct RunStateInner {
    id: Uuid,
    doc: Mutex<RunDocument>,
    pipe: Mutex<PipeConfig>,
    ctx: EngineContext,
    holds_guard: AtomicBool,
    pending: PendingSaves,
    /// Serialises saves so a slow save can never overwrite a newer document
    save_lock: tokio::sync::Mutex<()>,
    log: RunLog,
}

impl RunState {
    /// Build a NOT_STARTED run for `pipe` with one step entry per label and
    /// persist it.
    pub async fn create<I, S>(ctx: &EngineContext, pipe: &PipeConfig, step_labels: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let doc = RunDocument::new(pipe, step_labels);
        let log = RunLog::create(&ctx.config.log_dir, doc.id, doc.start_time, ctx.config.debug);

        ctx.store.save_run_document(pipe, &doc).await?;

        log.info(&format!(
            "Created run for pipe '{}' ({}) with {} steps",
            pipe.name,
            pipe.id,
            doc.steps.len()
        ));

        Ok(Self {
            inner: Arc::new(RunStateInner {
                id: doc.id,
                doc: Mutex::new(doc),
                pipe: Mutex::new(pipe.clone()),
                ctx: ctx.clone(),
                holds_guard: AtomicBool::new(false),
                pending: PendingSaves::new(),
                save_lock: tokio::sync::Mutex::new(()),
                log,
            }),
        })
    }

    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    pub fn pipe_id(&self) -> Uuid {
        self.pipe().id
    }

    pub fn status(&self) -> RunStatus {
        self.doc().status
    }

    /// Current document.
    pub fn snapshot(&self) -> RunDocument {
        self.doc().clone()
    }

    pub fn pipe(&self) -> PipeConfig {
        self.inner.pipe.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn log(&self) -> &RunLog {
        &self.inner.log
    }

    /// Number of saves still in flight.
    pub fn pending_saves(&self) -> usize {
        self.inner.pending.count()
    }

    fn doc(&self) -> MutexGuard<'_, RunDocument> {
        self.inner.doc.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn store(&self) -> &Arc<dyn PersistenceStore> {
        &self.inner.ctx.store
    }

    fn bus(&self) -> &EventBus {
        &self.inner.ctx.bus
    }

    fn guard(&self) -> &ConcurrencyGuard {
        &self.inner.ctx.guard
    }

    /// Acquire the concurrency guard and move the run to RUNNING.
    ///
    /// Fails with an admission error, leaving the status untouched, when
    /// another run holds the guard.
    pub async fn start(&self) -> Result<()> {
        if !self.guard().try_acquire(self.id()) {
            self.inner
                .log
                .warn("Cannot start run, another pipe run is in progress");
            return Err(EngineError::run_in_progress());
        }
        self.inner.holds_guard.store(true, Ordering::SeqCst);

        let snapshot = {
            let mut doc = self.doc();
            if let Err(e) = RunStateMachine::validate_transition(doc.status, RunStatus::Running) {
                drop(doc);
                self.release_guard();
                return Err(e);
            }
            doc.status = RunStatus::Running;
            doc.start_time = Utc::now();
            doc.clone()
        };

        self.schedule_save();
        self.inner.log.info("Pipe run started");

        let pipe = self.pipe();
        if pipe.run != Some(self.id()) {
            let run_id = self.id();
            let updated = self
                .store()
                .upsert_pipe(
                    pipe.id,
                    Box::new(move |mut p| {
                        if p.run == Some(run_id) {
                            return None;
                        }
                        p.run = Some(run_id);
                        Some(p)
                    }),
                )
                .await?;
            *self.inner.pipe.lock().unwrap_or_else(PoisonError::into_inner) = updated;
        }

        self.bus().publish_snapshot(snapshot);
        Ok(())
    }

    /// Set the free-text status message and broadcast it.
    pub fn set_message(&self, message: impl Into<String>) {
        let message = message.into();
        let Some(snapshot) = self.mutate(|doc| doc.message = message.clone()) else {
            return;
        };

        self.inner.log.info(&message);
        self.bus().publish_snapshot(snapshot);
    }

    /// Merge statistics for one table into the run and save in the background.
    pub fn add_table_stats(&self, stats: TableStats) {
        let table = stats.table_name.clone();
        let Some(snapshot) = self.mutate(|doc| doc.merge_table_stats(stats)) else {
            return;
        };

        self.inner
            .log
            .debug(&format!("Updated statistics for table '{}'", table));
        self.schedule_save();
        self.bus().publish_snapshot(snapshot);
    }

    /// Mark step `index` as running.
    pub fn begin_step(&self, index: usize) {
        let mut label = None;
        let Some(snapshot) = self.mutate(|doc| {
            if let Some(step) = doc.steps.get_mut(index) {
                step.status = StepStatus::Running;
                label = Some(step.label.clone());
            }
        }) else {
            return;
        };

        if let Some(label) = label {
            self.inner
                .log
                .info(&format!("Step {} '{}' started", index + 1, label));
        }
        self.schedule_save();
        self.bus().publish_snapshot(snapshot);
    }

    /// Record the outcome of step `index`.
    pub fn finish_step(&self, index: usize, error: Option<&StepError>) {
        let mut label = None;
        let Some(snapshot) = self.mutate(|doc| {
            if let Some(step) = doc.steps.get_mut(index) {
                match error {
                    Some(e) => {
                        step.status = StepStatus::Error;
                        step.error = Some(e.to_string());
                    }
                    None => step.status = StepStatus::Finished,
                }
                label = Some(step.label.clone());
            }
        }) else {
            return;
        };

        match (label, error) {
            (Some(label), Some(e)) => self
                .inner
                .log
                .error(&format!("Step {} '{}' failed: {}", index + 1, label, e)),
            (Some(label), None) => self
                .inner
                .log
                .info(&format!("Step {} '{}' finished", index + 1, label)),
            _ => {}
        }
        self.schedule_save();
        self.bus().publish_snapshot(snapshot);
    }

    /// Finalise the run.
    ///
    /// Moves the run to ERROR when `error` is given, FINISHED otherwise, and
    /// saves it before releasing the concurrency guard. Then broadcasts the
    /// final snapshot, clears the pipe's run reference and attaches the run
    /// log. A run that never started is saved but not broadcast. Calling
    /// `done` on a run that is already terminal does nothing.
    pub async fn done(&self, error: Option<&EngineError>) {
        let (final_doc, started) = {
            let mut doc = self.doc();
            if doc.status.is_terminal() {
                debug!(run_id = %self.id(), status = %doc.status, "Run already finalised");
                return;
            }
            let started = doc.status != RunStatus::NotStarted;

            let mut target = RunStateMachine::terminal_status(error.is_some());
            if let Err(e) = RunStateMachine::validate_transition(doc.status, target) {
                warn!(run_id = %self.id(), error = %e, "Finalising run as failed");
                target = RunStatus::Error;
                doc.error = Some(e.to_string());
                doc.message = e.to_string();
            }

            doc.status = target;
            if let Some(e) = error {
                doc.message = e.to_string();
                doc.error = Some(e.to_string());
            } else if target == RunStatus::Finished {
                doc.message = RUN_COMPLETED_MESSAGE.to_string();
            }
            doc.stamp_end(Utc::now());
            doc.num_records = doc.total_records();
            (doc.clone(), started)
        };

        match final_doc.status {
            RunStatus::Finished => self.inner.log.info(&format!(
                "Pipe run completed in {}, {} records",
                final_doc.elapsed_time.as_deref().unwrap_or("-"),
                final_doc.num_records
            )),
            _ => self
                .inner
                .log
                .error(&format!("Pipe run failed: {}", final_doc.message)),
        }

        {
            let _token = self.inner.pending.begin();
            if let Err(e) = self.save_latest().await {
                error!(run_id = %self.id(), error = %e, "Failed to save final run document");
            }
        }
        self.release_guard();

        if started {
            self.bus().publish_snapshot(final_doc.clone());
        }

        self.clear_pipe_reference().await;
        self.attach_log(&final_doc).await;
    }

    /// Apply `f` to the document unless the run is already terminal.
    fn mutate<F>(&self, f: F) -> Option<RunDocument>
    where
        F: FnOnce(&mut RunDocument),
    {
        let mut doc = self.doc();
        if doc.status.is_terminal() {
            debug!(run_id = %self.id(), "Ignoring update to finalised run");
            return None;
        }
        f(&mut doc);
        Some(doc.clone())
    }

    fn release_guard(&self) {
        if self.inner.holds_guard.swap(false, Ordering::SeqCst) {
            self.guard().release_if_held_by(self.id());
        }
    }

    /// Save the latest document on a background task.
    fn schedule_save(&self) {
        let token = self.inner.pending.begin();
        let state = self.clone();
        tokio::spawn(async move {
            let _token = token;
            if let Err(e) = state.save_latest().await {
                warn!(run_id = %state.id(), error = %e, "Failed to save run document");
            }
        });
    }

    async fn save_latest(&self) -> Result<()> {
        let _lock = self.inner.save_lock.lock().await;
        let doc = self.snapshot();
        let pipe = self.pipe();
        self.store().save_run_document(&pipe, &doc).await?;
        Ok(())
    }

    async fn clear_pipe_reference(&self) {
        let run_id = self.id();
        let pipe_id = self.pipe_id();
        let result = self
            .store()
            .upsert_pipe(
                pipe_id,
                Box::new(move |mut p| {
                    if p.run != Some(run_id) {
                        return None;
                    }
                    p.run = None;
                    Some(p)
                }),
            )
            .await;

        match result {
            Ok(pipe) => {
                *self.inner.pipe.lock().unwrap_or_else(PoisonError::into_inner) = pipe;
            }
            Err(db::DbError::PipeNotFound(_)) => {
                debug!(run_id = %run_id, pipe_id = %pipe_id, "Pipe gone, nothing to clear");
            }
            Err(e) => {
                warn!(
                    run_id = %run_id,
                    pipe_id = %pipe_id,
                    error = %e,
                    "Failed to clear pipe run reference"
                );
            }
        }
    }

    async fn attach_log(&self, final_doc: &RunDocument) {
        let timeout = self.inner.ctx.config.attach_wait_timeout;
        if !self.inner.pending.wait_idle(timeout).await {
            let e = EngineError::LogAttachment(format!(
                "{} saves still pending after {:?}",
                self.pending_saves(),
                timeout
            ));
            error!(run_id = %self.id(), error = %e, "Skipping run log attachment");
            return;
        }

        self.inner.log.flush();
        match self
            .store()
            .attach_log_file(self.inner.log.log_path(), final_doc)
            .await
        {
            Ok(()) => {
                self.doc().log_file = Some(RUN_LOG_ATTACHMENT.to_string());
                debug!(run_id = %self.id(), "Run log attached");
            }
            Err(e) => {
                let e = EngineError::LogAttachment(e.to_string());
                error!(run_id = %self.id(), error = %e, "Failed to attach run log");
            }
        }
    }
}

impl std::fmt::Debug for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunState")
            .field("id", &self.id())
            .field("status", &self.status())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use db::{create_memory_pool, run_migrations, SqliteStore};
    use std::time::Duration;

    struct Fixture {
        ctx: EngineContext,
        pipe: PipeConfig,
        _logs: tempfile::TempDir,
    }

    async fn setup() -> Fixture {
        setup_with_attach_wait(Duration::from_secs(5)).await
    }

    async fn setup_with_attach_wait(attach_wait: Duration) -> Fixture {
        let pool = create_memory_pool().await.unwrap();
        run_migrations(&pool).await.unwrap();
        let store = Arc::new(SqliteStore::new(pool));

        let pipe = store
            .save_pipe(&PipeConfig::new("Orders", "sample").with_tables(["orders", "customers"]))
            .await
            .unwrap();

        let logs = tempfile::tempdir().unwrap();
        let ctx = EngineContext {
            store,
            bus: EventBus::new(),
            guard: Arc::new(ConcurrencyGuard::new()),
            config: EngineConfig::default()
                .with_log_dir(logs.path())
                .with_attach_wait_timeout(attach_wait),
        };

        Fixture {
            ctx,
            pipe,
            _logs: logs,
        }
    }

    /// Records whether the guard was still held when a terminal document was saved.
    struct GuardWatchingStore {
        inner: Arc<dyn PersistenceStore>,
        guard: Arc<ConcurrencyGuard>,
        held_at_final_save: Mutex<Vec<bool>>,
    }

    #[async_trait::async_trait]
    impl PersistenceStore for GuardWatchingStore {
        async fn save_run_document(
            &self,
            pipe: &PipeConfig,
            run: &RunDocument,
        ) -> db::Result<RunDocument> {
            if run.status.is_terminal() {
                self.held_at_final_save
                    .lock()
                    .unwrap()
                    .push(self.guard.is_held());
            }
            self.inner.save_run_document(pipe, run).await
        }

        async fn upsert_pipe(&self, pipe_id: Uuid, mutator: db::PipeMutator) -> db::Result<PipeConfig> {
            self.inner.upsert_pipe(pipe_id, mutator).await
        }

        async fn attach_log_file(&self, path: &std::path::Path, run: &RunDocument) -> db::Result<()> {
            self.inner.attach_log_file(path, run).await
        }

        async fn get_run(&self, run_id: Uuid) -> db::Result<Option<RunDocument>> {
            self.inner.get_run(run_id).await
        }

        async fn get_pipe(&self, pipe_id: Uuid) -> db::Result<Option<PipeConfig>> {
            self.inner.get_pipe(pipe_id).await
        }

        async fn save_pipe(&self, pipe: &PipeConfig) -> db::Result<PipeConfig> {
            self.inner.save_pipe(pipe).await
        }

        async fn list_pipes(&self) -> db::Result<Vec<PipeConfig>> {
            self.inner.list_pipes().await
        }

        async fn delete_pipe(&self, pipe_id: Uuid) -> db::Result<bool> {
            self.inner.delete_pipe(pipe_id).await
        }

        async fn list_recent_runs(&self, limit: u32) -> db::Result<Vec<RunDocument>> {
            self.inner.list_recent_runs(limit).await
        }

        async fn list_runs_for_pipe(&self, pipe_id: Uuid, limit: u32) -> db::Result<Vec<RunDocument>> {
            self.inner.list_runs_for_pipe(pipe_id, limit).await
        }

        async fn get_attachment(&self, run_id: Uuid, name: &str) -> db::Result<Option<db::Attachment>> {
            self.inner.get_attachment(run_id, name).await
        }
    }

    #[tokio::test]
    async fn test_create_persists_not_started() {
        let f = setup().await;
        let run = RunState::create(&f.ctx, &f.pipe, ["Extract", "Load"])
            .await
            .unwrap();

        let stored = f.ctx.store.get_run(run.id()).await.unwrap().unwrap();
        assert_eq!(stored.status, RunStatus::NotStarted);
        assert_eq!(stored.steps.len(), 2);
        assert!(stored
            .steps
            .iter()
            .all(|s| s.status == StepStatus::NotStarted));
    }

    #[tokio::test]
    async fn test_start_sets_running_and_pipe_reference() {
        let f = setup().await;
        let run = RunState::create(&f.ctx, &f.pipe, ["Extract"]).await.unwrap();

        run.start().await.unwrap();

        assert_eq!(run.status(), RunStatus::Running);
        assert_eq!(f.ctx.guard.holder(), Some(run.id()));
        let pipe = f.ctx.store.get_pipe(f.pipe.id).await.unwrap().unwrap();
        assert_eq!(pipe.run, Some(run.id()));
    }

    #[tokio::test]
    async fn test_start_skips_pipe_update_when_reference_matches() {
        let f = setup().await;
        let run = RunState::create(&f.ctx, &f.pipe, ["Extract"]).await.unwrap();
        let run_id = run.id();
        f.ctx
            .store
            .upsert_pipe(
                f.pipe.id,
                Box::new(move |mut p| {
                    p.run = Some(run_id);
                    Some(p)
                }),
            )
            .await
            .unwrap();
        let before = f.ctx.store.get_pipe(f.pipe.id).await.unwrap().unwrap();

        // The run was created from a pipe copy that does not carry the reference
        run.start().await.unwrap();

        let after = f.ctx.store.get_pipe(f.pipe.id).await.unwrap().unwrap();
        assert_eq!(after.revision, before.revision);
    }

    #[tokio::test]
    async fn test_start_rejected_when_guard_occupied() {
        let f = setup().await;
        f.ctx.guard.try_acquire(Uuid::new_v4());
        let run = RunState::create(&f.ctx, &f.pipe, ["Extract"]).await.unwrap();

        let result = run.start().await;

        assert!(matches!(result, Err(EngineError::Admission(_))));
        assert_eq!(run.status(), RunStatus::NotStarted);
    }

    #[tokio::test]
    async fn test_table_stats_merge_fields() {
        let f = setup().await;
        let run = RunState::create(&f.ctx, &f.pipe, ["Extract"]).await.unwrap();
        run.start().await.unwrap();

        run.add_table_stats(TableStats::new("orders").with_records(10));
        run.add_table_stats(TableStats::new("orders").with_field("status", "ok"));

        let doc = run.snapshot();
        let orders = &doc.table_stats["orders"];
        assert_eq!(orders.num_records, Some(10));
        assert_eq!(orders.extra["status"], "ok");
    }

    #[tokio::test]
    async fn test_set_message_broadcasts_without_status_change() {
        let f = setup().await;
        let run = RunState::create(&f.ctx, &f.pipe, ["Extract"]).await.unwrap();
        run.start().await.unwrap();
        let mut sub = f.ctx.bus.subscribe();
        // Drain the in-flight snapshot handed out on subscribe
        sub.recv().await.unwrap();

        run.set_message("Extracting orders");

        let event = sub.recv().await.unwrap();
        let snapshot = event.event.snapshot().unwrap();
        assert_eq!(snapshot.message, "Extracting orders");
        assert_eq!(snapshot.status, RunStatus::Running);
    }

    #[tokio::test]
    async fn test_done_aggregates_records_and_finishes() {
        let f = setup().await;
        let run = RunState::create(&f.ctx, &f.pipe, ["Extract"]).await.unwrap();
        run.start().await.unwrap();

        run.add_table_stats(TableStats::new("orders").with_records(10));
        run.add_table_stats(TableStats::new("customers").with_records(5));
        run.add_table_stats(TableStats::new("orders").with_records(12));
        run.done(None).await;

        let doc = run.snapshot();
        assert_eq!(doc.status, RunStatus::Finished);
        assert_eq!(doc.message, "Pipe run completed");
        assert_eq!(doc.num_records, 17);
        assert!(doc.end_time.is_some());
        assert!(doc.elapsed_time.is_some());
        assert!(!f.ctx.guard.is_held());

        let stored = f.ctx.store.get_run(run.id()).await.unwrap().unwrap();
        assert_eq!(stored.status, RunStatus::Finished);
        assert_eq!(stored.num_records, 17);
        assert_eq!(stored.log_file.as_deref(), Some(RUN_LOG_ATTACHMENT));

        let pipe = f.ctx.store.get_pipe(f.pipe.id).await.unwrap().unwrap();
        assert!(pipe.run.is_none());
    }

    #[tokio::test]
    async fn test_done_releases_guard_after_final_save() {
        let mut f = setup().await;
        let store = Arc::new(GuardWatchingStore {
            inner: f.ctx.store.clone(),
            guard: f.ctx.guard.clone(),
            held_at_final_save: Mutex::new(Vec::new()),
        });
        f.ctx.store = store.clone();
        let run = RunState::create(&f.ctx, &f.pipe, ["Extract"]).await.unwrap();
        run.start().await.unwrap();

        run.done(None).await;

        assert_eq!(*store.held_at_final_save.lock().unwrap(), vec![true]);
        assert!(!f.ctx.guard.is_held());

        // The pipe can run again as soon as done returns
        let next = RunState::create(&f.ctx, &f.pipe, ["Extract"]).await.unwrap();
        next.start().await.unwrap();
        assert_eq!(f.ctx.guard.holder(), Some(next.id()));
    }

    #[tokio::test]
    async fn test_done_skips_log_attachment_when_saves_stay_pending() {
        let f = setup_with_attach_wait(Duration::from_millis(50)).await;
        let run = RunState::create(&f.ctx, &f.pipe, ["Extract"]).await.unwrap();
        run.start().await.unwrap();
        let stuck_save = run.inner.pending.begin();

        run.done(None).await;

        let doc = run.snapshot();
        assert_eq!(doc.status, RunStatus::Finished);
        assert!(doc.log_file.is_none());
        assert!(!f.ctx.guard.is_held());

        let stored = f.ctx.store.get_run(run.id()).await.unwrap().unwrap();
        assert_eq!(stored.status, RunStatus::Finished);
        assert!(stored.log_file.is_none());
        assert!(f
            .ctx
            .store
            .get_attachment(run.id(), RUN_LOG_ATTACHMENT)
            .await
            .unwrap()
            .is_none());
        drop(stuck_save);
    }

    #[tokio::test]
    async fn test_done_with_error() {
        let f = setup().await;
        let run = RunState::create(&f.ctx, &f.pipe, ["Extract"]).await.unwrap();
        run.start().await.unwrap();

        let err = EngineError::from(StepError::new("connection refused"));
        run.done(Some(&err)).await;

        let doc = run.snapshot();
        assert_eq!(doc.status, RunStatus::Error);
        assert_eq!(doc.message, "connection refused");
        assert_eq!(doc.error.as_deref(), Some("connection refused"));
    }

    #[tokio::test]
    async fn test_done_is_idempotent() {
        let f = setup().await;
        let run = RunState::create(&f.ctx, &f.pipe, ["Extract"]).await.unwrap();
        run.start().await.unwrap();

        run.done(None).await;
        let first = run.snapshot();
        run.done(Some(&EngineError::Validation("late".into()))).await;

        assert_eq!(run.snapshot(), first);
    }

    #[tokio::test]
    async fn test_done_does_not_release_foreign_guard() {
        let f = setup().await;
        let holder = Uuid::new_v4();
        f.ctx.guard.try_acquire(holder);
        let run = RunState::create(&f.ctx, &f.pipe, ["Extract"]).await.unwrap();

        let err = run.start().await.unwrap_err();
        run.done(Some(&err)).await;

        assert_eq!(f.ctx.guard.holder(), Some(holder));
        let stored = f.ctx.store.get_run(run.id()).await.unwrap().unwrap();
        assert_eq!(stored.status, RunStatus::Error);
    }

    #[tokio::test]
    async fn test_rejected_run_is_not_broadcast() {
        let f = setup().await;
        let active = RunState::create(&f.ctx, &f.pipe, ["Extract"]).await.unwrap();
        active.start().await.unwrap();
        let published = f.ctx.bus.event_count();

        let rejected = RunState::create(&f.ctx, &f.pipe, ["Extract"]).await.unwrap();
        let err = rejected.start().await.unwrap_err();
        rejected.done(Some(&err)).await;

        assert_eq!(rejected.status(), RunStatus::Error);
        assert_eq!(f.ctx.bus.event_count(), published);
        assert_eq!(f.ctx.bus.current_snapshot().map(|r| r.id), Some(active.id()));
        assert_eq!(f.ctx.guard.holder(), Some(active.id()));
    }

    #[tokio::test]
    async fn test_done_keeps_newer_pipe_reference() {
        let f = setup().await;
        let run = RunState::create(&f.ctx, &f.pipe, ["Extract"]).await.unwrap();
        run.start().await.unwrap();

        let other = Uuid::new_v4();
        f.ctx
            .store
            .upsert_pipe(
                f.pipe.id,
                Box::new(move |mut p| {
                    p.run = Some(other);
                    Some(p)
                }),
            )
            .await
            .unwrap();

        run.done(None).await;

        let pipe = f.ctx.store.get_pipe(f.pipe.id).await.unwrap().unwrap();
        assert_eq!(pipe.run, Some(other));
    }

    #[tokio::test]
    async fn test_updates_after_done_are_ignored() {
        let f = setup().await;
        let run = RunState::create(&f.ctx, &f.pipe, ["Extract"]).await.unwrap();
        run.start().await.unwrap();
        run.done(None).await;

        run.add_table_stats(TableStats::new("orders").with_records(99));
        run.set_message("too late");

        let doc = run.snapshot();
        assert!(doc.table_stats.is_empty());
        assert_eq!(doc.message, "Pipe run completed");
    }

    #[tokio::test]
    async fn test_step_progress_recorded() {
        let f = setup().await;
        let run = RunState::create(&f.ctx, &f.pipe, ["Extract", "Load"])
            .await
            .unwrap();
        run.start().await.unwrap();

        run.begin_step(0);
        assert_eq!(run.snapshot().steps[0].status, StepStatus::Running);

        run.finish_step(0, None);
        run.begin_step(1);
        run.finish_step(1, Some(&StepError::new("disk full")));

        let doc = run.snapshot();
        assert_eq!(doc.steps[0].status, StepStatus::Finished);
        assert_eq!(doc.steps[1].status, StepStatus::Error);
        assert_eq!(doc.steps[1].error.as_deref(), Some("disk full"));
    }
}
