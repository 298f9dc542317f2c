//! Run engine: admission, sequential step execution and finalisation.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use db::PersistenceStore;
use events::EventBus;
use futures::FutureExt;
use pipes_core::{PipeConfig, RunDocument, RunStatus};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::connector::{Connector, ConnectorRegistry};
use crate::error::{EngineError, Result, StepError};
use crate::resources::ConcurrencyGuard;
use crate::run_state::RunState;
use crate::step::{Step, StepContext};

/// Collaborators shared by the engine and every run it starts.
#[derive(Clone)]
pub struct EngineContext {
    pub store: Arc<dyn PersistenceStore>,
    pub bus: EventBus,
    pub guard: Arc<ConcurrencyGuard>,
    pub config: EngineConfig,
}

/// Handle to a started run.
#[derive(Debug)]
pub struct RunHandle {
    state: RunState,
    task: JoinHandle<()>,
}

impl RunHandle {
    pub fn id(&self) -> Uuid {
        self.state.id()
    }

    pub fn state(&self) -> &RunState {
        &self.state
    }

    /// Wait for the run to be finalised and return its last snapshot.
    pub async fn wait(self) -> RunDocument {
        if let Err(e) = self.task.await {
            warn!(run_id = %self.state.id(), error = %e, "Run task did not complete");
        }
        self.state.snapshot()
    }
}

#[derive(Clone)]
pub struct RunEngine {
    ctx: EngineContext,
    registry: Arc<ConnectorRegistry>,
}

impl RunEngine {
    pub fn new(
        store: Arc<dyn PersistenceStore>,
        bus: EventBus,
        registry: ConnectorRegistry,
        config: EngineConfig,
    ) -> Self {
        Self {
            ctx: EngineContext {
                store,
                bus,
                guard: Arc::new(ConcurrencyGuard::new()),
                config,
            },
            registry: Arc::new(registry),
        }
    }

    pub fn context(&self) -> &EngineContext {
        &self.ctx
    }

    pub fn registry(&self) -> &ConnectorRegistry {
        &self.registry
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.ctx.bus
    }

    pub fn store(&self) -> &Arc<dyn PersistenceStore> {
        &self.ctx.store
    }

    pub fn guard(&self) -> &ConcurrencyGuard {
        &self.ctx.guard
    }

    /// Start a run of `pipe`.
    ///
    /// Returns as soon as the run is RUNNING; the steps execute on a spawned
    /// task. Validation, configuration and admission failures are returned
    /// here, step failures only show up in the run document.
    pub async fn new_run(&self, pipe: &PipeConfig) -> Result<RunHandle> {
        if !pipe.is_connected() {
            debug!(pipe_id = %pipe.id, "Refusing to run unconnected pipe");
            return Err(EngineError::not_connected());
        }

        let connector = self
            .registry
            .get(&pipe.connector_id)
            .ok_or_else(|| EngineError::unknown_connector(&pipe.connector_id))?;

        self.check_previous_run(pipe).await?;

        let steps = connector.steps(pipe);
        let state = RunState::create(&self.ctx, pipe, steps.iter().map(|s| s.label().to_string()))
            .await?;

        if let Err(e) = state.start().await {
            state.done(Some(&e)).await;
            return Err(e);
        }

        info!(
            run_id = %state.id(),
            pipe_id = %pipe.id,
            connector_id = %pipe.connector_id,
            steps = steps.len(),
            "Pipe run started"
        );

        let task = {
            let state = state.clone();
            let pipe = state.pipe();
            tokio::spawn(async move {
                let failure = execute(&state, connector.as_ref(), &steps, &pipe).await;
                let error = failure.map(EngineError::Step);
                state.done(error.as_ref()).await;
            })
        };

        Ok(RunHandle { state, task })
    }

    /// Load a stored pipe and start a run of it.
    pub async fn run_pipe_by_id(&self, pipe_id: Uuid) -> Result<RunHandle> {
        let pipe = self
            .ctx
            .store
            .get_pipe(pipe_id)
            .await?
            .ok_or(EngineError::PipeNotFound(pipe_id))?;
        self.new_run(&pipe).await
    }

    /// Reject the run if the pipe references a run that is still RUNNING.
    /// References to finished or missing runs are stale and ignored.
    async fn check_previous_run(&self, pipe: &PipeConfig) -> Result<()> {
        let Some(previous) = pipe.run else {
            return Ok(());
        };

        match self.ctx.store.get_run(previous).await? {
            Some(run) if run.status == RunStatus::Running => {
                debug!(pipe_id = %pipe.id, run_id = %previous, "Pipe already running");
                Err(EngineError::Admission(format!(
                    "Pipe '{}' is already running",
                    pipe.name
                )))
            }
            Some(run) => {
                debug!(
                    pipe_id = %pipe.id,
                    run_id = %previous,
                    status = %run.status,
                    "Ignoring stale run reference"
                );
                Ok(())
            }
            None => {
                debug!(pipe_id = %pipe.id, run_id = %previous, "Referenced run not found");
                Ok(())
            }
        }
    }
}

/// Run the connector hooks and steps in order. Returns the error that stopped the run.
///
/// A panic in any hook or step is reported as that hook's error, so the run
/// is always finalised.
async fn execute(
    state: &RunState,
    connector: &dyn Connector,
    steps: &[Arc<dyn Step>],
    pipe: &PipeConfig,
) -> Option<StepError> {
    let connector_name = format!("Connector '{}'", connector.id());

    let started = catch_panic(&connector_name, connector.run_started(pipe))
        .await
        .and_then(|result| result);
    if let Err(e) = started {
        state.log().error(&format!("Connector failed to start: {}", e));
        return Some(e);
    }

    let mut failure = None;
    for (index, step) in steps.iter().enumerate() {
        let ctx = StepContext::new(state.clone(), pipe.clone(), index);
        state.begin_step(index);

        let caught = run_step(step.as_ref(), &ctx).await.err();
        let outcome = catch_panic(&step_name(step.as_ref()), step.end_step(&ctx, caught.clone()))
            .await
            .and_then(|result| result);
        let error = outcome.err().or(caught);

        state.finish_step(index, error.as_ref());
        if let Some(e) = error {
            failure = Some(e);
            break;
        }
    }

    let finished = catch_panic(&connector_name, connector.run_finished(pipe, failure.as_ref())).await;
    if let Err(e) = finished {
        state.log().error(&format!("Connector failed to finish: {}", e));
        failure.get_or_insert(e);
    }
    failure
}

/// `begin_step` then `run`, with panics turned into step errors.
async fn run_step(step: &dyn Step, ctx: &StepContext) -> std::result::Result<(), StepError> {
    std::panic::catch_unwind(AssertUnwindSafe(|| step.begin_step(ctx)))
        .map_err(|payload| panic_error(&step_name(step), payload))??;

    catch_panic(&step_name(step), step.run(ctx)).await?
}

/// Await `fut`, reporting a panic as an error of `name`.
async fn catch_panic<F: Future>(name: &str, fut: F) -> std::result::Result<F::Output, StepError> {
    AssertUnwindSafe(fut)
        .catch_unwind()
        .await
        .map_err(|payload| panic_error(name, payload))
}

fn step_name(step: &dyn Step) -> String {
    format!("Step '{}'", step.label())
}

fn panic_error(name: &str, payload: Box<dyn Any + Send>) -> StepError {
    let reason = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());
    StepError::new(format!("{} panicked: {}", name, reason))
}
