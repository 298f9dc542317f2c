//! Contract between the run engine and connector steps.

use async_trait::async_trait;
use pipes_core::{PipeConfig, SourceTable};
use uuid::Uuid;

use crate::error::StepError;
use crate::run_state::RunState;

/// What a step sees of the run it belongs to.
#[derive(Debug, Clone)]
pub struct StepContext {
    /// Handle used to report progress and table statistics
    pub run: RunState,
    /// Pipe configuration as it was when the run started
    pub pipe: PipeConfig,
    /// Position of the step in the run, starting at zero
    pub index: usize,
}

impl StepContext {
    pub fn new(run: RunState, pipe: PipeConfig, index: usize) -> Self {
        Self { run, pipe, index }
    }

    pub fn run_id(&self) -> Uuid {
        self.run.id()
    }

    /// Tables this run should process.
    pub fn source_tables(&self) -> Vec<&SourceTable> {
        self.pipe.source_tables()
    }
}

/// One unit of connector work.
///
/// The engine calls `begin_step`, then `run`, then `end_step` with whatever
/// error `begin_step` or `run` produced. The error `end_step` returns decides
/// the step's recorded outcome; a caught error stops the run either way.
#[async_trait]
pub trait Step: Send + Sync {
    fn label(&self) -> &str;

    /// Synchronous setup before `run`.
    fn begin_step(&self, _ctx: &StepContext) -> Result<(), StepError> {
        Ok(())
    }

    async fn run(&self, ctx: &StepContext) -> Result<(), StepError>;

    /// Finalise the step, forwarding the caught error by default.
    async fn end_step(&self, _ctx: &StepContext, error: Option<StepError>) -> Result<(), StepError> {
        match error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
