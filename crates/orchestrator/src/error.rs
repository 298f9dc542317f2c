use pipes_core::RunStatus;
use thiserror::Error;
use uuid::Uuid;

/// Error raised or reported by a connector step.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct StepError {
    message: String,
}

impl StepError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<String> for StepError {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

impl From<&str> for StepError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

#[derive(Debug, Error)]
pub enum EngineError {
    /// The pipe cannot be run as configured
    #[error("{0}")]
    Validation(String),

    /// Another run holds the concurrency guard, or the pipe already has a run in progress
    #[error("{0}")]
    Admission(String),

    #[error("{0}")]
    Configuration(String),

    #[error(transparent)]
    Step(#[from] StepError),

    #[error("Persistence error: {0}")]
    Persistence(#[from] db::DbError),

    #[error("Log attachment failed: {0}")]
    LogAttachment(String),

    #[error("Invalid run status transition from {from} to {to}")]
    InvalidTransition { from: RunStatus, to: RunStatus },

    #[error("Pipe not found: {0}")]
    PipeNotFound(Uuid),
}

impl EngineError {
    pub fn not_connected() -> Self {
        Self::Validation("Cannot run because pipe is not connected".to_string())
    }

    pub fn run_in_progress() -> Self {
        Self::Admission("A pipe run is already in progress".to_string())
    }

    pub fn unknown_connector(connector_id: &str) -> Self {
        Self::Configuration(format!("No connector registered for '{}'", connector_id))
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
