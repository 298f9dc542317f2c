pub mod config;
pub mod connector;
pub mod engine;
pub mod error;
pub mod resources;
pub mod run_log;
pub mod run_state;
pub mod state_machine;
pub mod step;

pub use config::{EngineConfig, DEBUG_ENV};
pub use connector::{Connector, ConnectorInfo, ConnectorRegistry};
pub use engine::{EngineContext, RunEngine, RunHandle};
pub use error::{EngineError, Result, StepError};
pub use resources::{ConcurrencyGuard, PendingSaves};
pub use run_log::RunLog;
pub use run_state::RunState;
pub use state_machine::RunStateMachine;
pub use step::{Step, StepContext};
