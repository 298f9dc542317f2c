//! Domain model shared by every data pipes crate.

pub mod domain;
mod error;

pub use domain::pipe::{PipeConfig, SourceTable};
pub use domain::run::{RunDocument, RunStatus, StepStats, StepStatus, TableStats};
pub use error::CoreError;
