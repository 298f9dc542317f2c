use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum CoreError {
    #[error("Unknown run status: {0}")]
    UnknownRunStatus(String),

    #[error("Validation error: {0}")]
    Validation(String),
}
