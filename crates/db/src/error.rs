use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Pipe not found: {0}")]
    PipeNotFound(Uuid),

    #[error("Run not found: {0}")]
    RunNotFound(Uuid),

    #[error("Pipe {0} was modified concurrently")]
    Conflict(Uuid),
}

pub type Result<T> = std::result::Result<T, DbError>;
