mod error;
pub mod models;
mod pool;
pub mod repositories;
mod store;

pub use error::*;
pub use models::{Attachment, RUN_LOG_ATTACHMENT};
pub use pool::*;
pub use repositories::*;
pub use store::{PersistenceStore, PipeMutator, SqliteStore};
