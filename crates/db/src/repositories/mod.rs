mod pipe_repository;
mod run_repository;

pub use pipe_repository::*;
pub use run_repository::*;
