//! Run-scoped resources shared between the engine and run states.

mod concurrency_guard;
mod pending_saves;

pub use concurrency_guard::ConcurrencyGuard;
pub use pending_saves::{PendingSave, PendingSaves};
