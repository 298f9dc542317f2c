//! Event system for data pipe runs
//!
//! This crate provides the event bus that fans out run snapshots to
//! subscribers such as the WebSocket gateway.

mod bus;
mod types;

pub use bus::{EventBus, Subscription};
pub use types::*;
