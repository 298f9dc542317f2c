mod handler;
mod messages;

pub use handler::{snapshot_frame, ws_handler, WsState};
pub use messages::{ClientMessage, ServerMessage, SubscriptionFilter};
