use std::sync::Arc;

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::State;
use axum::response::IntoResponse;

use websocket::WsState;

use crate::state::AppState;

/// Pushes every run snapshot to the client, starting with the run in progress.
pub async fn run_updates_socket(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> impl IntoResponse {
    tracing::debug!(subscribers = state.event_bus.subscriber_count(), "Run updates socket requested");
    let ws_state = Arc::new(WsState::new(state.event_bus.clone()));
    websocket::ws_handler(ws, State(ws_state)).await
}
