use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use tokio::sync::broadcast;
use tokio::time::interval;

use events::{EventBus, EventEnvelope};

use crate::messages::{ClientMessage, ServerMessage, SubscriptionFilter};

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);
const CLIENT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Clone)]
pub struct WsState {
    pub event_bus: EventBus,
}

impl WsState {
    pub fn new(event_bus: EventBus) -> Self {
        Self { event_bus }
    }
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<WsState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Keep-alive sent while no run updates flow. Browsers answer it with a pong.
fn heartbeat_frame() -> Message {
    Message::Ping(Default::default())
}

/// Encode a value as a text frame.
fn text_frame<T: Serialize>(value: &T) -> Option<Message> {
    match serde_json::to_string(value) {
        Ok(json) => Some(Message::Text(json.into())),
        Err(e) => {
            tracing::error!(error = %e, "Failed to serialize WebSocket message");
            None
        }
    }
}

/// Frame carrying the run snapshot of an event, verbatim.
pub fn snapshot_frame(envelope: &EventEnvelope, filter: Option<&SubscriptionFilter>) -> Option<Message> {
    let run = envelope.event.snapshot()?;
    if !filter.map(|f| f.matches(run)).unwrap_or(true) {
        return None;
    }
    text_frame(run)
}

/// Per-connection subscription settings driven by client messages.
#[derive(Debug)]
struct ClientState {
    subscribed: bool,
    filter: Option<SubscriptionFilter>,
}

impl Default for ClientState {
    fn default() -> Self {
        Self {
            subscribed: true,
            filter: None,
        }
    }
}

impl ClientState {
    fn handle_text(&mut self, text: &str) -> ServerMessage {
        match serde_json::from_str::<ClientMessage>(text) {
            Ok(ClientMessage::Subscribe { filter }) => {
                self.subscribed = true;
                self.filter = filter.clone();
                ServerMessage::Subscribed { filter }
            }
            Ok(ClientMessage::Unsubscribe) => {
                self.subscribed = false;
                self.filter = None;
                ServerMessage::Unsubscribed
            }
            Ok(ClientMessage::Ping) => ServerMessage::Pong,
            Err(e) => ServerMessage::Error {
                message: format!("Invalid message: {}", e),
            },
        }
    }

    fn frame_for(&self, envelope: &EventEnvelope) -> Option<Message> {
        if !self.subscribed {
            return None;
        }
        snapshot_frame(envelope, self.filter.as_ref())
    }
}

async fn handle_socket(socket: WebSocket, state: Arc<WsState>) {
    let (mut sender, mut receiver) = socket.split();

    // Yields the in-flight run first
    let mut subscription = state.event_bus.subscribe();
    let mut client = ClientState::default();
    let subscription_id = subscription.id();

    tracing::debug!(subscription = subscription_id, "Run updates client connected");

    let mut heartbeat = interval(HEARTBEAT_INTERVAL);
    heartbeat.reset();

    loop {
        let outgoing = tokio::select! {
            _ = heartbeat.tick() => Some(heartbeat_frame()),

            received = subscription.recv() => match received {
                Ok(envelope) => client.frame_for(&envelope),
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    tracing::warn!(subscription = subscription_id, missed, "Run updates client lagged");
                    None
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },

            incoming = tokio::time::timeout(CLIENT_TIMEOUT + HEARTBEAT_INTERVAL, receiver.next()) => match incoming {
                Ok(Some(Ok(Message::Text(text)))) => text_frame(&client.handle_text(text.as_str())),
                Ok(Some(Ok(Message::Ping(data)))) => Some(Message::Pong(data)),
                Ok(Some(Ok(Message::Close(_)))) | Ok(Some(Err(_))) | Ok(None) => break,
                Ok(Some(Ok(_))) => None,
                Err(_) => {
                    tracing::debug!(subscription = subscription_id, "Run updates client idle");
                    None
                }
            },
        };

        if let Some(frame) = outgoing {
            if sender.send(frame).await.is_err() {
                break;
            }
        }
    }

    state.event_bus.unsubscribe(subscription);
    tracing::debug!(subscription = subscription_id, "Run updates client disconnected");
}
