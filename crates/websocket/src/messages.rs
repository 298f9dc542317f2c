use pipes_core::RunDocument;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Subscribe { filter: Option<SubscriptionFilter> },
    Unsubscribe,
    Ping,
}

/// Control frames sent by the server.
///
/// Run snapshots are not wrapped: they go out as the bare run document, whose
/// `type` is always `"run"`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Subscribed { filter: Option<SubscriptionFilter> },
    Unsubscribed,
    Pong,
    Error { message: String },
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SubscriptionFilter {
    pub pipe_ids: Option<Vec<Uuid>>,
}

impl SubscriptionFilter {
    pub fn for_pipe(pipe_id: Uuid) -> Self {
        Self {
            pipe_ids: Some(vec![pipe_id]),
        }
    }

    pub fn matches(&self, run: &RunDocument) -> bool {
        match &self.pipe_ids {
            Some(ids) => ids.contains(&run.pipe_id),
            None => true,
        }
    }
}
