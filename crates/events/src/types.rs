//! Event types published on the run event bus

use chrono::{DateTime, Utc};
use pipes_core::RunDocument;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Envelope wrapping all events with metadata
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct EventEnvelope {
    /// Unique event ID
    pub id: Uuid,
    /// When the event occurred
    pub timestamp: DateTime<Utc>,
    /// The actual event
    pub event: Event,
}

impl EventEnvelope {
    /// Create a new event envelope with auto-generated ID and timestamp
    pub fn new(event: Event) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            event,
        }
    }
}

/// All possible events in the system
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// Snapshot of a run that is still in progress
    #[serde(rename = "run.updated")]
    RunUpdated { run: RunDocument },

    /// Final snapshot of a run that reached a terminal status
    #[serde(rename = "run.finished")]
    RunFinished { run: RunDocument },

    /// Generic error event
    #[serde(rename = "error")]
    Error {
        message: String,
        context: Option<String>,
    },
}

impl Event {
    /// Wrap a run snapshot into the matching event variant.
    pub fn from_snapshot(run: RunDocument) -> Self {
        if run.status.is_terminal() {
            Event::RunFinished { run }
        } else {
            Event::RunUpdated { run }
        }
    }

    /// Get the run snapshot carried by this event, if any
    pub fn snapshot(&self) -> Option<&RunDocument> {
        match self {
            Event::RunUpdated { run } | Event::RunFinished { run } => Some(run),
            Event::Error { .. } => None,
        }
    }

    /// Get the pipe ID associated with this event, if any
    pub fn pipe_id(&self) -> Option<Uuid> {
        self.snapshot().map(|run| run.pipe_id)
    }
}
