//! Event bus implementation using tokio broadcast channels

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use pipes_core::RunDocument;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;

use crate::types::{Event, EventEnvelope};

/// Capacity for the broadcast channel
const DEFAULT_CAPACITY: usize = 1000;

/// Event bus for publishing and subscribing to run events
///
/// The bus remembers the latest run snapshot it has seen so that a subscriber
/// joining while a run is in progress starts from the current state instead of
/// an empty view.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<EventEnvelope>,
    /// Latest run snapshot published on the bus
    latest: Arc<RwLock<Option<RunDocument>>>,
    /// Number of events published (for monitoring)
    event_count: Arc<AtomicUsize>,
    next_subscription: Arc<AtomicU64>,
}

impl EventBus {
    /// Create a new event bus with default capacity
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Create a new event bus with specified capacity
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            latest: Arc::new(RwLock::new(None)),
            event_count: Arc::new(AtomicUsize::new(0)),
            next_subscription: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Publish an event to all subscribers
    ///
    /// Returns the number of subscribers that received the event.
    /// If there are no subscribers, returns 0 (the event is dropped).
    pub fn publish(&self, envelope: EventEnvelope) -> usize {
        self.event_count.fetch_add(1, Ordering::Relaxed);

        // Held across the send so a concurrent subscribe sees either the old
        // snapshot plus this event, or the new snapshot without it.
        let mut latest = self.latest.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(run) = envelope.event.snapshot() {
            if replaces_latest(latest.as_ref(), run) {
                *latest = Some(run.clone());
            }
        }
        self.sender.send(envelope).unwrap_or(0)
    }

    /// Publish a run snapshot
    pub fn publish_snapshot(&self, run: RunDocument) -> usize {
        self.publish(EventEnvelope::new(Event::from_snapshot(run)))
    }

    /// Subscribe to events
    ///
    /// If a run is in progress, the returned subscription yields its current
    /// snapshot first. Events published before subscribing are not replayed.
    pub fn subscribe(&self) -> Subscription {
        let latest = self.latest.read().unwrap_or_else(PoisonError::into_inner);
        let receiver = self.sender.subscribe();
        let initial = latest
            .as_ref()
            .filter(|run| !run.status.is_terminal())
            .map(|run| EventEnvelope::new(Event::RunUpdated { run: run.clone() }));

        Subscription {
            id: self.next_subscription.fetch_add(1, Ordering::Relaxed),
            initial,
            receiver,
        }
    }

    /// Remove a subscriber. Later publishes no longer reach it.
    pub fn unsubscribe(&self, subscription: Subscription) {
        drop(subscription);
    }

    /// Snapshot of the run currently in progress, if any
    pub fn current_snapshot(&self) -> Option<RunDocument> {
        self.latest
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .filter(|run| !run.status.is_terminal())
            .cloned()
    }

    /// Latest run snapshot seen by the bus, finished or not
    pub fn latest_snapshot(&self) -> Option<RunDocument> {
        self.latest
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Get the number of current subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Get the total number of events published
    pub fn event_count(&self) -> usize {
        self.event_count.load(Ordering::Relaxed)
    }
}

/// A run in progress stays the latest snapshot until that same run reports again.
fn replaces_latest(latest: Option<&RunDocument>, run: &RunDocument) -> bool {
    match latest {
        Some(current) if !current.status.is_terminal() => current.id == run.id,
        _ => true,
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_count", &self.subscriber_count())
            .field("event_count", &self.event_count())
            .finish()
    }
}

/// A live subscription to the event bus
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    initial: Option<EventEnvelope>,
    receiver: broadcast::Receiver<EventEnvelope>,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// The in-flight snapshot handed out on subscribe, without consuming it
    pub fn initial(&self) -> Option<&EventEnvelope> {
        self.initial.as_ref()
    }

    /// Receive the next event
    pub async fn recv(&mut self) -> Result<EventEnvelope, RecvError> {
        if let Some(envelope) = self.initial.take() {
            return Ok(envelope);
        }
        self.receiver.recv().await
    }
}
