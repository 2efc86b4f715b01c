//! Publish/subscribe fan-out for consumer-facing events
//!
//! Each subscriber registers for one event kind and gets its own unbounded
//! queue, so a slow listener receives events later instead of blocking the
//! publisher. Delivery follows registration order within a kind; there is no
//! ordering guarantee across kinds.

use bytes::Bytes;
use quadlink_shared::{CommandError, Response, TelemetryState};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc;

/// Events emitted to consumers
#[derive(Debug, Clone)]
pub enum DroneEvent {
    /// New telemetry record decoded
    StateUpdate(TelemetryState),
    /// Complete image frame extracted from decoder output
    Frame(Bytes),
    /// Text of a valid reply datagram
    ResponseText(String),
    /// Outcome of an emergency request
    EmergencyResult(Result<Response, CommandError>),
    /// The decoder output closed
    VideoStreamEnded(String),
}

/// Discriminant of [`DroneEvent`] used for subscriptions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    StateUpdate,
    Frame,
    ResponseText,
    EmergencyResult,
    VideoStreamEnded,
}

impl DroneEvent {
    /// Kind of this event
    pub fn kind(&self) -> EventKind {
        match self {
            DroneEvent::StateUpdate(_) => EventKind::StateUpdate,
            DroneEvent::Frame(_) => EventKind::Frame,
            DroneEvent::ResponseText(_) => EventKind::ResponseText,
            DroneEvent::EmergencyResult(_) => EventKind::EmergencyResult,
            DroneEvent::VideoStreamEnded(_) => EventKind::VideoStreamEnded,
        }
    }
}

struct Subscriber {
    kind: EventKind,
    tx: mpsc::UnboundedSender<DroneEvent>,
}

/// Shared event bus; clones publish to the same subscribers
#[derive(Clone, Default)]
pub struct EventBus {
    subscribers: Arc<Mutex<Vec<Subscriber>>>,
}

impl EventBus {
    /// Create an empty bus
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Subscriber>> {
        self.subscribers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Register for one kind of event
    ///
    /// Dropping the receiver unsubscribes on the next publish.
    pub fn subscribe(&self, kind: EventKind) -> mpsc::UnboundedReceiver<DroneEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.lock().push(Subscriber { kind, tx });
        rx
    }

    /// Deliver an event to every subscriber of its kind
    ///
    /// Returns the number of subscribers reached.
    pub fn publish(&self, event: DroneEvent) -> usize {
        let kind = event.kind();
        let mut delivered = 0;

        self.lock().retain(|sub| {
            if sub.kind != kind {
                return true;
            }
            let alive = sub.tx.send(event.clone()).is_ok();
            if alive {
                delivered += 1;
            }
            alive
        });

        delivered
    }

    /// Number of live subscribers for a kind
    #[cfg(test)]
    pub fn subscriber_count(&self, kind: EventKind) -> usize {
        self.lock()
            .iter()
            .filter(|sub| sub.kind == kind && !sub.tx.is_closed())
            .count()
    }
}
