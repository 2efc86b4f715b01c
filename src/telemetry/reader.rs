//! Telemetry Reader
//!
//! Decodes status broadcasts and keeps the latest record.

use crate::events::{DroneEvent, EventBus};
use quadlink_shared::TelemetryState;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// Holds the most recent decoded status and announces updates
pub struct TelemetryReader {
    /// Latest decoded record
    latest: RwLock<Option<TelemetryState>>,
    events: EventBus,
    received: AtomicU64,
    rejected: AtomicU64,
}

impl TelemetryReader {
    /// Create a new telemetry reader
    pub fn new(events: EventBus) -> Self {
        Self {
            latest: RwLock::new(None),
            events,
            received: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
        }
    }

    /// Decode one broadcast datagram, store it and publish a `StateUpdate`
    ///
    /// Malformed datagrams are logged and dropped.
    pub async fn process_datagram(&self, raw: &[u8]) {
        let state = match TelemetryState::from_bytes(raw) {
            Ok(state) => state,
            Err(e) => {
                let rejected = self.rejected.fetch_add(1, Ordering::Relaxed) + 1;
                warn!("[TELEMETRY] Dropping datagram ({} so far): {}", rejected, e);
                return;
            }
        };

        let count = self.received.fetch_add(1, Ordering::Relaxed) + 1;
        if count == 1 {
            debug!("[TELEMETRY] First broadcast: bat {}%, h {} cm", state.bat, state.h);
        }

        *self.latest.write().await = Some(state.clone());
        self.events.publish(DroneEvent::StateUpdate(state));
    }

    /// Most recent record, if any arrived yet
    pub async fn latest(&self) -> Option<TelemetryState> {
        self.latest.read().await.clone()
    }

    /// Number of datagrams decoded successfully
    pub fn received(&self) -> u64 {
        self.received.load(Ordering::Relaxed)
    }

    /// Number of datagrams dropped as malformed
    pub fn rejected(&self) -> u64 {
        self.rejected.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventKind;

    const SAMPLE: &[u8] = b"pitch:1;roll:2;yaw:3;vgx:0;vgy:0;vgz:0;templ:55;temph:58;tof:10;h:30;bat:76;baro:12.50;time:4;agx:1.00;agy:2.00;agz:-998.00;\r\n";

    #[tokio::test]
    async fn test_reader_creation() {
        let reader = TelemetryReader::new(EventBus::new());
        assert!(reader.latest().await.is_none());
        assert_eq!(reader.received(), 0);
    }

    #[tokio::test]
    async fn test_process_datagram_stores_and_publishes() {
        let events = EventBus::new();
        let mut updates = events.subscribe(EventKind::StateUpdate);
        let reader = TelemetryReader::new(events);

        reader.process_datagram(SAMPLE).await;

        let latest = reader.latest().await.unwrap();
        assert_eq!(latest.bat, 76);
        assert_eq!(latest.h, 30);
        match updates.recv().await {
            Some(DroneEvent::StateUpdate(state)) => assert_eq!(state, latest),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_malformed_datagram_keeps_previous() {
        let events = EventBus::new();
        let mut updates = events.subscribe(EventKind::StateUpdate);
        let reader = TelemetryReader::new(events);

        reader.process_datagram(SAMPLE).await;
        let _ = updates.recv().await;

        reader.process_datagram(b"bat:lots;").await;
        reader.process_datagram(&[0xFF, 0x00, 0x12]).await;

        assert_eq!(reader.latest().await.unwrap().bat, 76);
        assert_eq!(reader.received(), 1);
        assert_eq!(reader.rejected(), 2);
        assert!(updates.try_recv().is_err());
    }
}
