//! UDP receive loop for status broadcasts

use super::reader::TelemetryReader;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::task::JoinHandle;
use tracing::{info, warn};

const RECV_ERROR_PAUSE: Duration = Duration::from_millis(50);

/// Hand every datagram received on `socket` to `reader`
///
/// Runs at whatever cadence the drone broadcasts until aborted.
pub fn spawn_listener(socket: UdpSocket, reader: Arc<TelemetryReader>) -> JoinHandle<()> {
    tokio::spawn(async move {
        if let Ok(addr) = socket.local_addr() {
            info!("[TELEMETRY] Listening on {}", addr);
        }
        let mut buf = vec![0u8; 1024];

        loop {
            match socket.recv_from(&mut buf).await {
                Ok((n, _from)) => reader.process_datagram(&buf[..n]).await,
                Err(e) => {
                    warn!("[TELEMETRY] Receive error: {}", e);
                    tokio::time::sleep(RECV_ERROR_PAUSE).await;
                }
            }
        }
    })
}
