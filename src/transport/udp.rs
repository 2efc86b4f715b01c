//! UDP transport for the plaintext command link

use crate::transport::traits::CommandTransport;
use anyhow::{Context, Result};
use async_trait::async_trait;
use bytes::Bytes;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Capacity of the reply channel between the receive loop and the dispatcher
const REPLY_CHANNEL_CAPACITY: usize = 64;

/// Pause after a receive error so a failing socket does not spin
const RECV_ERROR_PAUSE: Duration = Duration::from_millis(50);

/// UDP socket bound locally and aimed at a single drone
pub struct UdpCommandTransport {
    socket: Arc<UdpSocket>,
    peer: SocketAddr,
    recv_task: JoinHandle<()>,
}

impl UdpCommandTransport {
    /// Bind `local` and start forwarding datagrams from `peer`
    ///
    /// Returns the transport and the receiver of raw reply datagrams.
    pub async fn bind(local: SocketAddr, peer: SocketAddr) -> Result<(Self, mpsc::Receiver<Bytes>)> {
        let socket = UdpSocket::bind(local)
            .await
            .with_context(|| format!("binding command socket on {}", local))?;
        let socket = Arc::new(socket);
        let (reply_tx, reply_rx) = mpsc::channel(REPLY_CHANNEL_CAPACITY);

        let recv_socket = socket.clone();
        let recv_task = tokio::spawn(async move {
            recv_loop(recv_socket, peer, reply_tx).await;
        });

        Ok((
            Self {
                socket,
                peer,
                recv_task,
            },
            reply_rx,
        ))
    }

    /// Local address the socket is bound to
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// Stop the receive loop; the socket closes once the last handle drops
    pub fn close(&self) {
        self.recv_task.abort();
    }
}

impl Drop for UdpCommandTransport {
    fn drop(&mut self) {
        self.recv_task.abort();
    }
}

#[async_trait]
impl CommandTransport for UdpCommandTransport {
    async fn send(&self, payload: &[u8]) -> Result<()> {
        self.socket
            .send_to(payload, self.peer)
            .await
            .with_context(|| format!("sending to {}", self.peer))?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "UDP"
    }
}

/// Forward datagrams from the peer until the dispatcher goes away
async fn recv_loop(socket: Arc<UdpSocket>, peer: SocketAddr, reply_tx: mpsc::Sender<Bytes>) {
    let mut buf = vec![0u8; 2048];

    loop {
        match socket.recv_from(&mut buf).await {
            Ok((n, from)) => {
                if from.ip() != peer.ip() {
                    debug!("[TRANSPORT] Ignoring {} bytes from unexpected sender {}", n, from);
                    continue;
                }
                if reply_tx.send(Bytes::copy_from_slice(&buf[..n])).await.is_err() {
                    break;
                }
            }
            Err(e) => {
                // ICMP port-unreachable surfaces here on some platforms
                warn!("[TRANSPORT] Receive error: {}", e);
                tokio::time::sleep(RECV_ERROR_PAUSE).await;
            }
        }
    }
}
