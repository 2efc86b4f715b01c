//! Decoder output pump and video session lifecycle

use super::decoder::{forward_datagrams, DecoderConfig, DecoderProcess};
use super::reassembler::FrameReassembler;
use anyhow::{Context, Result};
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::net::UdpSocket;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Read size for decoder output
const READ_CHUNK: usize = 64 * 1024;

/// Feed everything `reader` produces into the reassembler
///
/// The stream is announced as ended on EOF or on a read error.
pub fn spawn_reader<R>(mut reader: R, reassembler: Arc<FrameReassembler>) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buf = vec![0u8; READ_CHUNK];
        loop {
            match reader.read(&mut buf).await {
                Ok(0) => {
                    reassembler.end_stream("decoder output closed");
                    break;
                }
                Ok(n) => {
                    reassembler.feed(&buf[..n]);
                }
                Err(e) => {
                    warn!("[VIDEO] Decoder read error: {}", e);
                    reassembler.end_stream(format!("decoder read error: {}", e));
                    break;
                }
            }
        }
    })
}

/// Decoder process plus the tasks feeding it and draining it
pub struct VideoSession {
    decoder: DecoderProcess,
    forwarder: JoinHandle<()>,
    reader: JoinHandle<()>,
    reassembler: Arc<FrameReassembler>,
}

impl VideoSession {
    /// Bind the video port, launch the decoder and start both pumps
    pub async fn start(config: &DecoderConfig, reassembler: Arc<FrameReassembler>) -> Result<Self> {
        let bind = SocketAddr::from((Ipv4Addr::UNSPECIFIED, config.video_port));
        let socket = UdpSocket::bind(bind)
            .await
            .with_context(|| format!("binding video socket on {}", bind))?;

        let (decoder, stdin, stdout) = DecoderProcess::spawn(config)?;

        // A restarted decoder must not be stitched onto stale bytes
        reassembler.reset();

        let forwarder = forward_datagrams(socket, stdin);
        let reader = spawn_reader(stdout, reassembler.clone());
        info!("[VIDEO] Session started on {}", bind);

        Ok(Self {
            decoder,
            forwarder,
            reader,
            reassembler,
        })
    }

    /// Whether decoder output is still being read
    pub fn is_running(&self) -> bool {
        !self.reader.is_finished()
    }

    /// Kill the decoder first, then stop the pumps
    pub async fn stop(mut self) {
        if let Err(e) = self.decoder.terminate().await {
            warn!("[VIDEO] {:#}", e);
        }
        self.forwarder.abort();
        self.reader.abort();
        self.reassembler.end_stream("video stopped");
    }
}
