//! External video decoder process
//!
//! Raw video datagrams from the drone are piped into the decoder's stdin;
//! its stdout carries a continuous stream of JPEG images.

use anyhow::{anyhow, Context, Result};
use quadlink_shared::protocol;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::net::UdpSocket;
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// How to launch the decoder
#[derive(Debug, Clone)]
pub struct DecoderConfig {
    /// Executable name or path
    pub program: String,
    /// Arguments; the decoder must read stdin and write images to stdout
    pub args: Vec<String>,
    /// Local UDP port the drone streams raw video to
    pub video_port: u16,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            program: "ffmpeg".into(),
            args: [
                "-hide_banner",
                "-loglevel",
                "error",
                "-i",
                "pipe:0",
                "-f",
                "image2pipe",
                "-vcodec",
                "mjpeg",
                "pipe:1",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            video_port: protocol::VIDEO_PORT,
        }
    }
}

/// A running decoder child process
pub struct DecoderProcess {
    child: Child,
}

impl DecoderProcess {
    /// Spawn the decoder with piped stdin and stdout
    pub fn spawn(config: &DecoderConfig) -> Result<(Self, ChildStdin, ChildStdout)> {
        let mut child = Command::new(&config.program)
            .args(&config.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("spawning video decoder '{}'", config.program))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| anyhow!("decoder stdin was not captured"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| anyhow!("decoder stdout was not captured"))?;

        info!(
            "[VIDEO] Decoder '{}' started (pid {:?})",
            config.program,
            child.id()
        );
        Ok((Self { child }, stdin, stdout))
    }

    /// Kill the process and reap it
    pub async fn terminate(&mut self) -> Result<()> {
        match self.child.try_wait()? {
            Some(status) => debug!("[VIDEO] Decoder already exited: {}", status),
            None => {
                self.child.kill().await.context("killing video decoder")?;
                info!("[VIDEO] Decoder terminated");
            }
        }
        Ok(())
    }
}

/// Pipe every datagram received on `socket` into the decoder
pub fn forward_datagrams(socket: UdpSocket, mut stdin: ChildStdin) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut buf = vec![0u8; 2048];
        let mut forwarded: u64 = 0;

        loop {
            let n = match socket.recv(&mut buf).await {
                Ok(n) => n,
                Err(e) => {
                    warn!("[VIDEO] Video socket error: {}", e);
                    break;
                }
            };
            if let Err(e) = stdin.write_all(&buf[..n]).await {
                warn!("[VIDEO] Decoder stdin closed after {} bytes: {}", forwarded, e);
                break;
            }
            forwarded += n as u64;
        }
    })
}
