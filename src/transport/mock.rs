//! Scripted in-memory transport for dispatcher tests

use crate::transport::traits::CommandTransport;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;

/// What the fake drone does with the next send
#[derive(Debug, Clone)]
pub enum MockReply {
    /// Reply immediately
    Reply(&'static [u8]),
    /// Reply after a delay
    After(Duration, &'static [u8]),
    /// Never reply
    Silent,
    /// Fail the send itself
    SendError,
}

/// A sent datagram with the (virtual) time it left
#[derive(Debug, Clone)]
pub struct SentCommand {
    pub at: Instant,
    pub payload: String,
}

/// Transport whose peer follows a script, one entry per send
///
/// Sends past the end of the script use the default reply.
pub struct MockTransport {
    script: Mutex<VecDeque<MockReply>>,
    default_reply: MockReply,
    sent: Arc<Mutex<Vec<SentCommand>>>,
    reply_tx: mpsc::Sender<Bytes>,
}

impl MockTransport {
    /// Create a transport and the reply receiver to hand to the dispatcher
    pub fn new(default_reply: MockReply) -> (Arc<Self>, mpsc::Receiver<Bytes>) {
        let (reply_tx, reply_rx) = mpsc::channel(64);
        let transport = Arc::new(Self {
            script: Mutex::new(VecDeque::new()),
            default_reply,
            sent: Arc::new(Mutex::new(Vec::new())),
            reply_tx,
        });
        (transport, reply_rx)
    }

    /// Queue scripted behaviour for upcoming sends
    pub fn script(&self, replies: impl IntoIterator<Item = MockReply>) {
        self.script.lock().unwrap().extend(replies);
    }

    /// Inject a datagram as if the peer sent it unprompted
    pub async fn inject(&self, raw: &'static [u8]) {
        self.reply_tx.send(Bytes::from_static(raw)).await.unwrap();
    }

    /// Everything sent so far
    pub fn sent(&self) -> Vec<SentCommand> {
        self.sent.lock().unwrap().clone()
    }

    /// Payloads sent so far
    pub fn sent_payloads(&self) -> Vec<String> {
        self.sent().into_iter().map(|s| s.payload).collect()
    }
}

#[async_trait]
impl CommandTransport for MockTransport {
    async fn send(&self, payload: &[u8]) -> Result<()> {
        let reply = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.default_reply.clone());

        if let MockReply::SendError = reply {
            return Err(anyhow!("network unreachable"));
        }

        self.sent.lock().unwrap().push(SentCommand {
            at: Instant::now(),
            payload: String::from_utf8_lossy(payload).into_owned(),
        });

        match reply {
            MockReply::Reply(raw) => {
                let _ = self.reply_tx.send(Bytes::from_static(raw)).await;
            }
            MockReply::After(delay, raw) => {
                let tx = self.reply_tx.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    let _ = tx.send(Bytes::from_static(raw)).await;
                });
            }
            MockReply::Silent | MockReply::SendError => {}
        }

        Ok(())
    }

    fn name(&self) -> &'static str {
        "Mock"
    }
}
