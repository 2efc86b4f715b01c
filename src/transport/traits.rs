//! Transport trait abstraction for the command link

use anyhow::Result;
use async_trait::async_trait;

/// Sends command datagrams to the fixed drone peer
///
/// Replies travel the other way through the channel handed out when the
/// transport is bound, so the dispatcher can correlate them by arrival order.
#[async_trait]
pub trait CommandTransport: Send + Sync + 'static {
    /// Send one command payload to the peer
    async fn send(&self, payload: &[u8]) -> Result<()>;

    /// Human-readable name for this transport
    fn name(&self) -> &'static str;
}
