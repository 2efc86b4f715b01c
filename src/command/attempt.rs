//! Per-command send/timeout/retry loop

use crate::transport::CommandTransport;
use bytes::Bytes;
use quadlink_shared::{CommandError, Response};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

use super::queue::CommandResult;

/// Parameters for running one command to completion
#[derive(Debug, Clone)]
pub struct AttemptPlan {
    pub id: u64,
    pub command: String,
    pub timeout: Duration,
    pub max_attempts: u32,
    pub backoff: Duration,
}

/// Send the command until a reply arrives or attempts run out
///
/// `replies` only carries datagrams the dispatcher correlated to this
/// command. Timeouts are retried after `backoff`; a reply of any kind ends
/// the loop, and a failed send is fatal.
pub async fn run_attempts(
    transport: Arc<dyn CommandTransport>,
    mut replies: mpsc::UnboundedReceiver<Bytes>,
    plan: AttemptPlan,
) -> CommandResult {
    let attempts = plan.max_attempts.max(1);

    for attempt in 1..=attempts {
        // A late reply to a previous attempt must not answer this one
        while let Ok(stale) = replies.try_recv() {
            debug!(
                "[DISPATCH] #{} discarding stale reply {:?}",
                plan.id,
                String::from_utf8_lossy(&stale)
            );
        }

        debug!(
            "[DISPATCH] #{} sending '{}' via {} (attempt {}/{})",
            plan.id,
            plan.command,
            transport.name(),
            attempt,
            attempts
        );

        if let Err(e) = transport.send(plan.command.as_bytes()).await {
            warn!("[DISPATCH] #{} send failed: {:#}", plan.id, e);
            return Err(CommandError::Transport(format!("{:#}", e)));
        }

        match timeout(plan.timeout, replies.recv()).await {
            Ok(Some(raw)) => {
                let response = Response::classify(&raw);
                if response.ok {
                    info!("[DISPATCH] #{} '{}' -> {}", plan.id, plan.command, response.message);
                } else {
                    warn!(
                        "[DISPATCH] #{} '{}' refused: {:?}",
                        plan.id, plan.command, response.message
                    );
                }
                return Ok(response);
            }
            Ok(None) => return Err(CommandError::Disconnected),
            Err(_) => {
                warn!(
                    "[DISPATCH] #{} '{}' timed out after {:?} (attempt {}/{})",
                    plan.id, plan.command, plan.timeout, attempt, attempts
                );
                if attempt < attempts {
                    sleep(plan.backoff).await;
                }
            }
        }
    }

    Err(CommandError::RetriesExhausted {
        command: plan.command,
        attempts,
        timeout: plan.timeout,
    })
}
