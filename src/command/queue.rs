//! Pending command queue

use quadlink_shared::{CommandError, Response};
use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::Instant;

/// Settlement value of a command
pub type CommandResult = Result<Response, CommandError>;

/// A command waiting for, or undergoing, dispatch
#[derive(Debug)]
pub struct PendingCommand {
    pub id: u64,
    pub command: String,
    pub timeout: Duration,
    pub max_attempts: u32,
    pub priority: bool,
    pub queued_at: Instant,
    completion: oneshot::Sender<CommandResult>,
}

impl PendingCommand {
    /// Create a pending command and the handle its caller awaits
    pub fn new(
        id: u64,
        command: String,
        timeout: Duration,
        max_attempts: u32,
        priority: bool,
    ) -> (Self, CommandHandle) {
        let (completion, rx) = oneshot::channel();
        let pending = Self {
            id,
            command,
            timeout,
            max_attempts,
            priority,
            queued_at: Instant::now(),
            completion,
        };
        (pending, CommandHandle { id, rx })
    }

    /// Settle the caller's handle; consumes the command so it happens once
    pub fn settle(self, result: CommandResult) {
        // The caller may have stopped waiting
        let _ = self.completion.send(result);
    }
}

/// Future resolving to the outcome of a submitted command
#[derive(Debug)]
pub struct CommandHandle {
    id: u64,
    rx: oneshot::Receiver<CommandResult>,
}

impl CommandHandle {
    /// A handle that is already settled, for requests rejected up front
    pub fn settled(id: u64, result: CommandResult) -> Self {
        let (tx, rx) = oneshot::channel();
        let _ = tx.send(result);
        Self { id, rx }
    }

    /// Identifier assigned at submission
    pub fn id(&self) -> u64 {
        self.id
    }
}

impl Future for CommandHandle {
    type Output = CommandResult;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|result| result.unwrap_or(Err(CommandError::Disconnected)))
    }
}

/// FIFO of pending commands with head insertion for priority commands
#[derive(Debug, Default)]
pub struct CommandQueue {
    entries: VecDeque<PendingCommand>,
}

impl CommandQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue; priority commands jump ahead of everything already queued
    pub fn push(&mut self, command: PendingCommand) {
        if command.priority {
            self.entries.push_front(command);
        } else {
            self.entries.push_back(command);
        }
    }

    /// Take the head of the queue
    pub fn pop(&mut self) -> Option<PendingCommand> {
        self.entries.pop_front()
    }

    /// Remove every queued command
    pub fn drain(&mut self) -> Vec<PendingCommand> {
        self.entries.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
