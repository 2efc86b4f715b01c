//! Command dispatcher: one command in flight, priority insertion, emergency preemption
//!
//! All queue and state mutation happens inside a single actor task. Callers
//! talk to it through an unbounded inbox, so `submit` and `emergency` never
//! block and their call order is the order the actor sees.

use super::attempt::{run_attempts, AttemptPlan};
use super::queue::{CommandHandle, CommandQueue, CommandResult, PendingCommand};
use crate::events::{DroneEvent, EventBus};
use crate::transport::CommandTransport;
use bytes::Bytes;
use futures::future::BoxFuture;
use futures::FutureExt;
use quadlink_shared::state_machine::{
    DispatchEvent, DispatchState, DispatchStateMachine, TransitionResult,
};
use quadlink_shared::{is_printable_ascii, protocol, CommandError};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

/// Timing defaults for dispatched commands
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Reply wait per attempt when the caller gives none
    pub default_timeout: Duration,
    /// Send attempts per command when the caller gives none
    pub default_max_retries: u32,
    /// Pause between a timed out attempt and the next
    pub retry_backoff: Duration,
    /// Reply wait for the single emergency attempt
    pub emergency_timeout: Duration,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            default_timeout: Duration::from_millis(protocol::COMMAND_TIMEOUT_MS),
            default_max_retries: protocol::COMMAND_MAX_RETRIES,
            retry_backoff: Duration::from_millis(protocol::RETRY_BACKOFF_MS),
            emergency_timeout: Duration::from_millis(protocol::COMMAND_TIMEOUT_MS),
        }
    }
}

/// Per-submission overrides
#[derive(Debug, Clone, Default)]
pub struct SubmitOptions {
    pub priority: bool,
    pub timeout: Option<Duration>,
    pub max_retries: Option<u32>,
}

impl SubmitOptions {
    /// Jump ahead of queued (not executing) commands
    pub fn priority(mut self) -> Self {
        self.priority = true;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    #[cfg(test)]
    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }
}

/// Snapshot of the actor's state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchStatus {
    pub state: DispatchState,
    pub queued: usize,
}

enum DispatchRequest {
    Submit(PendingCommand),
    Emergency(PendingCommand),
    Status(oneshot::Sender<DispatchStatus>),
    Shutdown(oneshot::Sender<()>),
}

/// Cloneable handle to the dispatch actor
#[derive(Clone)]
pub struct CommandDispatcher {
    inbox: mpsc::UnboundedSender<DispatchRequest>,
    next_id: Arc<AtomicU64>,
    config: DispatchConfig,
}

impl CommandDispatcher {
    /// Spawn the dispatch actor
    ///
    /// `replies` carries raw datagrams received from the peer.
    pub fn spawn(
        transport: Arc<dyn CommandTransport>,
        replies: mpsc::Receiver<Bytes>,
        config: DispatchConfig,
        events: EventBus,
    ) -> Self {
        let (inbox, inbox_rx) = mpsc::unbounded_channel();

        let worker = DispatchWorker {
            inbox: inbox_rx,
            replies,
            replies_open: true,
            transport,
            events,
            retry_backoff: config.retry_backoff,
            queue: CommandQueue::new(),
            fsm: DispatchStateMachine::new(),
            in_flight: None,
        };
        tokio::spawn(worker.run());

        Self {
            inbox,
            next_id: Arc::new(AtomicU64::new(0)),
            config,
        }
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Queue a command and return the handle that settles with its outcome
    ///
    /// Invalid input settles the handle immediately and never reaches the
    /// network.
    pub fn submit(&self, command: impl Into<String>, options: SubmitOptions) -> CommandHandle {
        let id = self.next_id();
        let command = command.into();

        if let Err(e) = validate(&command, &options) {
            debug!("[DISPATCH] #{} rejected before queueing: {}", id, e);
            return CommandHandle::settled(id, Err(e));
        }

        let (pending, handle) = PendingCommand::new(
            id,
            command.trim().to_string(),
            options.timeout.unwrap_or(self.config.default_timeout),
            options.max_retries.unwrap_or(self.config.default_max_retries),
            options.priority,
        );

        if let Err(mpsc::error::SendError(DispatchRequest::Submit(pending))) =
            self.inbox.send(DispatchRequest::Submit(pending))
        {
            pending.settle(Err(CommandError::Disconnected));
        }

        handle
    }

    /// Clear the queue and send the emergency command, once, right now
    pub fn emergency(&self) -> CommandHandle {
        let id = self.next_id();
        let (pending, handle) = PendingCommand::new(
            id,
            protocol::EMERGENCY_COMMAND.to_string(),
            self.config.emergency_timeout,
            1,
            true,
        );

        if let Err(mpsc::error::SendError(DispatchRequest::Emergency(pending))) =
            self.inbox.send(DispatchRequest::Emergency(pending))
        {
            pending.settle(Err(CommandError::Disconnected));
        }

        handle
    }

    /// Current state and queue length, or `None` once torn down
    pub async fn status(&self) -> Option<DispatchStatus> {
        let (tx, rx) = oneshot::channel();
        self.inbox.send(DispatchRequest::Status(tx)).ok()?;
        rx.await.ok()
    }

    /// Reject everything pending with `Disconnected` and stop the actor
    pub async fn shutdown(&self) {
        let (tx, rx) = oneshot::channel();
        if self.inbox.send(DispatchRequest::Shutdown(tx)).is_ok() {
            let _ = rx.await;
        }
    }
}

fn validate(command: &str, options: &SubmitOptions) -> Result<(), CommandError> {
    let trimmed = command.trim();
    if trimmed.is_empty() {
        return Err(CommandError::Validation("command is empty".into()));
    }
    if !is_printable_ascii(trimmed.as_bytes()) {
        return Err(CommandError::Validation(format!(
            "command {:?} is not printable ASCII",
            command
        )));
    }
    if options.max_retries == Some(0) {
        return Err(CommandError::Validation("max_retries must be at least 1".into()));
    }
    if options.timeout == Some(Duration::ZERO) {
        return Err(CommandError::Validation("timeout must be non-zero".into()));
    }
    Ok(())
}

/// The command currently on the wire
struct InFlight {
    command: PendingCommand,
    emergency: bool,
    /// Correlated replies are forwarded here
    replies: mpsc::UnboundedSender<Bytes>,
    task: BoxFuture<'static, CommandResult>,
}

struct DispatchWorker {
    inbox: mpsc::UnboundedReceiver<DispatchRequest>,
    replies: mpsc::Receiver<Bytes>,
    replies_open: bool,
    transport: Arc<dyn CommandTransport>,
    events: EventBus,
    retry_backoff: Duration,
    queue: CommandQueue,
    fsm: DispatchStateMachine,
    in_flight: Option<InFlight>,
}

/// Wait for the in-flight command, or forever when there is none
async fn poll_in_flight(in_flight: &mut Option<InFlight>) -> CommandResult {
    match in_flight {
        Some(flight) => (&mut flight.task).await,
        None => std::future::pending().await,
    }
}

impl DispatchWorker {
    async fn run(mut self) {
        loop {
            self.dequeue_next();

            tokio::select! {
                biased;

                request = self.inbox.recv() => match request {
                    Some(DispatchRequest::Submit(command)) => self.enqueue(command),
                    Some(DispatchRequest::Emergency(command)) => self.begin_emergency(command),
                    Some(DispatchRequest::Status(reply)) => {
                        let _ = reply.send(DispatchStatus {
                            state: self.fsm.state(),
                            queued: self.queue.len(),
                        });
                    }
                    Some(DispatchRequest::Shutdown(done)) => {
                        self.teardown();
                        let _ = done.send(());
                        break;
                    }
                    None => {
                        self.teardown();
                        break;
                    }
                },

                raw = self.replies.recv(), if self.replies_open => match raw {
                    Some(raw) => self.correlate(raw),
                    None => {
                        warn!("[DISPATCH] Reply channel closed; in-flight commands will time out");
                        self.replies_open = false;
                    }
                },

                result = poll_in_flight(&mut self.in_flight), if self.in_flight.is_some() => {
                    self.settle(result);
                }
            }
        }

        info!("[DISPATCH] Dispatcher stopped");
    }

    fn transition(&mut self, event: DispatchEvent) {
        if let TransitionResult::Invalid { from, event } = self.fsm.process_event(event) {
            error!("[DISPATCH] Invalid transition {:?} from {:?}", event, from);
        }
    }

    fn enqueue(&mut self, command: PendingCommand) {
        debug!(
            "[DISPATCH] #{} queued '{}'{} ({} ahead)",
            command.id,
            command.command,
            if command.priority { " with priority" } else { "" },
            self.queue.len()
        );
        self.queue.push(command);
    }

    fn dequeue_next(&mut self) {
        if self.in_flight.is_some() || !self.fsm.can_dequeue() || self.queue.is_empty() {
            return;
        }
        if let Some(command) = self.queue.pop() {
            self.transition(DispatchEvent::Dequeued);
            debug!(
                "[DISPATCH] #{} executing after {:?} in queue",
                command.id,
                command.queued_at.elapsed()
            );
            self.start(command, false);
        }
    }

    fn start(&mut self, command: PendingCommand, emergency: bool) {
        let (reply_tx, reply_rx) = mpsc::unbounded_channel();
        let plan = AttemptPlan {
            id: command.id,
            command: command.command.clone(),
            timeout: command.timeout,
            max_attempts: command.max_attempts,
            backoff: self.retry_backoff,
        };
        let task = run_attempts(self.transport.clone(), reply_rx, plan).boxed();

        self.in_flight = Some(InFlight {
            command,
            emergency,
            replies: reply_tx,
            task,
        });
    }

    fn begin_emergency(&mut self, command: PendingCommand) {
        let superseded = self.queue.drain();
        if !superseded.is_empty() {
            warn!(
                "[DISPATCH] EMERGENCY: rejecting {} queued command(s)",
                superseded.len()
            );
        }
        for pending in superseded {
            pending.settle(Err(CommandError::Superseded));
        }

        if let Some(flight) = self.in_flight.take() {
            warn!(
                "[DISPATCH] EMERGENCY: abandoning in-flight #{} '{}'",
                flight.command.id, flight.command.command
            );
            if flight.emergency {
                self.events
                    .publish(DroneEvent::EmergencyResult(Err(CommandError::Superseded)));
            }
            flight.command.settle(Err(CommandError::Superseded));
        }

        self.transition(DispatchEvent::EmergencyRequested);
        error!("[DISPATCH] EMERGENCY: sending #{} '{}'", command.id, command.command);
        self.start(command, true);
    }

    fn settle(&mut self, result: CommandResult) {
        let Some(flight) = self.in_flight.take() else {
            return;
        };

        if flight.emergency {
            self.transition(DispatchEvent::EmergencySettled);
            match &result {
                Ok(response) if response.ok => info!("[DISPATCH] EMERGENCY acknowledged"),
                Ok(response) => error!("[DISPATCH] EMERGENCY refused: {}", response.message),
                Err(e) => error!("[DISPATCH] EMERGENCY failed: {}", e),
            }
            self.events.publish(DroneEvent::EmergencyResult(result.clone()));
        } else {
            self.transition(DispatchEvent::Settled);
            if let Err(e) = &result {
                warn!("[DISPATCH] #{} failed: {}", flight.command.id, e);
            }
        }

        flight.command.settle(result);
    }

    /// Route one raw datagram to the outstanding command
    fn correlate(&mut self, raw: Bytes) {
        if !is_printable_ascii(&raw) {
            warn!("[DISPATCH] Dropping malformed reply ({} bytes)", raw.len());
            return;
        }

        let text = String::from_utf8_lossy(&raw).trim().to_string();
        self.events.publish(DroneEvent::ResponseText(text.clone()));

        match &self.in_flight {
            Some(flight) => {
                if flight.replies.send(raw).is_err() {
                    debug!("[DISPATCH] #{} no longer waiting for replies", flight.command.id);
                }
            }
            None => warn!("[DISPATCH] Reply {:?} with no outstanding command, dropped", text),
        }
    }

    fn teardown(&mut self) {
        let pending = self.queue.drain();
        let in_flight = self.in_flight.take();
        info!(
            "[DISPATCH] Teardown: rejecting {} queued and {} in-flight command(s)",
            pending.len(),
            usize::from(in_flight.is_some())
        );

        if let Some(flight) = in_flight {
            if flight.emergency {
                self.events
                    .publish(DroneEvent::EmergencyResult(Err(CommandError::Disconnected)));
            }
            flight.command.settle(Err(CommandError::Disconnected));
        }
        for command in pending {
            command.settle(Err(CommandError::Disconnected));
        }
        self.transition(DispatchEvent::Reset);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventKind;
    use crate::transport::mock::{MockReply, MockTransport};
    use quadlink_shared::Response;
    use tokio::time::Instant;

    fn spawn(default_reply: MockReply) -> (CommandDispatcher, Arc<MockTransport>, EventBus) {
        let (transport, replies) = MockTransport::new(default_reply);
        let events = EventBus::new();
        let dispatcher = CommandDispatcher::spawn(
            transport.clone(),
            replies,
            DispatchConfig::default(),
            events.clone(),
        );
        (dispatcher, transport, events)
    }

    #[tokio::test(start_paused = true)]
    async fn test_submit_success() {
        let (dispatcher, transport, _) = spawn(MockReply::Reply(b"ok\r\n"));

        let result = dispatcher.submit("command", SubmitOptions::default()).await;

        assert_eq!(result, Ok(Response::success("ok")));
        assert_eq!(transport.sent_payloads(), vec!["command"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_every_handle_settles_once_in_order() {
        let (dispatcher, transport, _) =
            spawn(MockReply::After(Duration::from_millis(100), b"ok"));

        let handles: Vec<_> = (0..5)
            .map(|i| dispatcher.submit(format!("cw {}", i + 1), SubmitOptions::default()))
            .collect();

        for handle in handles {
            assert_eq!(handle.await, Ok(Response::success("ok")));
        }
        assert_eq!(
            transport.sent_payloads(),
            vec!["cw 1", "cw 2", "cw 3", "cw 4", "cw 5"]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_one_attempt_in_flight() {
        let reply_delay = Duration::from_millis(250);
        let (dispatcher, transport, _) = spawn(MockReply::After(reply_delay, b"ok"));
        transport.script([
            MockReply::Silent,
            MockReply::After(reply_delay, b"ok"),
            MockReply::After(reply_delay, b"error"),
        ]);

        let handles: Vec<_> = ["up 20", "down 20", "left 20", "right 20"]
            .into_iter()
            .map(|cmd| dispatcher.submit(cmd, SubmitOptions::default()))
            .collect();
        futures::future::join_all(handles).await;

        let sent = transport.sent();
        assert_eq!(sent.len(), 5);
        for pair in sent.windows(2) {
            assert!(
                pair[1].at - pair[0].at >= reply_delay,
                "'{}' sent {:?} after '{}'",
                pair[1].payload,
                pair[1].at - pair[0].at,
                pair[0].payload
            );
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_exhaustion() {
        let (dispatcher, transport, _) = spawn(MockReply::Silent);
        let start = Instant::now();

        let result = dispatcher.submit("takeoff", SubmitOptions::default()).await;

        assert_eq!(
            result,
            Err(CommandError::RetriesExhausted {
                command: "takeoff".into(),
                attempts: 3,
                timeout: Duration::from_millis(5000),
            })
        );
        let sent = transport.sent();
        assert_eq!(sent.len(), 3);
        assert_eq!(sent[0].at, start);
        assert_eq!(sent[1].at - sent[0].at, Duration::from_millis(5400));
        assert_eq!(sent[2].at - sent[1].at, Duration::from_millis(5400));
    }

    #[tokio::test(start_paused = true)]
    async fn test_custom_timeout_and_retries() {
        let (dispatcher, transport, _) = spawn(MockReply::Silent);

        let options = SubmitOptions::default()
            .timeout(Duration::from_millis(1000))
            .max_retries(2);
        let result = dispatcher.submit("land", options).await;

        assert!(matches!(
            result,
            Err(CommandError::RetriesExhausted { attempts: 2, .. })
        ));
        let sent = transport.sent();
        assert_eq!(sent[1].at - sent[0].at, Duration::from_millis(1400));
    }

    #[tokio::test(start_paused = true)]
    async fn test_refusal_not_retried() {
        let (dispatcher, transport, _) = spawn(MockReply::Reply(b"error"));

        let result = dispatcher.submit("flip f", SubmitOptions::default()).await;

        assert_eq!(result, Ok(Response::failure("error")));
        assert_eq!(transport.sent().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transport_error_fatal_and_queue_continues() {
        let (dispatcher, transport, _) = spawn(MockReply::Reply(b"ok"));
        transport.script([MockReply::SendError]);

        let first = dispatcher.submit("streamon", SubmitOptions::default());
        let second = dispatcher.submit("battery?", SubmitOptions::default());

        assert!(matches!(first.await, Err(CommandError::Transport(_))));
        assert_eq!(second.await, Ok(Response::success("ok")));
        assert_eq!(transport.sent_payloads(), vec!["battery?"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_validation_never_reaches_network() {
        let (dispatcher, transport, _) = spawn(MockReply::Reply(b"ok"));

        let empty = dispatcher.submit("   ", SubmitOptions::default()).await;
        let zero_retries = dispatcher
            .submit("land", SubmitOptions::default().max_retries(0))
            .await;
        let zero_timeout = dispatcher
            .submit("land", SubmitOptions::default().timeout(Duration::ZERO))
            .await;
        let binary = dispatcher.submit("up\u{7f}", SubmitOptions::default()).await;

        assert!(matches!(empty, Err(CommandError::Validation(_))));
        assert!(matches!(zero_retries, Err(CommandError::Validation(_))));
        assert!(matches!(zero_timeout, Err(CommandError::Validation(_))));
        assert!(matches!(binary, Err(CommandError::Validation(_))));
        assert!(transport.sent().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_priority_jumps_queue_but_not_executing() {
        let (dispatcher, transport, _) =
            spawn(MockReply::After(Duration::from_millis(100), b"ok"));

        let running = dispatcher.submit("takeoff", SubmitOptions::default());
        let first = dispatcher.submit("forward 50", SubmitOptions::default());
        let second = dispatcher.submit("back 50", SubmitOptions::default());
        let urgent = dispatcher.submit("land", SubmitOptions::default().priority());

        let results = futures::future::join_all([running, first, second, urgent]).await;
        assert!(results.iter().all(|r| r.is_ok()));

        assert_eq!(
            transport.sent_payloads(),
            vec!["takeoff", "land", "forward 50", "back 50"]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_emergency_supersedes_queue() {
        let (dispatcher, transport, events) = spawn(MockReply::Silent);
        let mut emergency_events = events.subscribe(EventKind::EmergencyResult);

        let executing = dispatcher.submit("takeoff", SubmitOptions::default());
        let queued: Vec<_> = (0..4)
            .map(|i| dispatcher.submit(format!("up {}", 20 + i), SubmitOptions::default()))
            .collect();

        tokio::time::sleep(Duration::from_millis(10)).await;
        transport.script([MockReply::Reply(b"ok")]);
        let emergency = dispatcher.emergency();

        for handle in queued {
            assert_eq!(handle.await, Err(CommandError::Superseded));
        }
        assert_eq!(executing.await, Err(CommandError::Superseded));
        assert_eq!(emergency.await, Ok(Response::success("ok")));

        assert_eq!(transport.sent_payloads(), vec!["takeoff", "emergency"]);
        assert!(matches!(
            emergency_events.recv().await,
            Some(DroneEvent::EmergencyResult(Ok(_)))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_emergency_never_retries() {
        let (dispatcher, transport, _) = spawn(MockReply::Silent);

        let result = dispatcher.emergency().await;

        assert!(matches!(
            result,
            Err(CommandError::RetriesExhausted { attempts: 1, .. })
        ));
        assert_eq!(transport.sent_payloads(), vec!["emergency"]);

        // Let any stray retry timer fire
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(transport.sent().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_queue_frozen_during_emergency() {
        let (dispatcher, transport, _) = spawn(MockReply::Reply(b"ok"));
        transport.script([MockReply::After(Duration::from_millis(300), b"ok")]);

        let emergency = dispatcher.emergency();
        let after = dispatcher.submit("command", SubmitOptions::default());

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(transport.sent_payloads(), vec!["emergency"]);
        assert_eq!(
            dispatcher.status().await,
            Some(DispatchStatus {
                state: DispatchState::Emergency,
                queued: 1,
            })
        );

        assert_eq!(emergency.await, Ok(Response::success("ok")));
        assert_eq!(after.await, Ok(Response::success("ok")));
        assert_eq!(transport.sent_payloads(), vec!["emergency", "command"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_uncorrelated_reply_dropped() {
        let (dispatcher, transport, events) = spawn(MockReply::Silent);
        let mut texts = events.subscribe(EventKind::ResponseText);

        transport.inject(b"ok").await;
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(matches!(texts.recv().await, Some(DroneEvent::ResponseText(t)) if t == "ok"));

        // The stray "ok" must not answer the next command
        transport.script([MockReply::After(Duration::from_millis(50), b"42")]);
        let result = dispatcher.submit("battery?", SubmitOptions::default()).await;
        assert_eq!(result, Ok(Response::success("42")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_malformed_reply_ignored() {
        let (dispatcher, transport, _) = spawn(MockReply::Silent);
        transport.script([MockReply::Reply(&[0xcc, 0x18, 0x00])]);

        let result = dispatcher
            .submit("command", SubmitOptions::default().max_retries(1))
            .await;

        assert!(matches!(result, Err(CommandError::RetriesExhausted { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_rejects_everything() {
        let (dispatcher, transport, _) = spawn(MockReply::Silent);

        let executing = dispatcher.submit("takeoff", SubmitOptions::default());
        let queued = dispatcher.submit("land", SubmitOptions::default());
        tokio::time::sleep(Duration::from_millis(10)).await;

        dispatcher.shutdown().await;

        assert_eq!(executing.await, Err(CommandError::Disconnected));
        assert_eq!(queued.await, Err(CommandError::Disconnected));
        assert_eq!(
            dispatcher.submit("command", SubmitOptions::default()).await,
            Err(CommandError::Disconnected)
        );
        assert_eq!(dispatcher.emergency().await, Err(CommandError::Disconnected));
        assert_eq!(dispatcher.status().await, None);
        assert_eq!(transport.sent_payloads(), vec!["takeoff"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_emergency_supersedes_first() {
        let (dispatcher, transport, events) = spawn(MockReply::Silent);
        let mut emergency_events = events.subscribe(EventKind::EmergencyResult);
        transport.script([MockReply::Silent, MockReply::Reply(b"ok")]);

        let first = dispatcher.emergency();
        tokio::time::sleep(Duration::from_millis(10)).await;
        let second = dispatcher.emergency();

        assert_eq!(first.await, Err(CommandError::Superseded));
        assert_eq!(second.await, Ok(Response::success("ok")));
        assert!(matches!(
            emergency_events.recv().await,
            Some(DroneEvent::EmergencyResult(Err(CommandError::Superseded)))
        ));
        assert!(matches!(
            emergency_events.recv().await,
            Some(DroneEvent::EmergencyResult(Ok(_)))
        ));
        assert_eq!(transport.sent_payloads(), vec!["emergency", "emergency"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_during_emergency_reports_result() {
        let (dispatcher, transport, events) = spawn(MockReply::Silent);
        let mut emergency_events = events.subscribe(EventKind::EmergencyResult);

        let emergency = dispatcher.emergency();
        tokio::time::sleep(Duration::from_millis(10)).await;
        dispatcher.shutdown().await;

        assert_eq!(emergency.await, Err(CommandError::Disconnected));
        assert!(matches!(
            emergency_events.recv().await,
            Some(DroneEvent::EmergencyResult(Err(CommandError::Disconnected)))
        ));
        assert_eq!(transport.sent_payloads(), vec!["emergency"]);
    }
}
