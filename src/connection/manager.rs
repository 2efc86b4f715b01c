//! Drone connection: owns the command link, telemetry and video pipeline

use crate::command::{CommandDispatcher, CommandHandle, DispatchConfig, DispatchStatus, SubmitOptions};
use crate::events::{DroneEvent, EventBus, EventKind};
use crate::telemetry::{spawn_listener, TelemetryReader};
use crate::transport::UdpCommandTransport;
use crate::video::{DecoderConfig, FrameReassembler, FrameStream, VideoSession};
use anyhow::{Context, Result};
use quadlink_shared::{protocol, FlightCommand, TelemetryState};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Addresses and tuning for one drone link
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Drone command endpoint
    pub drone_addr: SocketAddr,
    /// Local bind for the command socket
    pub command_bind: SocketAddr,
    /// Local bind for the status broadcast socket
    pub telemetry_bind: SocketAddr,
    /// Dispatcher timing
    pub dispatch: DispatchConfig,
    /// Video decoder launch settings
    pub decoder: DecoderConfig,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        let drone_ip = protocol::DRONE_ADDRESS
            .parse()
            .unwrap_or(IpAddr::V4(Ipv4Addr::new(192, 168, 10, 1)));
        Self {
            drone_addr: SocketAddr::new(drone_ip, protocol::COMMAND_PORT),
            command_bind: SocketAddr::from((Ipv4Addr::UNSPECIFIED, protocol::COMMAND_PORT)),
            telemetry_bind: SocketAddr::from((Ipv4Addr::UNSPECIFIED, protocol::TELEMETRY_PORT)),
            dispatch: DispatchConfig::default(),
            decoder: DecoderConfig::default(),
        }
    }
}

/// A live connection to one drone
pub struct DroneConnection {
    config: ConnectionConfig,
    transport: Arc<UdpCommandTransport>,
    dispatcher: CommandDispatcher,
    events: EventBus,
    telemetry: Arc<TelemetryReader>,
    telemetry_task: JoinHandle<()>,
    reassembler: Arc<FrameReassembler>,
    video: Mutex<Option<VideoSession>>,
}

impl DroneConnection {
    /// Bind the command and telemetry sockets and start the dispatcher
    pub async fn open(config: ConnectionConfig) -> Result<Self> {
        let events = EventBus::new();

        let (transport, replies) =
            UdpCommandTransport::bind(config.command_bind, config.drone_addr).await?;
        let transport = Arc::new(transport);

        let telemetry_socket = UdpSocket::bind(config.telemetry_bind)
            .await
            .with_context(|| format!("binding telemetry socket on {}", config.telemetry_bind))?;
        let telemetry = Arc::new(TelemetryReader::new(events.clone()));
        let telemetry_task = spawn_listener(telemetry_socket, telemetry.clone());

        let dispatcher = CommandDispatcher::spawn(
            transport.clone(),
            replies,
            config.dispatch.clone(),
            events.clone(),
        );
        let reassembler = Arc::new(FrameReassembler::new(events.clone()));

        info!(
            "[LINK] Connected to {} via {}",
            config.drone_addr,
            transport.local_addr()?
        );

        Ok(Self {
            config,
            transport,
            dispatcher,
            events,
            telemetry,
            telemetry_task,
            reassembler,
            video: Mutex::new(None),
        })
    }

    /// Validate and queue a typed command
    ///
    /// Out-of-range arguments settle the handle with a validation error
    /// without touching the network. `Emergency` takes the emergency path.
    pub fn send(&self, command: FlightCommand) -> CommandHandle {
        if command == FlightCommand::Emergency {
            return self.emergency();
        }
        let text = match command.encode() {
            Ok(text) => text,
            Err(e) => {
                warn!("[LINK] Rejected {}: {}", command, e);
                return CommandHandle::settled(0, Err(e));
            }
        };

        let mut options = SubmitOptions::default();
        if let Some(timeout) = command.recommended_timeout() {
            options = options.timeout(timeout);
        }
        self.dispatcher.submit(text, options)
    }

    /// Queue a raw instruction
    pub fn submit(&self, command: impl Into<String>, options: SubmitOptions) -> CommandHandle {
        self.dispatcher.submit(command, options)
    }

    /// Drop everything queued and stop the motors
    pub fn emergency(&self) -> CommandHandle {
        self.dispatcher.emergency()
    }

    /// Launch the decoder pipeline and ask the drone to start streaming
    pub async fn start_video(&self) -> Result<CommandHandle> {
        let mut video = self.video.lock().await;
        if video.as_ref().is_some_and(|session| !session.is_running()) {
            if let Some(session) = video.take() {
                warn!("[LINK] Decoder exited, restarting video session");
                session.stop().await;
            }
        }
        if video.is_none() {
            *video = Some(VideoSession::start(&self.config.decoder, self.reassembler.clone()).await?);
        }
        Ok(self.send(FlightCommand::StreamOn))
    }

    /// Ask the drone to stop streaming and tear the decoder down
    pub async fn stop_video(&self) -> CommandHandle {
        let handle = self.send(FlightCommand::StreamOff);
        if let Some(session) = self.video.lock().await.take() {
            session.stop().await;
        }
        handle
    }

    /// Pull consumer over decoded frames
    pub fn frames(&self) -> FrameStream {
        self.reassembler.frames()
    }

    /// Push consumer for one event kind
    pub fn subscribe(&self, kind: EventKind) -> mpsc::UnboundedReceiver<DroneEvent> {
        self.events.subscribe(kind)
    }

    /// Latest status broadcast
    pub async fn telemetry(&self) -> Option<TelemetryState> {
        self.telemetry.latest().await
    }

    /// Frame engine counters
    pub fn reassembler(&self) -> &FrameReassembler {
        &self.reassembler
    }

    /// Telemetry decode counters
    pub fn telemetry_reader(&self) -> &TelemetryReader {
        &self.telemetry
    }

    /// Dispatcher state and queue depth
    pub async fn status(&self) -> Option<DispatchStatus> {
        self.dispatcher.status().await
    }

    /// Local address of the command socket
    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.transport.local_addr()
    }

    /// Tear down in order: decoder, pending commands, sockets
    pub async fn shutdown(&self) {
        if let Some(session) = self.video.lock().await.take() {
            session.stop().await;
        }
        self.reassembler.end_stream("connection closed");
        self.dispatcher.shutdown().await;
        self.transport.close();
        self.telemetry_task.abort();
        info!("[LINK] Connection to {} closed", self.config.drone_addr);
    }
}
