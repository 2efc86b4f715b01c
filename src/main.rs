mod command;
mod connection;
mod events;
mod telemetry;
mod transport;
mod video;

use anyhow::{Context, Result};
use command::{CommandHandle, SubmitOptions};
use connection::{ConnectionConfig, DroneConnection};
use events::{DroneEvent, EventKind};
use futures::StreamExt;
use quadlink_shared::FlightCommand;
use std::net::SocketAddr;
use tokio::io::{AsyncBufReadExt, BufReader};

use tracing::{debug, error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Log one telemetry line per this many broadcasts
const TELEMETRY_LOG_EVERY: u64 = 50;

/// Log the frame count every this many frames
const FRAME_LOG_EVERY: u64 = 30;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let config = load_config()?;
    info!("Ground station starting");
    info!("  Drone: {}", config.drone_addr);
    info!("  Command bind: {}", config.command_bind);
    info!("  Telemetry bind: {}", config.telemetry_bind);

    let link = DroneConnection::open(config).await?;
    info!("  Command socket: {}", link.local_addr()?);

    spawn_event_logger(&link);

    // The drone ignores everything until it is put into SDK mode
    report("command", link.send(FlightCommand::EnterSdk));

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                match line.context("reading stdin")? {
                    Some(line) => {
                        if !handle_line(&link, line.trim()).await {
                            break;
                        }
                    }
                    None => break,
                }
            }
            _ = tokio::signal::ctrl_c() => {
                warn!("[MAIN] Interrupted");
                break;
            }
        }
    }

    link.shutdown().await;
    info!("Ground station stopped");
    Ok(())
}

/// Defaults plus `QUADLINK_*` environment overrides
fn load_config() -> Result<ConnectionConfig> {
    let mut config = ConnectionConfig::default();

    if let Some(addr) = env_addr("QUADLINK_DRONE_ADDR")? {
        config.drone_addr = addr;
    }
    if let Some(addr) = env_addr("QUADLINK_COMMAND_BIND")? {
        config.command_bind = addr;
    }
    if let Some(addr) = env_addr("QUADLINK_TELEMETRY_BIND")? {
        config.telemetry_bind = addr;
    }
    if let Ok(program) = std::env::var("QUADLINK_DECODER") {
        config.decoder.program = program;
    }
    if let Ok(port) = std::env::var("QUADLINK_VIDEO_PORT") {
        config.decoder.video_port = port
            .parse()
            .with_context(|| format!("QUADLINK_VIDEO_PORT={}", port))?;
    }

    Ok(config)
}

fn env_addr(name: &str) -> Result<Option<SocketAddr>> {
    match std::env::var(name) {
        Ok(value) => value
            .parse()
            .map(Some)
            .with_context(|| format!("{}={}", name, value)),
        Err(_) => Ok(None),
    }
}

/// Run one console line; returns false when the console should exit
async fn handle_line(link: &DroneConnection, line: &str) -> bool {
    match line {
        "" => {}
        "quit" | "exit" => return false,
        "emergency" => report("emergency", link.emergency()),
        "status" => {
            match link.status().await {
                Some(status) => info!("[MAIN] Dispatcher {:?}, {} queued", status.state, status.queued),
                None => warn!("[MAIN] Dispatcher stopped"),
            }
            match link.telemetry().await {
                Some(state) => info!(
                    "[MAIN] bat {}% h {} cm tof {} cm yaw {}",
                    state.bat, state.h, state.tof, state.yaw
                ),
                None => info!("[MAIN] No telemetry yet"),
            }
            let telemetry = link.telemetry_reader();
            info!(
                "[MAIN] Telemetry: {} decoded, {} rejected",
                telemetry.received(),
                telemetry.rejected()
            );
            let video = link.reassembler();
            info!(
                "[MAIN] Video {}: {} frames, {} bytes buffered",
                if video.is_active() { "active" } else { "ended" },
                video.frames_emitted(),
                video.buffered()
            );
        }
        "video on" => match link.start_video().await {
            Ok(handle) => {
                report("streamon", handle);
                spawn_frame_counter(link);
            }
            Err(e) => error!("[MAIN] Video start failed: {:#}", e),
        },
        "video off" => report("streamoff", link.stop_video().await),
        _ => match line.strip_prefix('!') {
            Some(urgent) => report(urgent, link.submit(urgent, SubmitOptions::default().priority())),
            None => report(line, link.submit(line, SubmitOptions::default())),
        },
    }
    true
}

/// Log the outcome of a command once it settles
fn report(label: &str, handle: CommandHandle) {
    let label = label.to_string();
    tokio::spawn(async move {
        let id = handle.id();
        match handle.await {
            Ok(response) if response.ok => info!("[MAIN] #{} {} -> {}", id, label, response.message),
            Ok(response) => warn!("[MAIN] #{} {} refused: {}", id, label, response.message),
            Err(e) => error!("[MAIN] #{} {} failed: {}", id, label, e),
        }
    });
}

fn spawn_event_logger(link: &DroneConnection) {
    let mut telemetry = link.subscribe(EventKind::StateUpdate);
    let mut replies = link.subscribe(EventKind::ResponseText);
    let mut emergencies = link.subscribe(EventKind::EmergencyResult);
    let mut video_end = link.subscribe(EventKind::VideoStreamEnded);

    tokio::spawn(async move {
        let mut broadcasts: u64 = 0;
        loop {
            let event = tokio::select! {
                Some(event) = telemetry.recv() => event,
                Some(event) = replies.recv() => event,
                Some(event) = emergencies.recv() => event,
                Some(event) = video_end.recv() => event,
                else => break,
            };

            match event {
                DroneEvent::StateUpdate(state) => {
                    broadcasts += 1;
                    if broadcasts % TELEMETRY_LOG_EVERY == 1 {
                        debug!("[MAIN] Telemetry: {}", state.to_wire().trim_end());
                    }
                }
                DroneEvent::ResponseText(text) => debug!("[MAIN] Reply: {}", text),
                DroneEvent::EmergencyResult(result) => warn!("[MAIN] Emergency result: {:?}", result),
                DroneEvent::VideoStreamEnded(reason) => info!("[MAIN] Video ended: {}", reason),
                DroneEvent::Frame(_) => {}
            }
        }
    });
}

fn spawn_frame_counter(link: &DroneConnection) {
    let mut frames = link.frames();
    tokio::spawn(async move {
        let mut count: u64 = 0;
        let mut bytes: u64 = 0;
        while let Some(frame) = frames.next().await {
            count += 1;
            bytes += frame.len() as u64;
            if count % FRAME_LOG_EVERY == 0 {
                info!("[MAIN] {} frames, {} KiB", count, bytes / 1024);
            }
        }
        info!("[MAIN] Frame stream closed after {} frames", count);
    });
}
