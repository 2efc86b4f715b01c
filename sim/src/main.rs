//! Drone simulator: answers the plaintext command protocol over UDP and
//! broadcasts telemetry to whoever sent the last command.

mod state;

use anyhow::{Context, Result};
use quadlink_shared::protocol;
use state::SimDrone;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Telemetry broadcast period (10 Hz)
const TELEMETRY_PERIOD: Duration = Duration::from_millis(100);

#[derive(Debug, Clone)]
struct SimConfig {
    /// Command socket bind
    bind: SocketAddr,
    /// Port on the controller that receives telemetry
    telemetry_port: u16,
    /// Swallow every Nth command without replying (0 disables)
    drop_every: u64,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from((Ipv4Addr::UNSPECIFIED, protocol::COMMAND_PORT)),
            telemetry_port: protocol::TELEMETRY_PORT,
            drop_every: 0,
        }
    }
}

fn load_config() -> Result<SimConfig> {
    let mut config = SimConfig::default();
    if let Ok(bind) = std::env::var("SIM_BIND") {
        config.bind = bind.parse().with_context(|| format!("SIM_BIND={}", bind))?;
    }
    if let Ok(port) = std::env::var("SIM_TELEMETRY_PORT") {
        config.telemetry_port = port
            .parse()
            .with_context(|| format!("SIM_TELEMETRY_PORT={}", port))?;
    }
    if let Ok(n) = std::env::var("SIM_DROP_EVERY") {
        config.drop_every = n.parse().with_context(|| format!("SIM_DROP_EVERY={}", n))?;
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let config = load_config()?;
    let socket = UdpSocket::bind(config.bind)
        .await
        .with_context(|| format!("binding {}", config.bind))?;
    info!("[SIM] Drone simulator listening on {}", socket.local_addr()?);
    if config.drop_every > 0 {
        info!("[SIM] Dropping every {} command(s)", config.drop_every);
    }

    run(Arc::new(socket), config).await;
    Ok(())
}

/// Serve commands and broadcast telemetry forever
async fn run(socket: Arc<UdpSocket>, config: SimConfig) {
    let mut drone = SimDrone::new();
    let mut controller: Option<SocketAddr> = None;
    let mut received: u64 = 0;
    let mut buf = vec![0u8; 1024];

    let mut ticker = interval(TELEMETRY_PERIOD);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut last_tick = Instant::now();

    loop {
        tokio::select! {
            result = socket.recv_from(&mut buf) => {
                let (n, from) = match result {
                    Ok(received) => received,
                    Err(e) => {
                        warn!("[SIM] Receive error: {}", e);
                        continue;
                    }
                };
                let line = String::from_utf8_lossy(&buf[..n]).trim().to_string();
                received += 1;

                if controller != Some(from) {
                    info!("[SIM] Controller is now {}", from);
                    controller = Some(from);
                }

                if config.drop_every > 0 && received % config.drop_every == 0 {
                    warn!("[SIM] Dropping '{}'", line);
                    continue;
                }

                let delay = drone.reply_delay(&line);
                let reply = drone.handle(&line);
                debug!("[SIM] '{}' -> '{}' (after {:?})", line, reply, delay);
                if line == protocol::EMERGENCY_COMMAND {
                    warn!("[SIM] Emergency stop, motors off");
                }

                let socket = socket.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    if let Err(e) = socket.send_to(reply.as_bytes(), from).await {
                        warn!("[SIM] Reply to {} failed: {}", from, e);
                    }
                });
            }
            now = ticker.tick() => {
                drone.tick(now - last_tick);
                last_tick = now;

                let Some(controller) = controller else { continue };
                if !drone.sdk_mode() {
                    continue;
                }
                let target = SocketAddr::new(controller.ip(), config.telemetry_port);
                if let Err(e) = socket.send_to(drone.telemetry().to_wire().as_bytes(), target).await {
                    debug!("[SIM] Telemetry to {} failed: {}", target, e);
                }
            }
        }
    }
}
