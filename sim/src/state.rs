//! Simulated drone state and command handling

use quadlink_shared::{limits, protocol, TelemetryState};
use std::time::Duration;

/// Reply sent for accepted commands
const OK: &str = "ok";

/// Height reached after takeoff, in cm
const TAKEOFF_HEIGHT_CM: i32 = 80;

/// Battery needed for a flip, in percent
const FLIP_MIN_BATTERY: u32 = 50;

/// Seconds of flight per percent of battery
const SECONDS_PER_PERCENT: f64 = 10.0;

/// Everything the simulator tracks about its airframe
#[derive(Debug, Clone)]
pub struct SimDrone {
    sdk_mode: bool,
    flying: bool,
    height_cm: i32,
    yaw: i32,
    speed: u32,
    battery: f64,
    flight_time: Duration,
}

impl Default for SimDrone {
    fn default() -> Self {
        Self {
            sdk_mode: false,
            flying: false,
            height_cm: 0,
            yaw: 0,
            speed: 10,
            battery: 100.0,
            flight_time: Duration::ZERO,
        }
    }
}

impl SimDrone {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `command` has been received
    pub fn sdk_mode(&self) -> bool {
        self.sdk_mode
    }

    pub fn flying(&self) -> bool {
        self.flying
    }

    /// Apply one command line and produce the reply text
    pub fn handle(&mut self, line: &str) -> String {
        let mut parts = line.split_whitespace();
        let Some(verb) = parts.next() else {
            return protocol::ERROR_TOKEN.into();
        };
        let args: Vec<&str> = parts.collect();

        if verb == "command" {
            self.sdk_mode = true;
            return OK.into();
        }
        if !self.sdk_mode {
            return protocol::ERROR_TOKEN.into();
        }

        let reply = match (verb, args.as_slice()) {
            ("takeoff", []) => self.takeoff(),
            ("land", []) => self.land(),
            (protocol::EMERGENCY_COMMAND, []) => {
                self.flying = false;
                self.height_cm = 0;
                Some(OK.into())
            }
            // No camera is simulated, the stream toggles are only acknowledged
            ("streamon" | "streamoff", []) => Some(OK.into()),
            ("up" | "down" | "left" | "right" | "forward" | "back", [cm]) => self.linear(verb, cm),
            ("cw" | "ccw", [deg]) => self.rotate(verb == "cw", deg),
            ("flip", [dir]) => self.flip(dir),
            ("go", [x, y, z, speed]) => self.go(x, y, z, speed),
            ("speed", [speed]) => self.set_speed(speed),
            _ => self.query(verb, &args),
        };

        reply.unwrap_or_else(|| protocol::ERROR_TOKEN.into())
    }

    fn takeoff(&mut self) -> Option<String> {
        if self.flying {
            return None;
        }
        self.flying = true;
        self.height_cm = TAKEOFF_HEIGHT_CM;
        Some(OK.into())
    }

    fn land(&mut self) -> Option<String> {
        if !self.flying {
            return None;
        }
        self.flying = false;
        self.height_cm = 0;
        Some(OK.into())
    }

    fn linear(&mut self, verb: &str, cm: &str) -> Option<String> {
        let cm: u32 = cm.parse().ok()?;
        if !self.flying || !limits::MOVE_CM.contains(&cm) {
            return None;
        }
        match verb {
            "up" => self.height_cm += cm as i32,
            "down" => self.height_cm = (self.height_cm - cm as i32).max(0),
            _ => {}
        }
        Some(OK.into())
    }

    fn rotate(&mut self, clockwise: bool, deg: &str) -> Option<String> {
        let deg: u32 = deg.parse().ok()?;
        if !self.flying || !limits::ROTATE_DEG.contains(&deg) {
            return None;
        }
        let delta = if clockwise { deg as i32 } else { -(deg as i32) };
        self.yaw = (self.yaw + delta + 180).rem_euclid(360) - 180;
        Some(OK.into())
    }

    fn flip(&mut self, dir: &str) -> Option<String> {
        if !self.flying || !matches!(dir, "l" | "r" | "f" | "b") {
            return None;
        }
        if (self.battery as u32) < FLIP_MIN_BATTERY {
            return None;
        }
        Some(OK.into())
    }

    fn go(&mut self, x: &str, y: &str, z: &str, speed: &str) -> Option<String> {
        let axes: Vec<i32> = [x, y, z]
            .iter()
            .map(|v| v.parse().ok())
            .collect::<Option<_>>()?;
        let speed: u32 = speed.parse().ok()?;

        if !self.flying
            || !axes.iter().all(|v| limits::GO_AXIS_CM.contains(v))
            || axes.iter().all(|v| limits::GO_DEAD_BAND_CM.contains(v))
            || !limits::SPEED_CM_S.contains(&speed)
        {
            return None;
        }
        self.height_cm = (self.height_cm + axes[2]).max(0);
        Some(OK.into())
    }

    fn set_speed(&mut self, speed: &str) -> Option<String> {
        let speed: u32 = speed.parse().ok()?;
        if !limits::SPEED_CM_S.contains(&speed) {
            return None;
        }
        self.speed = speed;
        Some(OK.into())
    }

    fn query(&self, verb: &str, args: &[&str]) -> Option<String> {
        if !args.is_empty() {
            return None;
        }
        let reply = match verb {
            "battery?" => format!("{}", self.battery as u32),
            "speed?" => format!("{:.1}", self.speed as f64),
            "time?" => format!("{}s", self.flight_time.as_secs()),
            "height?" => format!("{}dm", self.height_cm / 10),
            "temp?" => "60~63C".to_string(),
            "attitude?" => format!("pitch:0;roll:0;yaw:{};", self.yaw),
            "baro?" => format!("{:.2}", self.height_cm as f64 / 100.0),
            "tof?" => format!("{}mm", (self.height_cm.max(10)) * 10),
            "wifi?" => "90".to_string(),
            _ => return None,
        };
        Some(reply)
    }

    /// How long the real airframe takes before answering `line`
    pub fn reply_delay(&self, line: &str) -> Duration {
        match line.split_whitespace().next() {
            Some("takeoff" | "land") => Duration::from_millis(1500),
            Some("go" | "flip") => Duration::from_millis(800),
            _ => Duration::ZERO,
        }
    }

    /// Advance the clock while flying
    pub fn tick(&mut self, elapsed: Duration) {
        if !self.flying {
            return;
        }
        self.flight_time += elapsed;
        self.battery = (self.battery - elapsed.as_secs_f64() / SECONDS_PER_PERCENT).max(0.0);
        if self.battery <= 0.0 {
            self.flying = false;
            self.height_cm = 0;
        }
    }

    /// Current status broadcast
    pub fn telemetry(&self) -> TelemetryState {
        TelemetryState {
            yaw: self.yaw,
            templ: 60,
            temph: 63,
            tof: self.height_cm.max(10),
            h: self.height_cm,
            bat: self.battery as u32,
            baro: self.height_cm as f64 / 100.0,
            time: self.flight_time.as_secs() as u32,
            agz: -1000.0,
            ..Default::default()
        }
    }
}
