//! Typed flight commands
//!
//! Translates high-level instructions into the drone's plaintext command
//! strings, rejecting arguments outside the firmware's accepted ranges
//! before anything reaches the network.

use std::fmt;
use std::time::Duration;

use crate::error::CommandError;
use crate::limits;
use crate::protocol;

/// Linear move direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
    Forward,
    Back,
}

impl Direction {
    fn as_str(self) -> &'static str {
        match self {
            Direction::Up => "up",
            Direction::Down => "down",
            Direction::Left => "left",
            Direction::Right => "right",
            Direction::Forward => "forward",
            Direction::Back => "back",
        }
    }
}

/// Yaw rotation direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rotation {
    Clockwise,
    CounterClockwise,
}

/// Flip direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlipDirection {
    Left,
    Right,
    Forward,
    Back,
}

/// Read-only status queries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Query {
    Battery,
    Speed,
    FlightTime,
    Height,
    Temperature,
    Attitude,
    Barometer,
    Tof,
    Wifi,
}

impl Query {
    fn as_str(self) -> &'static str {
        match self {
            Query::Battery => "battery?",
            Query::Speed => "speed?",
            Query::FlightTime => "time?",
            Query::Height => "height?",
            Query::Temperature => "temp?",
            Query::Attitude => "attitude?",
            Query::Barometer => "baro?",
            Query::Tof => "tof?",
            Query::Wifi => "wifi?",
        }
    }
}

/// A single instruction for the drone
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlightCommand {
    /// Switch the drone into SDK (command) mode
    EnterSdk,
    Takeoff,
    Land,
    /// Stop all motors immediately
    Emergency,
    StreamOn,
    StreamOff,
    /// Move in a straight line by `cm`
    Move { direction: Direction, cm: u32 },
    /// Rotate by `degrees`
    Rotate { rotation: Rotation, degrees: u32 },
    Flip(FlipDirection),
    /// Fly to an offset relative to the current position
    Go { x: i32, y: i32, z: i32, speed: u32 },
    /// Set cruise speed in cm/s
    SetSpeed(u32),
    Query(Query),
}

fn check_range<T>(what: &str, value: T, range: &std::ops::RangeInclusive<T>) -> Result<(), CommandError>
where
    T: PartialOrd + fmt::Display,
{
    if range.contains(&value) {
        Ok(())
    } else {
        Err(CommandError::Validation(format!(
            "{} {} out of range {}..={}",
            what,
            value,
            range.start(),
            range.end()
        )))
    }
}

impl FlightCommand {
    /// Encode to the wire string, validating ranges
    pub fn encode(&self) -> Result<String, CommandError> {
        let wire = match *self {
            FlightCommand::EnterSdk => "command".to_string(),
            FlightCommand::Takeoff => "takeoff".to_string(),
            FlightCommand::Land => "land".to_string(),
            FlightCommand::Emergency => protocol::EMERGENCY_COMMAND.to_string(),
            FlightCommand::StreamOn => "streamon".to_string(),
            FlightCommand::StreamOff => "streamoff".to_string(),
            FlightCommand::Move { direction, cm } => {
                check_range("distance", cm, &limits::MOVE_CM)?;
                format!("{} {}", direction.as_str(), cm)
            }
            FlightCommand::Rotate { rotation, degrees } => {
                check_range("rotation", degrees, &limits::ROTATE_DEG)?;
                let verb = match rotation {
                    Rotation::Clockwise => "cw",
                    Rotation::CounterClockwise => "ccw",
                };
                format!("{} {}", verb, degrees)
            }
            FlightCommand::Flip(direction) => {
                let code = match direction {
                    FlipDirection::Left => 'l',
                    FlipDirection::Right => 'r',
                    FlipDirection::Forward => 'f',
                    FlipDirection::Back => 'b',
                };
                format!("flip {}", code)
            }
            FlightCommand::Go { x, y, z, speed } => {
                check_range("x", x, &limits::GO_AXIS_CM)?;
                check_range("y", y, &limits::GO_AXIS_CM)?;
                check_range("z", z, &limits::GO_AXIS_CM)?;
                check_range("speed", speed, &limits::SPEED_CM_S)?;
                if [x, y, z].iter().all(|v| limits::GO_DEAD_BAND_CM.contains(v)) {
                    return Err(CommandError::Validation(format!(
                        "go target ({}, {}, {}) is too close to the current position",
                        x, y, z
                    )));
                }
                format!("go {} {} {} {}", x, y, z, speed)
            }
            FlightCommand::SetSpeed(speed) => {
                check_range("speed", speed, &limits::SPEED_CM_S)?;
                format!("speed {}", speed)
            }
            FlightCommand::Query(query) => query.as_str().to_string(),
        };

        Ok(wire)
    }

    /// Reply wait suited to the manoeuvre, if longer than the default
    pub fn recommended_timeout(&self) -> Option<Duration> {
        match self {
            FlightCommand::Takeoff | FlightCommand::Land => Some(Duration::from_secs(20)),
            FlightCommand::Go { .. } | FlightCommand::Flip(_) => Some(Duration::from_secs(10)),
            FlightCommand::Move { cm, .. } if *cm > 200 => Some(Duration::from_secs(10)),
            _ => None,
        }
    }
}

impl fmt::Display for FlightCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.encode() {
            Ok(wire) => write!(f, "{}", wire),
            Err(_) => write!(f, "{:?}", self),
        }
    }
}
