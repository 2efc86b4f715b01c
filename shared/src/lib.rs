//! QuadLink Shared Protocol Types
//!
//! This crate provides the protocol constants, response classification,
//! frame codec and dispatch state machine shared by the ground station
//! and the drone simulator.

pub mod codec;
pub mod command;
pub mod error;
pub mod state_machine;
pub mod telemetry;

pub use command::{Direction, FlipDirection, FlightCommand, Query, Rotation};
pub use error::{CommandError, TelemetryError, VideoError};
pub use telemetry::TelemetryState;

/// Protocol parameters for the plaintext command link
pub mod protocol {
    /// Default drone address on its own access point
    pub const DRONE_ADDRESS: &str = "192.168.10.1";

    /// UDP port the drone listens on for commands (and replies from)
    pub const COMMAND_PORT: u16 = 8889;

    /// UDP port the drone broadcasts telemetry to
    pub const TELEMETRY_PORT: u16 = 8890;

    /// UDP port the drone streams raw video to
    pub const VIDEO_PORT: u16 = 11111;

    /// Time to wait for a reply before an attempt is declared timed out
    pub const COMMAND_TIMEOUT_MS: u64 = 5000;

    /// Maximum send attempts per command
    pub const COMMAND_MAX_RETRIES: u32 = 3;

    /// Pause between a timed out attempt and the next one
    pub const RETRY_BACKOFF_MS: u64 = 400;

    /// Reply token the drone uses to refuse a command
    pub const ERROR_TOKEN: &str = "error";

    /// Command that stops all motors immediately
    pub const EMERGENCY_COMMAND: &str = "emergency";

    /// Ceiling for undelimited decoder output (5 MiB)
    pub const MAX_FRAME_BUFFER: usize = 5 * 1024 * 1024;
}

/// Movement ranges accepted by the drone firmware
pub mod limits {
    use std::ops::RangeInclusive;

    /// Linear move distance in cm
    pub const MOVE_CM: RangeInclusive<u32> = 20..=500;

    /// Rotation in degrees
    pub const ROTATE_DEG: RangeInclusive<u32> = 1..=360;

    /// Per-axis offset for `go` in cm
    pub const GO_AXIS_CM: RangeInclusive<i32> = -500..=500;

    /// `go` targets where every axis falls inside this band are rejected
    pub const GO_DEAD_BAND_CM: RangeInclusive<i32> = -20..=20;

    /// Flight speed in cm/s
    pub const SPEED_CM_S: RangeInclusive<u32> = 10..=100;
}

/// Outcome of correlating one reply datagram to the outstanding command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// True when the drone accepted the command
    pub ok: bool,
    /// Trimmed reply text
    pub message: String,
}

impl Response {
    /// Create a successful response
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            ok: true,
            message: message.into(),
        }
    }

    /// Create a non-success response
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            message: message.into(),
        }
    }

    /// Classify a raw reply payload
    ///
    /// A reply is a success when it is ASCII-only and its trimmed content is
    /// non-empty and not the error token (case-insensitive). Everything else
    /// is a well-formed refusal, which callers must not retry.
    pub fn classify(raw: &[u8]) -> Self {
        let text = String::from_utf8_lossy(raw);
        let message = text.trim().to_string();

        let ok = raw.is_ascii()
            && !message.is_empty()
            && !message.eq_ignore_ascii_case(protocol::ERROR_TOKEN);

        Self { ok, message }
    }
}

/// Check that a payload only contains printable ASCII (plus line endings)
pub fn is_printable_ascii(raw: &[u8]) -> bool {
    !raw.is_empty()
        && raw
            .iter()
            .all(|&b| matches!(b, b' '..=b'~' | b'\r' | b'\n' | b'\t'))
}
