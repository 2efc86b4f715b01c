//! Error taxonomy for command dispatch, video and telemetry

use std::time::Duration;
use thiserror::Error;

/// Reasons a command can fail to produce a [`crate::Response`]
///
/// A drone refusing a command is not an error: that comes back as a
/// `Response` with `ok == false`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    #[error("Max retries exceeded: no reply to '{command}' after {attempts} attempt(s) of {timeout:?}")]
    RetriesExhausted {
        command: String,
        attempts: u32,
        timeout: Duration,
    },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Invalid command: {0}")]
    Validation(String),

    #[error("Disconnected")]
    Disconnected,

    #[error("Superseded by emergency")]
    Superseded,
}

/// Errors surfaced to frame consumers
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VideoError {
    #[error("Video stream ended: {0}")]
    StreamEnded(String),
}

/// Errors while decoding a telemetry broadcast
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TelemetryError {
    #[error("Telemetry is not valid ASCII text")]
    NotText,

    #[error("Invalid value for '{key}': {value}")]
    InvalidValue { key: String, value: String },

    #[error("No telemetry fields found")]
    Empty,
}
