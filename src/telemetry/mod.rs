//! Telemetry from the drone's periodic status broadcast

mod listener;
mod reader;

pub use listener::spawn_listener;
pub use reader::TelemetryReader;
