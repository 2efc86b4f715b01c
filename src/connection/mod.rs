//! Connection facade for one drone
//!
//! This module handles:
//! - Binding the command and telemetry sockets
//! - Routing typed commands through validation into the dispatcher
//! - Starting and stopping the video pipeline
//! - Ordered teardown

mod manager;

pub use manager::{ConnectionConfig, DroneConnection};
