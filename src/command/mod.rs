//! Command dispatch for the drone link
//!
//! This module handles:
//! - Queuing commands with priority head-insertion
//! - Keeping exactly one command on the wire at a time
//! - Timeout and retry logic per command
//! - Emergency preemption of everything queued

mod attempt;
mod dispatcher;
mod queue;

pub use dispatcher::{CommandDispatcher, DispatchConfig, DispatchStatus, SubmitOptions};
pub use queue::CommandHandle;
