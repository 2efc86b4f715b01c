//! Video path: UDP datagrams -> external decoder -> JPEG frames
//!
//! - `decoder`: decoder child process and the datagram forwarder
//! - `reassembler`: frame reassembly engine (push and pull consumers)
//! - `pipeline`: decoder output pump and session lifecycle

pub mod decoder;
pub mod pipeline;
pub mod reassembler;

pub use decoder::DecoderConfig;
pub use pipeline::VideoSession;
pub use reassembler::{FrameReassembler, FrameStream};
