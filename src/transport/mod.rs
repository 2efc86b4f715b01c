pub mod traits;
pub mod udp;

#[cfg(test)]
pub mod mock;

pub use traits::CommandTransport;
pub use udp::UdpCommandTransport;
