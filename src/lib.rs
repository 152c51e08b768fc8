//! Sockowner - packet to socket resolution
//!
//! Given a raw IPv4 or IPv6 packet, find the local TCP/UDP socket it
//! belongs to. ICMP errors resolve to the socket of the quoted datagram,
//! and replies to source-NATed flows are traced back through connection
//! tracking to the socket that sent the original.

pub mod config;
pub mod dataplane;
pub mod error;
pub mod protocol;
pub mod system;
pub mod telemetry;

pub use error::{Error, Result};
