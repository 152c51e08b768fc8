//! Wire formats read by the lookup pipeline
//!
//! Parsers borrow the packet and never copy it; builders exist so that
//! tests and the CLI can construct packets.

pub mod icmp;
pub mod icmpv6;
pub mod ipv4;
pub mod ipv6;
pub mod transport;
pub mod view;

pub use ipv4::Protocol;
pub use view::PacketView;
