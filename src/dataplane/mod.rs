//! Socket lookup pipeline
//!
//! Extracts the transport tuple of a packet, corrects it for source NAT,
//! and searches the socket tables for the socket that owns it.

mod conntrack;
mod exthdr;
mod extract;
mod nat;
mod resolver;
mod search;
mod socket_table;
mod tuple;

pub use conntrack::{
    ConnEntry, ConnInfo, ConnMatch, ConnStatus, ConnTrack, ConnTrackTable, ConnTuple, NoConnTrack,
};
pub use exthdr::{find_header, ExtCursor, HeaderLocation, HeaderTarget, WalkState};
pub use extract::{extract_icmp4, extract_icmp6, extract_v4, extract_v6};
pub use nat::{needs_snat_rewrite, rewrite_for_snat};
pub use resolver::SocketResolver;
pub use search::{get_socket, lookup_socket, LookupMode};
pub use socket_table::{
    InetSocketTable, NetDevice, Socket, SocketEntry, SocketRef, SocketState, SocketTable,
};
pub use tuple::{Extracted, L4Protocol, TransportTuple, TupleAddr, TupleV4, TupleV6};
