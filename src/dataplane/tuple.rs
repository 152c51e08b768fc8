//! Transport tuples
//!
//! The tuple is always oriented from the host's point of view: `local` is
//! the half that belongs to a socket on this machine, `remote` is the peer.

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

/// Protocols that can key a socket lookup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum L4Protocol {
    Tcp = 6,
    Udp = 17,
}

impl L4Protocol {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            6 => Some(L4Protocol::Tcp),
            17 => Some(L4Protocol::Udp),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            L4Protocol::Tcp => "tcp",
            L4Protocol::Udp => "udp",
        }
    }
}

impl fmt::Display for L4Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Address family a pipeline instance works in
pub trait TupleAddr: Copy + Eq + fmt::Debug + fmt::Display + Into<IpAddr> {
    fn from_ip(addr: IpAddr) -> Option<Self>;
}

impl TupleAddr for Ipv4Addr {
    fn from_ip(addr: IpAddr) -> Option<Self> {
        match addr {
            IpAddr::V4(v4) => Some(v4),
            IpAddr::V6(_) => None,
        }
    }
}

impl TupleAddr for Ipv6Addr {
    fn from_ip(addr: IpAddr) -> Option<Self> {
        match addr {
            IpAddr::V6(v6) => Some(v6),
            IpAddr::V4(_) => None,
        }
    }
}

/// Protocol plus both endpoints of a flow
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransportTuple<A> {
    pub protocol: L4Protocol,
    pub local_addr: A,
    pub local_port: u16,
    pub remote_addr: A,
    pub remote_port: u16,
}

pub type TupleV4 = TransportTuple<Ipv4Addr>;
pub type TupleV6 = TransportTuple<Ipv6Addr>;

impl<A: TupleAddr> TransportTuple<A> {
    pub fn new(
        protocol: L4Protocol,
        local_addr: A,
        local_port: u16,
        remote_addr: A,
        remote_port: u16,
    ) -> Self {
        Self {
            protocol,
            local_addr,
            local_port,
            remote_addr,
            remote_port,
        }
    }

    pub fn local(&self) -> SocketAddr {
        SocketAddr::new(self.local_addr.into(), self.local_port)
    }

    pub fn remote(&self) -> SocketAddr {
        SocketAddr::new(self.remote_addr.into(), self.remote_port)
    }
}

impl<A: TupleAddr> fmt::Display for TransportTuple<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} <- {}", self.protocol, self.local(), self.remote())
    }
}

/// Extraction result: the tuple and whether it came out of an ICMP error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Extracted<A> {
    pub tuple: TransportTuple<A>,
    pub via_icmp: bool,
}
