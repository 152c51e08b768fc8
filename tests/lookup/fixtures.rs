//! Packet and table builders shared by the lookup tests

use sockowner::dataplane::{NetDevice, Socket, SocketState, SocketTable};
use sockowner::protocol::icmp::{self, IcmpType};
use sockowner::protocol::icmpv6::{self, Icmpv6Type};
use sockowner::protocol::ipv4::{Ipv4Builder, Protocol};
use sockowner::protocol::ipv6::{nexthdr, Ipv6Builder};
use sockowner::protocol::transport::{build_tcp, build_udp};
use std::cell::Cell;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

pub fn addr(s: &str) -> SocketAddr {
    s.parse().unwrap()
}

pub fn eth0() -> NetDevice {
    NetDevice::new(2, "eth0")
}

fn v4(a: SocketAddr) -> Ipv4Addr {
    match a.ip() {
        IpAddr::V4(ip) => ip,
        IpAddr::V6(_) => panic!("expected IPv4 address: {}", a),
    }
}

fn v6(a: SocketAddr) -> Ipv6Addr {
    match a.ip() {
        IpAddr::V6(ip) => ip,
        IpAddr::V4(_) => panic!("expected IPv6 address: {}", a),
    }
}

pub fn tcp4(src: &str, dst: &str, flags: u8) -> Vec<u8> {
    let (src, dst) = (addr(src), addr(dst));
    Ipv4Builder::new()
        .src_addr(v4(src))
        .dst_addr(v4(dst))
        .protocol(Protocol::Tcp as u8)
        .payload(&build_tcp(src.port(), dst.port(), flags))
        .build()
}

pub fn udp4(src: &str, dst: &str) -> Vec<u8> {
    let (src, dst) = (addr(src), addr(dst));
    Ipv4Builder::new()
        .src_addr(v4(src))
        .dst_addr(v4(dst))
        .protocol(Protocol::Udp as u8)
        .payload(&build_udp(src.port(), dst.port(), b"payload"))
        .build()
}

/// ICMP error from `router` to the sender of `original`
pub fn icmp4_error(router: Ipv4Addr, icmp_type: IcmpType, original: &[u8]) -> Vec<u8> {
    let sender = Ipv4Addr::new(original[12], original[13], original[14], original[15]);
    Ipv4Builder::new()
        .src_addr(router)
        .dst_addr(sender)
        .protocol(Protocol::Icmp as u8)
        .payload(&icmp::build_error(icmp_type, 0, original))
        .build()
}

pub fn tcp6(src: &str, dst: &str, flags: u8) -> Vec<u8> {
    let (src, dst) = (addr(src), addr(dst));
    Ipv6Builder::new()
        .src_addr(v6(src))
        .dst_addr(v6(dst))
        .next_header(nexthdr::TCP)
        .payload(&build_tcp(src.port(), dst.port(), flags))
        .build()
}

pub fn udp6(src: &str, dst: &str) -> Vec<u8> {
    let (src, dst) = (addr(src), addr(dst));
    Ipv6Builder::new()
        .src_addr(v6(src))
        .dst_addr(v6(dst))
        .next_header(nexthdr::UDP)
        .payload(&build_udp(src.port(), dst.port(), b"payload"))
        .build()
}

/// ICMPv6 error from `router`, quoting `original`
pub fn icmp6_error(router: Ipv6Addr, dst: Ipv6Addr, original: &[u8]) -> Vec<u8> {
    Ipv6Builder::new()
        .src_addr(router)
        .dst_addr(dst)
        .next_header(nexthdr::ICMPV6)
        .payload(&icmpv6::build_error(Icmpv6Type::PacketTooBig, 0, original))
        .build()
}

/// Socket handed out by [`CountingTable`]
#[derive(Debug, Clone, Copy)]
pub struct StubSocket {
    pub state: SocketState,
    pub bound: IpAddr,
}

impl Socket for StubSocket {
    fn state(&self) -> SocketState {
        self.state
    }

    fn bound_addr(&self) -> IpAddr {
        self.bound
    }
}

/// Table that records every call and answers with a fixed socket
#[derive(Debug, Default)]
pub struct CountingTable {
    pub answer: Option<StubSocket>,
    pub lookups: Cell<usize>,
    pub releases: Cell<usize>,
    pub last_query: Cell<Option<(SocketAddr, Option<SocketAddr>)>>,
}

impl CountingTable {
    pub fn answering(state: SocketState, bound: IpAddr) -> Self {
        Self {
            answer: Some(StubSocket { state, bound }),
            ..Self::default()
        }
    }

    fn record(&self, local: SocketAddr, remote: Option<SocketAddr>) -> Option<StubSocket> {
        self.lookups.set(self.lookups.get() + 1);
        self.last_query.set(Some((local, remote)));
        self.answer
    }
}

impl SocketTable for CountingTable {
    type Socket = StubSocket;

    fn tcp_lookup(&self, local: SocketAddr, remote: SocketAddr, _: u32) -> Option<StubSocket> {
        self.record(local, Some(remote))
    }

    fn tcp_lookup_listener(&self, local: SocketAddr, _: u32) -> Option<StubSocket> {
        self.record(local, None)
    }

    fn tcp_lookup_established(
        &self,
        local: SocketAddr,
        remote: SocketAddr,
        _: u32,
    ) -> Option<StubSocket> {
        self.record(local, Some(remote))
    }

    fn udp_lookup(&self, local: SocketAddr, remote: SocketAddr, _: u32) -> Option<StubSocket> {
        self.record(local, Some(remote))
    }

    fn release(&self, _: StubSocket) {
        self.releases.set(self.releases.get() + 1);
    }
}
