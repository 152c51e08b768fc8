//! End-to-end socket lookups: packet bytes in, owning socket out
//!
//! Run with: cargo test --test lookup

mod fixtures;

use fixtures::*;
use sockowner::dataplane::{
    find_header, ConnEntry, ConnStatus, ConnTrackTable, ConnTuple, HeaderTarget, InetSocketTable,
    L4Protocol, LookupMode, NoConnTrack, SocketEntry, SocketResolver, SocketState,
};
use sockowner::protocol::icmp::IcmpType;
use sockowner::protocol::ipv6::{nexthdr, Ipv6Builder};
use sockowner::protocol::transport::tcp_flags;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::sync::Arc;

fn snat_udp_flow() -> ConnTrackTable {
    // 10.0.0.5:5000 -> 8.8.8.8:53 leaves the host as 192.0.2.1:40000
    let mut conntrack = ConnTrackTable::new();
    conntrack.insert(ConnEntry::with_reply(
        ConnTuple::new(L4Protocol::Udp, addr("10.0.0.5:5000"), addr("8.8.8.8:53")),
        ConnTuple::new(L4Protocol::Udp, addr("8.8.8.8:53"), addr("192.0.2.1:40000")),
        ConnStatus::SEEN_REPLY | ConnStatus::SRC_NAT | ConnStatus::SRC_NAT_DONE,
    ));
    conntrack
}

/// Inbound SYN finds the listener bound to its destination
#[test]
fn test_syn_reaches_listener() {
    let mut table = InetSocketTable::new();
    let listener = table.insert(SocketEntry::new(
        L4Protocol::Tcp,
        addr("10.0.0.5:80"),
        SocketState::Listen,
    ));
    let resolver = SocketResolver::new(table, NoConnTrack);

    let syn = tcp4("203.0.113.9:51000", "10.0.0.5:80", tcp_flags::SYN);
    let sock = resolver.lookup_v4_socket(&syn, &eth0()).unwrap();
    assert!(Arc::ptr_eq(&*sock, &listener));
}

/// Time exceeded for a datagram this host sent resolves to the sender
#[test]
fn test_icmp_time_exceeded_resolves_sender() {
    let mut table = InetSocketTable::new();
    let sender = table.insert(
        SocketEntry::new(L4Protocol::Udp, addr("10.0.0.5:5000"), SocketState::Established)
            .with_remote(addr("203.0.113.9:53")),
    );
    let resolver = SocketResolver::new(table, NoConnTrack);

    let original = udp4("10.0.0.5:5000", "203.0.113.9:53");
    let error = icmp4_error(Ipv4Addr::new(198, 51, 100, 254), IcmpType::TimeExceeded, &original);

    let sock = resolver.lookup_v4_socket(&error, &eth0()).unwrap();
    assert!(Arc::ptr_eq(&*sock, &sender));
}

/// Non-first fragment: the walker stops at the fragment header and the
/// table is never consulted
#[test]
fn test_non_initial_fragment_after_hop_by_hop() {
    let packet = Ipv6Builder::new()
        .src_addr("2001:db8::9".parse().unwrap())
        .dst_addr("2001:db8::5".parse().unwrap())
        .hop_by_hop()
        .fragment(185, false)
        .next_header(nexthdr::TCP)
        .build();

    let location = find_header(&packet, HeaderTarget::AnyTransport).unwrap();
    assert_eq!(location.protocol, nexthdr::TCP);
    assert_ne!(location.fragment_offset, 0);
    assert_eq!(location.offset, 48);

    let table = CountingTable::answering(SocketState::Listen, "2001:db8::5".parse().unwrap());
    let resolver = SocketResolver::new(&table, NoConnTrack);
    assert!(resolver.lookup_v6_socket(&packet, &eth0()).is_none());
    assert_eq!(table.lookups.get(), 0);
}

/// Reply to a source-NATed connection is traced back to the pre-NAT socket
#[test]
fn test_snat_reply_rewritten_to_original_source() {
    let mut table = InetSocketTable::new();
    let server = table.insert(
        SocketEntry::new(L4Protocol::Tcp, addr("198.51.100.1:443"), SocketState::Established)
            .with_remote(addr("203.0.113.9:51000")),
    );

    let mut conntrack = ConnTrackTable::new();
    conntrack.insert(ConnEntry::with_reply(
        ConnTuple::new(L4Protocol::Tcp, addr("198.51.100.1:443"), addr("203.0.113.9:51000")),
        ConnTuple::new(L4Protocol::Tcp, addr("203.0.113.9:51000"), addr("192.0.2.1:8443")),
        ConnStatus::SEEN_REPLY | ConnStatus::ASSURED | ConnStatus::SRC_NAT | ConnStatus::SRC_NAT_DONE,
    ));
    let resolver = SocketResolver::new(table, conntrack);

    let ack = tcp4("203.0.113.9:51000", "192.0.2.1:8443", tcp_flags::ACK);
    let sock = resolver.lookup_v4_socket(&ack, &eth0()).unwrap();
    assert!(Arc::ptr_eq(&*sock, &server));
    drop(sock);
    assert_eq!(resolver.metrics().nat_rewrites.get(), 1);
}

#[test]
fn test_icmp_error_for_natted_flow() {
    let mut table = InetSocketTable::new();
    let client = table.insert(
        SocketEntry::new(L4Protocol::Udp, addr("10.0.0.5:5000"), SocketState::Established)
            .with_remote(addr("8.8.8.8:53")),
    );
    let resolver = SocketResolver::new(table, snat_udp_flow());

    // The router saw the post-NAT datagram
    let quoted = udp4("192.0.2.1:40000", "8.8.8.8:53");
    let error = icmp4_error(
        Ipv4Addr::new(198, 51, 100, 254),
        IcmpType::DestinationUnreachable,
        &quoted,
    );

    let sock = resolver.lookup_v4_socket(&error, &eth0()).unwrap();
    assert!(Arc::ptr_eq(&*sock, &client));
}

#[test]
fn test_natted_reply_without_conntrack_misses() {
    let mut table = InetSocketTable::new();
    table.insert(
        SocketEntry::new(L4Protocol::Udp, addr("10.0.0.5:5000"), SocketState::Established)
            .with_remote(addr("8.8.8.8:53")),
    );
    let resolver = SocketResolver::new(table, NoConnTrack);

    let reply = udp4("8.8.8.8:53", "192.0.2.1:40000");
    assert!(resolver.lookup_v4_socket(&reply, &eth0()).is_none());
    assert_eq!(resolver.metrics().misses.get(), 1);
}

#[test]
fn test_icmpv6_packet_too_big_resolves_sender() {
    let mut table = InetSocketTable::new();
    let sender = table.insert(
        SocketEntry::new(L4Protocol::Udp, addr("[2001:db8::5]:5000"), SocketState::Established)
            .with_remote(addr("[2001:db8::9]:53")),
    );
    let resolver = SocketResolver::new(table, NoConnTrack);

    let original = udp6("[2001:db8::5]:5000", "[2001:db8::9]:53");
    let error = icmp6_error(
        "2001:db8::fe".parse().unwrap(),
        "2001:db8::5".parse().unwrap(),
        &original,
    );

    let sock = resolver.lookup_v6_socket(&error, &eth0()).unwrap();
    assert!(Arc::ptr_eq(&*sock, &sender));
}

#[test]
fn test_tcp_mode_selects_listener_or_established() {
    let mut table = InetSocketTable::new();
    let listener = table.insert(SocketEntry::new(
        L4Protocol::Tcp,
        addr("10.0.0.5:22"),
        SocketState::Listen,
    ));
    let session = table.insert(
        SocketEntry::new(L4Protocol::Tcp, addr("10.0.0.5:22"), SocketState::Established)
            .with_remote(addr("203.0.113.9:40000")),
    );
    let resolver = SocketResolver::new(table, NoConnTrack);
    let ack = tcp4("203.0.113.9:40000", "10.0.0.5:22", tcp_flags::ACK);

    let sock = resolver.lookup_v4_socket(&ack, &eth0()).unwrap();
    assert!(Arc::ptr_eq(&*sock, &session));
    drop(sock);

    let sock = resolver
        .lookup_v4_socket_with_mode(&ack, &eth0(), LookupMode::ListenerOnly)
        .unwrap();
    assert!(Arc::ptr_eq(&*sock, &listener));
    drop(sock);

    let other = tcp4("203.0.113.9:40001", "10.0.0.5:22", tcp_flags::ACK);
    assert!(resolver
        .lookup_v4_socket_with_mode(&other, &eth0(), LookupMode::EstablishedOnly)
        .is_none());
}

#[test]
fn test_udp_mode_filter_releases_rejected_socket() {
    let mut table = InetSocketTable::new();
    let server = table.insert(SocketEntry::new(
        L4Protocol::Udp,
        addr("10.0.0.5:53"),
        SocketState::Close,
    ));
    let resolver = SocketResolver::new(table, NoConnTrack);
    let query = udp4("203.0.113.9:40000", "10.0.0.5:53");

    let sock = resolver
        .lookup_v4_socket_with_mode(&query, &eth0(), LookupMode::ListenerOnly)
        .unwrap();
    assert!(Arc::ptr_eq(&*sock, &server));
    drop(sock);

    assert!(resolver
        .lookup_v4_socket_with_mode(&query, &eth0(), LookupMode::EstablishedOnly)
        .is_none());
    assert_eq!(server.refcnt(), 1);
    assert_eq!(resolver.metrics().filtered.get(), 1);
}

#[test]
fn test_wildcard_bound_socket_rejected_and_released() {
    let table = CountingTable::answering(SocketState::Listen, IpAddr::V4(Ipv4Addr::UNSPECIFIED));
    let resolver = SocketResolver::new(&table, NoConnTrack);

    let syn = tcp4("203.0.113.9:51000", "10.0.0.5:80", tcp_flags::SYN);
    assert!(resolver.lookup_v4_socket(&syn, &eth0()).is_none());
    assert_eq!(table.lookups.get(), 1);
    assert_eq!(table.releases.get(), 1);
}

#[test]
fn test_wildcard_time_wait_is_returned() {
    let table = CountingTable::answering(SocketState::TimeWait, IpAddr::V6(Ipv6Addr::UNSPECIFIED));
    let resolver = SocketResolver::new(&table, NoConnTrack);

    let fin = tcp6("[2001:db8::9]:51000", "[2001:db8::5]:80", tcp_flags::FIN);
    let sock = resolver.lookup_v6_socket(&fin, &eth0()).unwrap();
    assert_eq!(sock.state, SocketState::TimeWait);
    assert_eq!(
        table.last_query.get(),
        Some((addr("[2001:db8::5]:80"), Some(addr("[2001:db8::9]:51000"))))
    );
    drop(sock);
    assert_eq!(table.releases.get(), 1);
}

#[test]
fn test_returned_reference_outlives_guard_with_into_inner() {
    let table = CountingTable::answering(SocketState::Listen, "10.0.0.5".parse().unwrap());
    let resolver = SocketResolver::new(&table, NoConnTrack);

    let syn = tcp4("203.0.113.9:51000", "10.0.0.5:80", tcp_flags::SYN);
    let sock = resolver.lookup_v4_socket(&syn, &eth0()).unwrap().into_inner();
    assert_eq!(sock.state, SocketState::Listen);
    assert_eq!(table.releases.get(), 0);
}

/// Nothing that fails extraction ever reaches the socket table
#[test]
fn test_rejected_packets_never_reach_table() {
    let table = CountingTable::answering(SocketState::Listen, "10.0.0.5".parse().unwrap());
    let resolver = SocketResolver::new(&table, NoConnTrack);

    // Truncated IPv4 header
    assert!(resolver.lookup_v4_socket(&[0x45, 0, 0, 20], &eth0()).is_none());

    // ICMP echo request carries no quoted datagram
    let echo = icmp4_error(
        Ipv4Addr::new(203, 0, 113, 9),
        IcmpType::EchoRequest,
        &udp4("10.0.0.5:5000", "203.0.113.9:53"),
    );
    assert!(resolver.lookup_v4_socket(&echo, &eth0()).is_none());

    // Error quoting a datagram truncated before its ports
    let quoted = udp4("10.0.0.5:5000", "203.0.113.9:53");
    let error = icmp4_error(Ipv4Addr::new(198, 51, 100, 254), IcmpType::TimeExceeded, &quoted[..22]);
    assert!(resolver.lookup_v4_socket(&error, &eth0()).is_none());

    // Extension header running past the end of the packet
    let mut broken = Ipv6Builder::new()
        .destination_options()
        .next_header(nexthdr::UDP)
        .build();
    broken.truncate(44);
    assert!(resolver.lookup_v6_socket(&broken, &eth0()).is_none());

    // No upper-layer header at all
    let empty = Ipv6Builder::new().next_header(nexthdr::NONE).build();
    assert!(resolver.lookup_v6_socket(&empty, &eth0()).is_none());

    assert_eq!(table.lookups.get(), 0);
    let metrics = resolver.metrics();
    assert_eq!(metrics.not_extractable.get(), 4);
    assert_eq!(metrics.malformed.get(), 1);
}
