//! Transport tuple extraction
//!
//! Reads the tuple a packet belongs to straight from its TCP/UDP header,
//! or, for ICMP and ICMPv6 errors, from the datagram the error quotes. A
//! quoted datagram was sent by this host, so its source is the local half.

use super::exthdr::{find_header, HeaderTarget};
use super::tuple::{Extracted, L4Protocol, TupleV4, TupleV6};
use crate::error::ExtractError;
use crate::protocol::icmp::IcmpPacket;
use crate::protocol::icmpv6::Icmpv6Packet;
use crate::protocol::ipv4::{Ipv4Header, Protocol};
use crate::protocol::ipv6::{self, nexthdr, skip_extension_headers, Ipv6Header};
use crate::protocol::transport::Ports;
use crate::protocol::PacketView;
use std::net::{Ipv4Addr, Ipv6Addr};
use tracing::trace;

/// Extract the tuple of an IPv4 packet.
pub fn extract_v4(packet: &[u8]) -> Result<Extracted<Ipv4Addr>, ExtractError> {
    let ip = Ipv4Header::parse(packet)?;

    match Protocol::from_u8(ip.protocol()) {
        Some(Protocol::Tcp) | Some(Protocol::Udp) => {
            let protocol =
                L4Protocol::from_u8(ip.protocol()).ok_or(ExtractError::NotExtractable)?;
            let ports = Ports::read(&PacketView::new(packet), ip.header_len())
                .ok_or(ExtractError::NotExtractable)?;

            Ok(Extracted {
                tuple: TupleV4::new(
                    protocol,
                    ip.dst_addr(),
                    ports.dest,
                    ip.src_addr(),
                    ports.source,
                ),
                via_icmp: false,
            })
        }
        Some(Protocol::Icmp) => extract_icmp4(ip.payload()).map(|tuple| Extracted {
            tuple,
            via_icmp: true,
        }),
        _ => Err(ExtractError::NotExtractable),
    }
}

/// Extract the tuple quoted by an ICMP error. `message` starts at the
/// ICMP header.
pub fn extract_icmp4(message: &[u8]) -> Result<TupleV4, ExtractError> {
    let icmp = IcmpPacket::parse(message)?;
    if !icmp.is_error() {
        trace!(icmp_type = icmp.icmp_type(), "ICMP message quotes no datagram");
        return Err(ExtractError::NotExtractable);
    }

    let quoted = icmp.original_datagram();
    let inner = Ipv4Header::parse(quoted)?;
    let protocol = L4Protocol::from_u8(inner.protocol()).ok_or(ExtractError::NotExtractable)?;
    let ports = Ports::read(&PacketView::new(quoted), inner.header_len())
        .ok_or(ExtractError::NotExtractable)?;

    Ok(TupleV4::new(
        protocol,
        inner.src_addr(),
        ports.source,
        inner.dst_addr(),
        ports.dest,
    ))
}

/// Extract the tuple of an IPv6 packet.
pub fn extract_v6(packet: &[u8]) -> Result<Extracted<Ipv6Addr>, ExtractError> {
    let ip = Ipv6Header::parse(packet)?;
    let location = find_header(packet, HeaderTarget::AnyTransport)?;

    if location.fragment_offset != 0 {
        trace!(
            fragment_offset = location.fragment_offset,
            "non-initial fragment carries no transport header"
        );
        return Err(ExtractError::NotExtractable);
    }

    match location.protocol {
        nexthdr::TCP | nexthdr::UDP => {
            let protocol =
                L4Protocol::from_u8(location.protocol).ok_or(ExtractError::NotExtractable)?;
            let ports = Ports::read(&PacketView::new(packet), location.offset)
                .ok_or(ExtractError::NotExtractable)?;

            Ok(Extracted {
                tuple: TupleV6::new(
                    protocol,
                    ip.dst_addr(),
                    ports.dest,
                    ip.src_addr(),
                    ports.source,
                ),
                via_icmp: false,
            })
        }
        nexthdr::ICMPV6 => {
            let message = packet
                .get(location.offset..)
                .ok_or(ExtractError::NotExtractable)?;
            extract_icmp6(message).map(|tuple| Extracted {
                tuple,
                via_icmp: true,
            })
        }
        _ => Err(ExtractError::NotExtractable),
    }
}

/// Extract the tuple quoted by an ICMPv6 error. `message` starts at the
/// ICMPv6 header.
pub fn extract_icmp6(message: &[u8]) -> Result<TupleV6, ExtractError> {
    let icmp = Icmpv6Packet::parse(message)?;
    if icmp.is_informational() {
        trace!(icmp_type = icmp.msg_type(), "informational ICMPv6 message");
        return Err(ExtractError::NotExtractable);
    }

    let quoted = icmp.invoking_packet();
    let inner = Ipv6Header::parse(quoted)?;
    let view = PacketView::new(quoted);
    let (offset, next_header) =
        skip_extension_headers(&view, ipv6::HEADER_SIZE, inner.next_header())?;

    let protocol = L4Protocol::from_u8(next_header).ok_or(ExtractError::NotExtractable)?;
    let ports = Ports::read(&view, offset).ok_or(ExtractError::NotExtractable)?;

    Ok(TupleV6::new(
        protocol,
        inner.src_addr(),
        ports.source,
        inner.dst_addr(),
        ports.dest,
    ))
}
