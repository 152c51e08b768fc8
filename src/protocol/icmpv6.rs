//! ICMPv6 protocol - RFC 4443

use crate::error::HeaderError;

/// ICMPv6 header size as laid out in front of a quoted packet
pub const HEADER_SIZE: usize = 8;

/// Informational messages have the high bit of the type set
pub const INFO_MSG_MASK: u8 = 0x80;

/// ICMPv6 message types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Icmpv6Type {
    DestinationUnreachable = 1,
    PacketTooBig = 2,
    TimeExceeded = 3,
    ParameterProblem = 4,
    EchoRequest = 128,
    EchoReply = 129,
    NeighborSolicitation = 135,
}

impl Icmpv6Type {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(Icmpv6Type::DestinationUnreachable),
            2 => Some(Icmpv6Type::PacketTooBig),
            3 => Some(Icmpv6Type::TimeExceeded),
            4 => Some(Icmpv6Type::ParameterProblem),
            128 => Some(Icmpv6Type::EchoRequest),
            129 => Some(Icmpv6Type::EchoReply),
            135 => Some(Icmpv6Type::NeighborSolicitation),
            _ => None,
        }
    }
}

/// Parsed ICMPv6 header (zero-copy reference)
#[derive(Debug)]
pub struct Icmpv6Packet<'a> {
    buffer: &'a [u8],
}

impl<'a> Icmpv6Packet<'a> {
    pub fn parse(buffer: &'a [u8]) -> Result<Self, HeaderError> {
        if buffer.len() < HEADER_SIZE {
            return Err(HeaderError::Truncated);
        }

        Ok(Self { buffer })
    }

    /// Message type
    pub fn msg_type(&self) -> u8 {
        self.buffer[0]
    }

    /// Informational message (echo, NDP, ...); these never quote a packet
    pub fn is_informational(&self) -> bool {
        self.msg_type() & INFO_MSG_MASK != 0
    }

    /// Quoted packet of an error message
    pub fn invoking_packet(&self) -> &'a [u8] {
        &self.buffer[HEADER_SIZE..]
    }
}

/// Build an ICMPv6 error message quoting `original` (checksum left zero)
pub fn build_error(msg_type: Icmpv6Type, code: u8, original: &[u8]) -> Vec<u8> {
    let mut packet = vec![0u8; HEADER_SIZE + original.len()];
    packet[0] = msg_type as u8;
    packet[1] = code;
    packet[HEADER_SIZE..].copy_from_slice(original);
    packet
}
