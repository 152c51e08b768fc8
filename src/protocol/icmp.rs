//! ICMP (Internet Control Message Protocol) - RFC 792

use crate::error::HeaderError;

/// ICMP header size (type, code, checksum, 4 bytes rest-of-header)
pub const ICMP_HEADER_SIZE: usize = 8;

/// ICMP message types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum IcmpType {
    EchoReply = 0,
    DestinationUnreachable = 3,
    SourceQuench = 4,
    Redirect = 5,
    EchoRequest = 8,
    TimeExceeded = 11,
    ParameterProblem = 12,
}

impl IcmpType {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(IcmpType::EchoReply),
            3 => Some(IcmpType::DestinationUnreachable),
            4 => Some(IcmpType::SourceQuench),
            5 => Some(IcmpType::Redirect),
            8 => Some(IcmpType::EchoRequest),
            11 => Some(IcmpType::TimeExceeded),
            12 => Some(IcmpType::ParameterProblem),
            _ => None,
        }
    }

    /// Error messages that quote the offending datagram after the header
    pub fn quotes_datagram(self) -> bool {
        matches!(
            self,
            IcmpType::DestinationUnreachable
                | IcmpType::SourceQuench
                | IcmpType::Redirect
                | IcmpType::TimeExceeded
                | IcmpType::ParameterProblem
        )
    }
}

/// Parsed ICMP message
#[derive(Debug)]
pub struct IcmpPacket<'a> {
    buffer: &'a [u8],
}

impl<'a> IcmpPacket<'a> {
    pub fn parse(buffer: &'a [u8]) -> Result<Self, HeaderError> {
        if buffer.len() < ICMP_HEADER_SIZE {
            return Err(HeaderError::Truncated);
        }

        Ok(Self { buffer })
    }

    pub fn icmp_type(&self) -> u8 {
        self.buffer[0]
    }

    /// Get the typed ICMP message type
    pub fn message_type(&self) -> Option<IcmpType> {
        IcmpType::from_u8(self.icmp_type())
    }

    /// Whether the message carries a quoted datagram
    pub fn is_error(&self) -> bool {
        self.message_type().is_some_and(IcmpType::quotes_datagram)
    }

    /// For error messages: the original IP header + leading payload bytes
    pub fn original_datagram(&self) -> &'a [u8] {
        &self.buffer[ICMP_HEADER_SIZE..]
    }
}

/// Build an ICMP error message quoting `original`
pub fn build_error(icmp_type: IcmpType, code: u8, original: &[u8]) -> Vec<u8> {
    let mut packet = vec![0u8; ICMP_HEADER_SIZE + original.len()];
    packet[0] = icmp_type as u8;
    packet[1] = code;
    packet[ICMP_HEADER_SIZE..].copy_from_slice(original);

    let sum = icmp_checksum(&packet);
    packet[2..4].copy_from_slice(&sum.to_be_bytes());
    packet
}

/// Calculate ICMP checksum
pub fn icmp_checksum(data: &[u8]) -> u16 {
    let mut sum: u32 = 0;

    for i in (0..data.len()).step_by(2) {
        let word = if i + 1 < data.len() {
            u16::from_be_bytes([data[i], data[i + 1]])
        } else {
            u16::from_be_bytes([data[i], 0])
        };
        sum = sum.wrapping_add(word as u32);
    }

    while sum >> 16 != 0 {
        sum = (sum & 0xFFFF) + (sum >> 16);
    }

    !(sum as u16)
}
