//! TCP (RFC 793) and UDP (RFC 768) port fields
//!
//! Both protocols start with source port then destination port, so a
//! single 4-byte read serves either.

use super::view::PacketView;

/// Bytes needed to read both ports
pub const PORTS_SIZE: usize = 4;

/// Source and destination port of a TCP or UDP header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ports {
    pub source: u16,
    pub dest: u16,
}

impl Ports {
    /// Read the port pair of the transport header at `offset`
    pub fn read(view: &PacketView<'_>, offset: usize) -> Option<Self> {
        let bytes = view.read::<PORTS_SIZE>(offset)?;
        Some(Self {
            source: u16::from_be_bytes([bytes[0], bytes[1]]),
            dest: u16::from_be_bytes([bytes[2], bytes[3]]),
        })
    }
}

/// Minimal UDP header (checksum left zero)
pub fn build_udp(src_port: u16, dst_port: u16, payload: &[u8]) -> Vec<u8> {
    let length = (8 + payload.len()) as u16;
    let mut buffer = Vec::with_capacity(length as usize);
    buffer.extend_from_slice(&src_port.to_be_bytes());
    buffer.extend_from_slice(&dst_port.to_be_bytes());
    buffer.extend_from_slice(&length.to_be_bytes());
    buffer.extend_from_slice(&[0, 0]);
    buffer.extend_from_slice(payload);
    buffer
}

/// Minimal 20-byte TCP header with the given flag byte (checksum left zero)
pub fn build_tcp(src_port: u16, dst_port: u16, flags: u8) -> Vec<u8> {
    let mut buffer = vec![0u8; 20];
    buffer[0..2].copy_from_slice(&src_port.to_be_bytes());
    buffer[2..4].copy_from_slice(&dst_port.to_be_bytes());
    // Data offset = 5 words
    buffer[12] = 5 << 4;
    buffer[13] = flags;
    buffer[14..16].copy_from_slice(&65535u16.to_be_bytes());
    buffer
}

/// TCP flag bits
pub mod tcp_flags {
    pub const FIN: u8 = 0x01;
    pub const SYN: u8 = 0x02;
    pub const RST: u8 = 0x04;
    pub const ACK: u8 = 0x10;
}
