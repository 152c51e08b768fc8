//! IPv6 protocol - RFC 8200

use super::view::PacketView;
use crate::error::{HeaderError, WalkError};
use std::net::Ipv6Addr;

/// IPv6 header size (fixed, unlike IPv4)
pub const HEADER_SIZE: usize = 40;

/// Fragment header size (fixed)
pub const FRAGMENT_HEADER_SIZE: usize = 8;

/// Next Header values (same numbering as IPv4 protocol numbers)
pub mod nexthdr {
    pub const HOP_BY_HOP: u8 = 0;
    pub const TCP: u8 = 6;
    pub const UDP: u8 = 17;
    pub const ROUTING: u8 = 43;
    pub const FRAGMENT: u8 = 44;
    pub const ESP: u8 = 50;
    pub const AUTH: u8 = 51;
    pub const ICMPV6: u8 = 58;
    pub const NONE: u8 = 59;
    pub const DEST_OPTIONS: u8 = 60;
}

/// Whether `next_header` names an extension header.
///
/// `NONE` counts as one so that walkers stop on it explicitly; ESP does
/// not, since nothing after it is readable.
pub fn is_extension_header(next_header: u8) -> bool {
    matches!(
        next_header,
        nexthdr::HOP_BY_HOP
            | nexthdr::ROUTING
            | nexthdr::FRAGMENT
            | nexthdr::AUTH
            | nexthdr::NONE
            | nexthdr::DEST_OPTIONS
    )
}

/// Whether a walk must stop at `next_header`.
pub fn is_terminal_header(next_header: u8) -> bool {
    !is_extension_header(next_header) || next_header == nexthdr::NONE
}

/// The two leading bytes every extension header shares
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OptHeader {
    pub next_header: u8,
    pub hdr_len: u8,
}

impl OptHeader {
    pub fn read(view: &PacketView<'_>, offset: usize) -> Option<Self> {
        let [next_header, hdr_len] = view.read::<2>(offset)?;
        Some(Self {
            next_header,
            hdr_len,
        })
    }

    /// Bytes to skip for a header of type `kind`.
    ///
    /// AH counts 4-octet units minus two; everything else counts 8-octet
    /// units minus one. Fragment headers are always 8 bytes.
    pub fn skip_len(&self, kind: u8) -> usize {
        match kind {
            nexthdr::FRAGMENT => FRAGMENT_HEADER_SIZE,
            nexthdr::AUTH => (self.hdr_len as usize + 2) << 2,
            _ => (self.hdr_len as usize + 1) << 3,
        }
    }
}

/// Read the fragment offset field of the fragment header at `offset`,
/// with the flag bits masked off.
pub fn fragment_offset(view: &PacketView<'_>, offset: usize) -> Option<u16> {
    view.read_u16(offset + 2).map(|field| field & !0x7)
}

/// Skip extension headers starting at `start`, where `next_header` is the
/// type of the header found there.
///
/// Returns the offset of the first non-extension header and its type. A
/// non-initial fragment stops the skip on the fragment header itself, so
/// the returned type is `FRAGMENT`.
pub fn skip_extension_headers(
    view: &PacketView<'_>,
    mut start: usize,
    mut next_header: u8,
) -> Result<(usize, u8), WalkError> {
    while is_extension_header(next_header) {
        if next_header == nexthdr::NONE {
            return Err(WalkError::NotFound);
        }

        let hdr = OptHeader::read(view, start).ok_or(WalkError::Malformed)?;

        if next_header == nexthdr::FRAGMENT {
            let frag_off = fragment_offset(view, start).ok_or(WalkError::Malformed)?;
            if frag_off != 0 {
                break;
            }
        }

        start += hdr.skip_len(next_header);
        next_header = hdr.next_header;
    }

    Ok((start, next_header))
}

/// Parsed IPv6 header (zero-copy reference)
#[derive(Debug)]
pub struct Ipv6Header<'a> {
    buffer: &'a [u8],
}

impl<'a> Ipv6Header<'a> {
    pub fn parse(buffer: &'a [u8]) -> Result<Self, HeaderError> {
        if buffer.len() < HEADER_SIZE {
            return Err(HeaderError::Truncated);
        }

        let version = buffer[0] >> 4;
        if version != 6 {
            return Err(HeaderError::BadVersion);
        }

        Ok(Self { buffer })
    }

    /// Next Header (first extension header or upper-layer protocol)
    pub fn next_header(&self) -> u8 {
        self.buffer[6]
    }

    pub fn src_addr(&self) -> Ipv6Addr {
        let mut bytes = [0u8; 16];
        bytes.copy_from_slice(&self.buffer[8..24]);
        Ipv6Addr::from(bytes)
    }

    pub fn dst_addr(&self) -> Ipv6Addr {
        let mut bytes = [0u8; 16];
        bytes.copy_from_slice(&self.buffer[24..40]);
        Ipv6Addr::from(bytes)
    }

    pub fn header_len(&self) -> usize {
        HEADER_SIZE
    }
}

/// Builder for constructing IPv6 packets, optionally with an extension
/// header chain in front of the payload
#[derive(Debug, Clone)]
pub struct Ipv6Builder {
    next_header: u8,
    hop_limit: u8,
    src_addr: Ipv6Addr,
    dst_addr: Ipv6Addr,
    extensions: Vec<(u8, Vec<u8>)>,
    payload: Vec<u8>,
}

impl Ipv6Builder {
    pub fn new() -> Self {
        Self {
            next_header: nexthdr::NONE,
            hop_limit: 64,
            src_addr: Ipv6Addr::UNSPECIFIED,
            dst_addr: Ipv6Addr::UNSPECIFIED,
            extensions: Vec::new(),
            payload: Vec::new(),
        }
    }

    /// Upper-layer protocol following the last extension header
    pub fn next_header(mut self, nh: u8) -> Self {
        self.next_header = nh;
        self
    }

    pub fn hop_limit(mut self, hl: u8) -> Self {
        self.hop_limit = hl;
        self
    }

    pub fn src_addr(mut self, addr: Ipv6Addr) -> Self {
        self.src_addr = addr;
        self
    }

    pub fn dst_addr(mut self, addr: Ipv6Addr) -> Self {
        self.dst_addr = addr;
        self
    }

    /// Hop-by-Hop options header carrying a single PadN option
    pub fn hop_by_hop(self) -> Self {
        self.extension(nexthdr::HOP_BY_HOP, &[0, 0, 1, 4, 0, 0, 0, 0])
    }

    /// Type 0 routing header with no segments left
    pub fn routing(self) -> Self {
        self.extension(nexthdr::ROUTING, &[0, 0, 0, 0, 0, 0, 0, 0])
    }

    /// Destination options header carrying a single PadN option
    pub fn destination_options(self) -> Self {
        self.extension(nexthdr::DEST_OPTIONS, &[0, 0, 1, 4, 0, 0, 0, 0])
    }

    /// Fragment header; `offset` is in 8-octet units
    pub fn fragment(self, offset: u16, more: bool) -> Self {
        let field = (offset << 3) | more as u16;
        let [hi, lo] = field.to_be_bytes();
        self.extension(nexthdr::FRAGMENT, &[0, 0, hi, lo, 0, 0, 0x12, 0x34])
    }

    /// Authentication header with a 4-byte ICV (16 bytes total)
    pub fn authentication(self) -> Self {
        self.extension(
            nexthdr::AUTH,
            &[0, 2, 0, 0, 0, 0, 0, 1, 0, 0, 0, 1, 0, 0, 0, 0],
        )
    }

    /// Raw extension header. Byte 0 is overwritten with the chained
    /// next-header value at build time.
    pub fn extension(mut self, kind: u8, bytes: &[u8]) -> Self {
        self.extensions.push((kind, bytes.to_vec()));
        self
    }

    pub fn payload(mut self, payload: &[u8]) -> Self {
        self.payload = payload.to_vec();
        self
    }

    pub fn build(self) -> Vec<u8> {
        let ext_len: usize = self.extensions.iter().map(|(_, b)| b.len()).sum();
        let payload_length = (ext_len + self.payload.len()) as u16;
        let mut buffer = Vec::with_capacity(HEADER_SIZE + payload_length as usize);

        let first = self
            .extensions
            .first()
            .map(|(kind, _)| *kind)
            .unwrap_or(self.next_header);

        buffer.extend_from_slice(&[0x60, 0x00, 0x00, 0x00]);
        buffer.extend_from_slice(&payload_length.to_be_bytes());
        buffer.push(first);
        buffer.push(self.hop_limit);
        buffer.extend_from_slice(&self.src_addr.octets());
        buffer.extend_from_slice(&self.dst_addr.octets());

        for (i, (_, bytes)) in self.extensions.iter().enumerate() {
            let chained = self
                .extensions
                .get(i + 1)
                .map(|(kind, _)| *kind)
                .unwrap_or(self.next_header);
            let start = buffer.len();
            buffer.extend_from_slice(bytes);
            if let Some(b) = buffer.get_mut(start) {
                *b = chained;
            }
        }

        buffer.extend_from_slice(&self.payload);
        buffer
    }
}

impl Default for Ipv6Builder {
    fn default() -> Self {
        Self::new()
    }
}
