//! IPv6 extension header walker
//!
//! Locates a header inside an IPv6 packet by following the next-header
//! chain from the fixed header. The walk is a small state machine driven by
//! [`ExtCursor::step`]; each step consumes exactly one extension header.

use crate::error::WalkError;
use crate::protocol::ipv6::{self, fragment_offset, is_terminal_header, nexthdr, OptHeader};
use crate::protocol::PacketView;

/// What the walk is looking for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderTarget {
    /// The first header that is not an extension header
    AnyTransport,
    /// A specific header type
    Exact(u8),
}

impl HeaderTarget {
    fn matches(self, next_header: u8) -> bool {
        matches!(self, HeaderTarget::Exact(kind) if kind == next_header)
    }
}

/// Where the walk stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeaderLocation {
    /// Start of the matched header. For a non-initial fragment this is the
    /// fragment header itself; nothing beyond it is meaningful.
    pub offset: usize,
    /// Header type at termination
    pub protocol: u8,
    /// Masked fragment offset, nonzero only for non-initial fragments
    pub fragment_offset: u16,
}

/// Position within the extension header chain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtCursor {
    pub offset: usize,
    pub next_header: u8,
    pub remaining: usize,
}

/// Walk states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalkState {
    Scanning,
    /// A non-initial fragment header was read at the cursor
    Fragment { next_header: u8, fragment_offset: u16 },
    Terminated(HeaderLocation),
    NotFound,
    Malformed,
}

impl ExtCursor {
    /// Cursor at the first header after the fixed IPv6 header
    pub fn new(view: &PacketView<'_>) -> Result<Self, WalkError> {
        if view.len() < ipv6::HEADER_SIZE {
            return Err(WalkError::Malformed);
        }
        let next_header = view.read_u8(6).ok_or(WalkError::Malformed)?;

        Ok(Self {
            offset: ipv6::HEADER_SIZE,
            next_header,
            remaining: view.remaining(ipv6::HEADER_SIZE),
        })
    }

    fn location(&self, fragment_offset: u16) -> HeaderLocation {
        HeaderLocation {
            offset: self.offset,
            protocol: self.next_header,
            fragment_offset,
        }
    }

    /// Examine the header under the cursor and advance past it if the walk
    /// has to continue.
    pub fn step(&mut self, view: &PacketView<'_>, target: HeaderTarget) -> WalkState {
        if target.matches(self.next_header) {
            return WalkState::Terminated(self.location(0));
        }

        if is_terminal_header(self.next_header) {
            return match target {
                HeaderTarget::AnyTransport => WalkState::Terminated(self.location(0)),
                HeaderTarget::Exact(_) => WalkState::NotFound,
            };
        }

        let Some(hdr) = OptHeader::read(view, self.offset) else {
            return WalkState::Malformed;
        };

        if self.next_header == nexthdr::FRAGMENT {
            let Some(frag_off) = fragment_offset(view, self.offset) else {
                return WalkState::Malformed;
            };
            if frag_off != 0 {
                return WalkState::Fragment {
                    next_header: hdr.next_header,
                    fragment_offset: frag_off,
                };
            }
        }

        let hdr_len = hdr.skip_len(self.next_header);
        if hdr_len > self.remaining {
            return WalkState::Malformed;
        }

        self.offset += hdr_len;
        self.remaining -= hdr_len;
        self.next_header = hdr.next_header;
        WalkState::Scanning
    }
}

/// Find `target` in the IPv6 packet starting at the fixed header.
pub fn find_header(packet: &[u8], target: HeaderTarget) -> Result<HeaderLocation, WalkError> {
    let view = PacketView::new(packet);
    let mut cursor = ExtCursor::new(&view)?;
    let mut state = WalkState::Scanning;

    loop {
        state = match state {
            WalkState::Scanning => cursor.step(&view, target),
            WalkState::Fragment {
                next_header,
                fragment_offset,
            } => {
                // Only the upper-layer type survives a non-initial fragment;
                // an extension header behind it cannot be walked.
                if target == HeaderTarget::AnyTransport && is_terminal_header(next_header) {
                    WalkState::Terminated(HeaderLocation {
                        offset: cursor.offset,
                        protocol: next_header,
                        fragment_offset,
                    })
                } else {
                    WalkState::NotFound
                }
            }
            WalkState::Terminated(location) => return Ok(location),
            WalkState::NotFound => return Err(WalkError::NotFound),
            WalkState::Malformed => return Err(WalkError::Malformed),
        };
    }
}
