//! Connection tracking oracle
//!
//! The lookup pipeline only reads connection tracking state: which flow a
//! packet belongs to, in which direction, and whether source NAT was applied.
//! [`ConnTrack`] is that query contract; [`ConnTrackTable`] is an in-memory
//! table implementing it for tests, configuration-driven runs and the CLI.

use super::extract::{extract_v4, extract_v6};
use super::tuple::{Extracted, L4Protocol, TupleAddr};
use crate::error::ExtractError;
use bitflags::bitflags;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

bitflags! {
    /// Connection status bits, numbered as in the kernel
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ConnStatus: u32 {
        const EXPECTED = 1 << 0;
        const SEEN_REPLY = 1 << 1;
        const ASSURED = 1 << 2;
        const CONFIRMED = 1 << 3;
        const SRC_NAT = 1 << 4;
        const DST_NAT = 1 << 5;
        const SEQ_ADJUST = 1 << 6;
        const SRC_NAT_DONE = 1 << 7;
        const DST_NAT_DONE = 1 << 8;
        const DYING = 1 << 9;
        const FIXED_TIMEOUT = 1 << 10;
        const UNTRACKED = 1 << 12;
    }
}

impl ConnStatus {
    /// Parse a lowercase status name as used in configuration files
    pub fn from_config_name(name: &str) -> Option<Self> {
        let flag = match name {
            "expected" => ConnStatus::EXPECTED,
            "seen_reply" => ConnStatus::SEEN_REPLY,
            "assured" => ConnStatus::ASSURED,
            "confirmed" => ConnStatus::CONFIRMED,
            "src_nat" => ConnStatus::SRC_NAT,
            "dst_nat" => ConnStatus::DST_NAT,
            "seq_adjust" => ConnStatus::SEQ_ADJUST,
            "src_nat_done" => ConnStatus::SRC_NAT_DONE,
            "dst_nat_done" => ConnStatus::DST_NAT_DONE,
            "dying" => ConnStatus::DYING,
            "fixed_timeout" => ConnStatus::FIXED_TIMEOUT,
            "untracked" => ConnStatus::UNTRACKED,
            _ => return None,
        };
        Some(flag)
    }
}

/// One direction of a tracked flow, as seen on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnTuple {
    pub protocol: L4Protocol,
    pub src: SocketAddr,
    pub dst: SocketAddr,
}

impl ConnTuple {
    pub fn new(protocol: L4Protocol, src: SocketAddr, dst: SocketAddr) -> Self {
        Self { protocol, src, dst }
    }

    /// Create the reverse tuple (swap src/dst)
    pub fn reverse(&self) -> Self {
        Self {
            protocol: self.protocol,
            src: self.dst,
            dst: self.src,
        }
    }
}

/// Tracked connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnEntry {
    /// Original direction tuple
    pub original: ConnTuple,
    /// Reply direction tuple; differs from `original.reverse()` under NAT
    pub reply: ConnTuple,
    pub status: ConnStatus,
}

impl ConnEntry {
    /// Entry for a flow without address translation
    pub fn new(original: ConnTuple, status: ConnStatus) -> Self {
        Self {
            original,
            reply: original.reverse(),
            status,
        }
    }

    /// Entry whose reply direction was rewritten by NAT
    pub fn with_reply(original: ConnTuple, reply: ConnTuple, status: ConnStatus) -> Self {
        Self {
            original,
            reply,
            status,
        }
    }

    pub fn is_untracked(&self) -> bool {
        self.status.contains(ConnStatus::UNTRACKED)
    }
}

/// How a packet relates to its tracked connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnInfo {
    Established = 0,
    Related = 1,
    New = 2,
    EstablishedReply = 3,
    RelatedReply = 4,
}

/// Result of a connection tracking query
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnMatch {
    pub entry: ConnEntry,
    pub info: ConnInfo,
}

/// Read-only connection tracking query contract
pub trait ConnTrack {
    /// Find the connection `packet` (a raw IP packet) belongs to.
    fn lookup_for_packet(&self, packet: &[u8]) -> Option<ConnMatch>;
}

impl<T: ConnTrack + ?Sized> ConnTrack for &T {
    fn lookup_for_packet(&self, packet: &[u8]) -> Option<ConnMatch> {
        (**self).lookup_for_packet(packet)
    }
}

impl<T: ConnTrack + ?Sized> ConnTrack for Arc<T> {
    fn lookup_for_packet(&self, packet: &[u8]) -> Option<ConnMatch> {
        (**self).lookup_for_packet(packet)
    }
}

/// Oracle with no tracked connections
#[derive(Debug, Clone, Copy, Default)]
pub struct NoConnTrack;

impl ConnTrack for NoConnTrack {
    fn lookup_for_packet(&self, _packet: &[u8]) -> Option<ConnMatch> {
        None
    }
}

/// Connection tracking table
#[derive(Debug, Default)]
pub struct ConnTrackTable {
    /// Original direction -> Entry
    entries: HashMap<ConnTuple, ConnEntry>,
    /// Reply direction -> Original direction tuple (reverse lookup)
    reply_map: HashMap<ConnTuple, ConnTuple>,
}

impl ConnTrackTable {
    /// Create a new connection tracking table
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a connection, replacing any entry with the same original tuple
    pub fn insert(&mut self, entry: ConnEntry) {
        if let Some(old) = self.entries.insert(entry.original, entry) {
            self.reply_map.remove(&old.reply);
        }
        self.reply_map.insert(entry.reply, entry.original);
    }

    /// Get number of tracked connections
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if table is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Classify a wire tuple against the table.
    ///
    /// `related` marks a tuple quoted by an ICMP error. The error travels
    /// against the quoted packet, so the quoted tuple is reversed before
    /// matching and the direction of the match is the error's direction.
    pub fn classify(&self, tuple: &ConnTuple, related: bool) -> Option<ConnMatch> {
        let key = if related { tuple.reverse() } else { *tuple };

        if let Some(entry) = self.entries.get(&key) {
            let info = if related {
                ConnInfo::Related
            } else if entry.status.contains(ConnStatus::SEEN_REPLY) {
                ConnInfo::Established
            } else {
                ConnInfo::New
            };
            return Some(ConnMatch {
                entry: *entry,
                info,
            });
        }

        let original = self.reply_map.get(&key)?;
        let entry = self.entries.get(original)?;
        let info = if related {
            ConnInfo::RelatedReply
        } else {
            ConnInfo::EstablishedReply
        };
        Some(ConnMatch {
            entry: *entry,
            info,
        })
    }

    fn classify_extracted<A: TupleAddr>(
        &self,
        extracted: Result<Extracted<A>, ExtractError>,
    ) -> Option<ConnMatch> {
        let Extracted { tuple, via_icmp } = extracted.ok()?;
        let wire = if via_icmp {
            // Quoted packet was sent from the local half
            ConnTuple::new(tuple.protocol, tuple.local(), tuple.remote())
        } else {
            ConnTuple::new(tuple.protocol, tuple.remote(), tuple.local())
        };
        self.classify(&wire, via_icmp)
    }
}

impl ConnTrack for ConnTrackTable {
    fn lookup_for_packet(&self, packet: &[u8]) -> Option<ConnMatch> {
        match packet.first()? >> 4 {
            4 => self.classify_extracted(extract_v4(packet)),
            6 => self.classify_extracted(extract_v6(packet)),
            _ => None,
        }
    }
}
