//! Snapshot of the kernel socket tables from `/proc/net`.
//!
//! Each line after the header of `/proc/net/{tcp,tcp6,udp,udp6}` reads:
//!   sl  local_address rem_address st tx_queue:rx_queue ... uid timeout inode ...
//!
//! Addresses are hex dumps of the in-memory (network order) words printed
//! as native integers, so they are converted back with `to_ne_bytes`.

use crate::dataplane::{InetSocketTable, L4Protocol, SocketEntry, SocketState};
use crate::{Error, Result};
use std::io;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::path::Path;
use tracing::{debug, trace, warn};

/// Default location of the socket tables
pub const PROC_NET: &str = "/proc/net";

/// Files read and what they contain: (name, protocol, IPv6)
const TABLES: [(&str, L4Protocol, bool); 4] = [
    ("tcp", L4Protocol::Tcp, false),
    ("tcp6", L4Protocol::Tcp, true),
    ("udp", L4Protocol::Udp, false),
    ("udp6", L4Protocol::Udp, true),
];

/// Parse an IPv4 endpoint: "AABBCCDD:PORT"
pub fn parse_addr_v4(s: &str) -> Option<SocketAddr> {
    let (addr_hex, port_hex) = s.split_once(':')?;
    if addr_hex.len() != 8 {
        return None;
    }
    let raw = u32::from_str_radix(addr_hex, 16).ok()?;
    let port = u16::from_str_radix(port_hex, 16).ok()?;
    Some(SocketAddr::new(Ipv4Addr::from(raw.to_ne_bytes()).into(), port))
}

/// Parse an IPv6 endpoint: 32 hex chars (four native-order words) ":PORT"
pub fn parse_addr_v6(s: &str) -> Option<SocketAddr> {
    let (addr_hex, port_hex) = s.split_once(':')?;
    if addr_hex.len() != 32 {
        return None;
    }
    let port = u16::from_str_radix(port_hex, 16).ok()?;

    let mut octets = [0u8; 16];
    for (i, word) in octets.chunks_exact_mut(4).enumerate() {
        let chunk = addr_hex.get(i * 8..(i + 1) * 8)?;
        let raw = u32::from_str_radix(chunk, 16).ok()?;
        word.copy_from_slice(&raw.to_ne_bytes());
    }

    Some(SocketAddr::new(Ipv6Addr::from(octets).into(), port))
}

/// Parse one socket line; `None` for lines that do not describe a socket.
pub fn parse_line(line: &str, protocol: L4Protocol, ipv6: bool) -> Option<SocketEntry> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    if fields.len() < 10 {
        return None;
    }

    let parse_addr = if ipv6 { parse_addr_v6 } else { parse_addr_v4 };
    let local = parse_addr(fields[1])?;
    let remote = parse_addr(fields[2])?;
    let state = u8::from_str_radix(fields[3], 16)
        .ok()
        .and_then(SocketState::from_u8)?;
    let inode: u64 = fields[9].parse().ok()?;

    let mut entry = SocketEntry::new(protocol, local, state).with_inode(inode);
    if !(remote.ip().is_unspecified() && remote.port() == 0) {
        entry = entry.with_remote(remote);
    }
    Some(entry)
}

/// Parse the whole content of one table file (header line included).
pub fn parse_table(content: &str, protocol: L4Protocol, ipv6: bool) -> Vec<SocketEntry> {
    content
        .lines()
        .skip(1)
        .filter_map(|line| {
            let entry = parse_line(line, protocol, ipv6);
            if entry.is_none() {
                trace!(line, "skipping unparseable socket line");
            }
            entry
        })
        .collect()
}

/// Load all four tables under `root` into a new socket table.
///
/// A missing file (e.g. IPv6 disabled) is skipped; other I/O errors fail
/// the load.
pub fn load_socket_table_from<P: AsRef<Path>>(root: P) -> Result<InetSocketTable> {
    let root = root.as_ref();
    let mut table = InetSocketTable::new();

    for (name, protocol, ipv6) in TABLES {
        let path = root.join(name);
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                warn!(path = %path.display(), "socket table not present");
                continue;
            }
            Err(e) => return Err(Error::Io(e)),
        };

        let entries = parse_table(&content, protocol, ipv6);
        debug!(path = %path.display(), count = entries.len(), "loaded sockets");
        for entry in entries {
            table.insert(entry);
        }
    }

    Ok(table)
}

/// Load the running system's socket tables.
pub fn load_socket_table() -> Result<InetSocketTable> {
    load_socket_table_from(PROC_NET)
}
