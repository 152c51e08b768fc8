//! Configuration types

use crate::dataplane::{
    ConnEntry, ConnStatus, ConnTrackTable, ConnTuple, InetSocketTable, L4Protocol, SocketEntry,
    SocketState,
};
use crate::telemetry::LogConfig;
use crate::{Error, Result};
use serde::Deserialize;
use std::net::SocketAddr;

/// User-defined configuration (config.toml)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub logging: LogConfig,
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub sockets: Vec<SocketConfig>,
    #[serde(default)]
    pub conntrack: Vec<ConntrackConfig>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SourceConfig {
    #[serde(default)]
    pub kind: SourceKind,
}

/// Where the socket table comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// The `[[sockets]]` entries of this file
    #[default]
    Static,
    /// The running system's /proc/net tables
    Procfs,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProtocolKind {
    Tcp,
    Udp,
}

impl From<ProtocolKind> for L4Protocol {
    fn from(kind: ProtocolKind) -> Self {
        match kind {
            ProtocolKind::Tcp => L4Protocol::Tcp,
            ProtocolKind::Udp => L4Protocol::Udp,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SocketConfig {
    pub protocol: ProtocolKind,
    pub local: SocketAddr,
    #[serde(default)]
    pub remote: Option<SocketAddr>,
    /// State name; defaults to `listen` for TCP and to `established` or
    /// `close` for UDP depending on whether a remote is given
    #[serde(default)]
    pub state: Option<String>,
    /// Bound device index
    #[serde(default)]
    pub device: Option<u32>,
}

impl SocketConfig {
    pub fn state_name(&self) -> &str {
        match (&self.state, self.protocol, self.remote) {
            (Some(state), _, _) => state.as_str(),
            (None, ProtocolKind::Tcp, _) => "listen",
            (None, ProtocolKind::Udp, Some(_)) => "established",
            (None, ProtocolKind::Udp, None) => "close",
        }
    }

    pub fn socket_state(&self) -> Option<SocketState> {
        SocketState::from_name(self.state_name())
    }

    /// Build the in-memory socket this entry describes
    pub fn to_entry(&self) -> Result<SocketEntry> {
        let state = self.socket_state().ok_or_else(|| {
            Error::Config(format!("unknown socket state '{}'", self.state_name()))
        })?;

        let mut entry = SocketEntry::new(self.protocol.into(), self.local, state);
        if let Some(remote) = self.remote {
            entry = entry.with_remote(remote);
        }
        if let Some(device) = self.device {
            entry = entry.with_device(device);
        }
        Ok(entry)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConntrackConfig {
    pub protocol: ProtocolKind,
    pub original_src: SocketAddr,
    pub original_dst: SocketAddr,
    /// Reply direction; defaults to the reversed original (no NAT)
    #[serde(default)]
    pub reply_src: Option<SocketAddr>,
    #[serde(default)]
    pub reply_dst: Option<SocketAddr>,
    #[serde(default)]
    pub status: Vec<String>,
}

impl ConntrackConfig {
    pub fn addresses(&self) -> impl Iterator<Item = SocketAddr> + '_ {
        [self.original_src, self.original_dst]
            .into_iter()
            .chain(self.reply_src)
            .chain(self.reply_dst)
    }

    /// Status flags; the error names the first unknown flag
    pub fn status_flags(&self) -> std::result::Result<ConnStatus, String> {
        self.status.iter().try_fold(ConnStatus::empty(), |acc, name| {
            ConnStatus::from_config_name(name)
                .map(|flag| acc | flag)
                .ok_or_else(|| name.clone())
        })
    }

    /// Build the connection tracking entry this section describes
    pub fn to_entry(&self) -> Result<ConnEntry> {
        let status = self
            .status_flags()
            .map_err(|name| Error::Config(format!("unknown conntrack status '{}'", name)))?;

        let protocol = self.protocol.into();
        let original = ConnTuple::new(protocol, self.original_src, self.original_dst);
        let reply = ConnTuple::new(
            protocol,
            self.reply_src.unwrap_or(self.original_dst),
            self.reply_dst.unwrap_or(self.original_src),
        );
        Ok(ConnEntry::with_reply(original, reply, status))
    }
}

impl Config {
    /// In-memory socket table from the `[[sockets]]` entries
    pub fn build_socket_table(&self) -> Result<InetSocketTable> {
        let mut table = InetSocketTable::new();
        for socket in &self.sockets {
            table.insert(socket.to_entry()?);
        }
        Ok(table)
    }

    /// Connection tracking table from the `[[conntrack]]` entries
    pub fn build_conntrack(&self) -> Result<ConnTrackTable> {
        let mut table = ConnTrackTable::new();
        for conn in &self.conntrack {
            table.insert(conn.to_entry()?);
        }
        Ok(table)
    }
}
