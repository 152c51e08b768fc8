//! Socket table contract and in-memory implementation
//!
//! [`SocketTable`] mirrors the non-blocking lookups the kernel's socket
//! hash tables offer. Every successful lookup takes a reference on the
//! returned socket; [`SocketRef`] gives it back unless the caller keeps it.

use super::tuple::L4Protocol;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::ops::Deref;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Socket state, numbered as in `/proc/net/tcp`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum SocketState {
    Established = 1,
    SynSent = 2,
    SynRecv = 3,
    FinWait1 = 4,
    FinWait2 = 5,
    TimeWait = 6,
    Close = 7,
    CloseWait = 8,
    LastAck = 9,
    Listen = 10,
    Closing = 11,
    NewSynRecv = 12,
}

impl SocketState {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(SocketState::Established),
            2 => Some(SocketState::SynSent),
            3 => Some(SocketState::SynRecv),
            4 => Some(SocketState::FinWait1),
            5 => Some(SocketState::FinWait2),
            6 => Some(SocketState::TimeWait),
            7 => Some(SocketState::Close),
            8 => Some(SocketState::CloseWait),
            9 => Some(SocketState::LastAck),
            10 => Some(SocketState::Listen),
            11 => Some(SocketState::Closing),
            12 => Some(SocketState::NewSynRecv),
            _ => None,
        }
    }

    /// Parse a state name as written in configuration files
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "established" => Some(SocketState::Established),
            "syn_sent" => Some(SocketState::SynSent),
            "syn_recv" => Some(SocketState::SynRecv),
            "fin_wait1" => Some(SocketState::FinWait1),
            "fin_wait2" => Some(SocketState::FinWait2),
            "time_wait" => Some(SocketState::TimeWait),
            "close" => Some(SocketState::Close),
            "close_wait" => Some(SocketState::CloseWait),
            "last_ack" => Some(SocketState::LastAck),
            "listen" => Some(SocketState::Listen),
            "closing" => Some(SocketState::Closing),
            "new_syn_recv" => Some(SocketState::NewSynRecv),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SocketState::Established => "established",
            SocketState::SynSent => "syn_sent",
            SocketState::SynRecv => "syn_recv",
            SocketState::FinWait1 => "fin_wait1",
            SocketState::FinWait2 => "fin_wait2",
            SocketState::TimeWait => "time_wait",
            SocketState::Close => "close",
            SocketState::CloseWait => "close_wait",
            SocketState::LastAck => "last_ack",
            SocketState::Listen => "listen",
            SocketState::Closing => "closing",
            SocketState::NewSynRecv => "new_syn_recv",
        }
    }

    /// States a UDP socket can be in (connected or not)
    pub fn valid_for_udp(self) -> bool {
        matches!(self, SocketState::Established | SocketState::Close)
    }
}

impl fmt::Display for SocketState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ingress device a packet arrived on
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetDevice {
    pub ifindex: u32,
    pub name: String,
}

impl NetDevice {
    pub fn new(ifindex: u32, name: impl Into<String>) -> Self {
        Self {
            ifindex,
            name: name.into(),
        }
    }
}

/// What the lookup pipeline needs to know about a socket
pub trait Socket {
    fn state(&self) -> SocketState;

    /// Address the socket is bound to (unspecified for wildcard binds)
    fn bound_addr(&self) -> IpAddr;
}

impl<S: Socket + ?Sized> Socket for Arc<S> {
    fn state(&self) -> SocketState {
        (**self).state()
    }

    fn bound_addr(&self) -> IpAddr {
        (**self).bound_addr()
    }
}

/// Non-blocking socket table lookups.
///
/// `local` is the address a packet is addressed to on this host, `remote`
/// its peer. A returned socket carries one reference that must be handed
/// back through [`SocketTable::release`].
pub trait SocketTable {
    type Socket: Socket;

    /// Established socket for the 4-tuple, else a listener on `local`
    fn tcp_lookup(
        &self,
        local: SocketAddr,
        remote: SocketAddr,
        ifindex: u32,
    ) -> Option<Self::Socket>;

    fn tcp_lookup_listener(&self, local: SocketAddr, ifindex: u32) -> Option<Self::Socket>;

    fn tcp_lookup_established(
        &self,
        local: SocketAddr,
        remote: SocketAddr,
        ifindex: u32,
    ) -> Option<Self::Socket>;

    fn udp_lookup(
        &self,
        local: SocketAddr,
        remote: SocketAddr,
        ifindex: u32,
    ) -> Option<Self::Socket>;

    /// Drop a reference taken by a lookup
    fn release(&self, socket: Self::Socket);
}

impl<T: SocketTable + ?Sized> SocketTable for &T {
    type Socket = T::Socket;

    fn tcp_lookup(&self, local: SocketAddr, remote: SocketAddr, ifindex: u32) -> Option<T::Socket> {
        (**self).tcp_lookup(local, remote, ifindex)
    }

    fn tcp_lookup_listener(&self, local: SocketAddr, ifindex: u32) -> Option<T::Socket> {
        (**self).tcp_lookup_listener(local, ifindex)
    }

    fn tcp_lookup_established(
        &self,
        local: SocketAddr,
        remote: SocketAddr,
        ifindex: u32,
    ) -> Option<T::Socket> {
        (**self).tcp_lookup_established(local, remote, ifindex)
    }

    fn udp_lookup(&self, local: SocketAddr, remote: SocketAddr, ifindex: u32) -> Option<T::Socket> {
        (**self).udp_lookup(local, remote, ifindex)
    }

    fn release(&self, socket: T::Socket) {
        (**self).release(socket)
    }
}

impl<T: SocketTable + ?Sized> SocketTable for Arc<T> {
    type Socket = T::Socket;

    fn tcp_lookup(&self, local: SocketAddr, remote: SocketAddr, ifindex: u32) -> Option<T::Socket> {
        (**self).tcp_lookup(local, remote, ifindex)
    }

    fn tcp_lookup_listener(&self, local: SocketAddr, ifindex: u32) -> Option<T::Socket> {
        (**self).tcp_lookup_listener(local, ifindex)
    }

    fn tcp_lookup_established(
        &self,
        local: SocketAddr,
        remote: SocketAddr,
        ifindex: u32,
    ) -> Option<T::Socket> {
        (**self).tcp_lookup_established(local, remote, ifindex)
    }

    fn udp_lookup(&self, local: SocketAddr, remote: SocketAddr, ifindex: u32) -> Option<T::Socket> {
        (**self).udp_lookup(local, remote, ifindex)
    }

    fn release(&self, socket: T::Socket) {
        (**self).release(socket)
    }
}

/// Scoped socket reference. Released back to its table on drop unless
/// taken out with [`SocketRef::into_inner`].
pub struct SocketRef<'t, T: SocketTable + ?Sized> {
    table: &'t T,
    // Only emptied by `into_inner` and `drop`, both of which consume the guard
    socket: Option<T::Socket>,
}

impl<'t, T: SocketTable + ?Sized> SocketRef<'t, T> {
    pub fn new(table: &'t T, socket: T::Socket) -> Self {
        Self {
            table,
            socket: Some(socket),
        }
    }

    /// Take ownership of the reference; the caller must release it.
    pub fn into_inner(mut self) -> T::Socket {
        match self.socket.take() {
            Some(socket) => socket,
            None => unreachable!("socket reference already taken"),
        }
    }
}

impl<T: SocketTable + ?Sized> Deref for SocketRef<'_, T> {
    type Target = T::Socket;

    fn deref(&self) -> &T::Socket {
        match &self.socket {
            Some(socket) => socket,
            None => unreachable!("socket reference already taken"),
        }
    }
}

impl<T: SocketTable + ?Sized> Drop for SocketRef<'_, T> {
    fn drop(&mut self) {
        if let Some(socket) = self.socket.take() {
            self.table.release(socket);
        }
    }
}

impl<T> fmt::Debug for SocketRef<'_, T>
where
    T: SocketTable + ?Sized,
    T::Socket: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SocketRef").field(&self.socket).finish()
    }
}

/// Socket held by [`InetSocketTable`]
#[derive(Debug)]
pub struct SocketEntry {
    pub protocol: L4Protocol,
    pub local: SocketAddr,
    /// Connected peer, if any
    pub remote: Option<SocketAddr>,
    pub state: SocketState,
    /// Bound device index (SO_BINDTODEVICE)
    pub device: Option<u32>,
    /// Inode number when loaded from procfs
    pub inode: Option<u64>,
    refcnt: AtomicUsize,
}

impl SocketEntry {
    pub fn new(protocol: L4Protocol, local: SocketAddr, state: SocketState) -> Self {
        Self {
            protocol,
            local,
            remote: None,
            state,
            device: None,
            inode: None,
            refcnt: AtomicUsize::new(1),
        }
    }

    pub fn with_remote(mut self, remote: SocketAddr) -> Self {
        self.remote = Some(remote);
        self
    }

    pub fn with_device(mut self, ifindex: u32) -> Self {
        self.device = Some(ifindex);
        self
    }

    pub fn with_inode(mut self, inode: u64) -> Self {
        self.inode = Some(inode);
        self
    }

    /// References held: one by the table plus one per outstanding lookup
    pub fn refcnt(&self) -> usize {
        self.refcnt.load(Ordering::Relaxed)
    }

    fn put(&self) {
        self.refcnt.fetch_sub(1, Ordering::Relaxed);
    }

    fn device_score(&self, ifindex: u32) -> Option<u32> {
        match self.device {
            None => Some(0),
            Some(dev) if dev == ifindex => Some(4),
            Some(_) => None,
        }
    }

    /// Score as a listener for `local`; `None` if it cannot accept there.
    fn listener_score(&self, local: SocketAddr, ifindex: u32) -> Option<u32> {
        if self.state != SocketState::Listen || self.local.port() != local.port() {
            return None;
        }
        if self.local.is_ipv4() != local.is_ipv4() {
            return None;
        }

        let mut score = 1;
        if !self.local.ip().is_unspecified() {
            if self.local.ip() != local.ip() {
                return None;
            }
            score += 4;
        }
        Some(score + self.device_score(ifindex)?)
    }

    fn is_established_for(&self, local: SocketAddr, remote: SocketAddr, ifindex: u32) -> bool {
        self.state != SocketState::Listen
            && self.local == local
            && self.remote == Some(remote)
            && self.device_score(ifindex).is_some()
    }

    fn udp_score(&self, local: SocketAddr, remote: SocketAddr, ifindex: u32) -> Option<u32> {
        if self.local.port() != local.port() || self.local.is_ipv4() != local.is_ipv4() {
            return None;
        }

        let mut score = 1;
        if !self.local.ip().is_unspecified() {
            if self.local.ip() != local.ip() {
                return None;
            }
            score += 4;
        }
        if let Some(peer) = self.remote {
            if peer.ip() != remote.ip() {
                return None;
            }
            score += 4;
            if peer.port() != 0 {
                if peer.port() != remote.port() {
                    return None;
                }
                score += 4;
            }
        }
        Some(score + self.device_score(ifindex)?)
    }
}

impl Socket for SocketEntry {
    fn state(&self) -> SocketState {
        self.state
    }

    fn bound_addr(&self) -> IpAddr {
        self.local.ip()
    }
}

impl fmt::Display for SocketEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.protocol, self.local)?;
        if let Some(remote) = self.remote {
            write!(f, " -> {}", remote)?;
        }
        write!(f, " {}", self.state)?;
        if let Some(dev) = self.device {
            write!(f, " dev {}", dev)?;
        }
        if let Some(inode) = self.inode {
            write!(f, " inode {}", inode)?;
        }
        Ok(())
    }
}

/// Take a lookup reference on `sock`
fn hold(sock: &Arc<SocketEntry>) -> Arc<SocketEntry> {
    sock.refcnt.fetch_add(1, Ordering::Relaxed);
    Arc::clone(sock)
}

/// In-memory TCP/UDP socket table with kernel lookup rules
#[derive(Debug, Default)]
pub struct InetSocketTable {
    tcp: Vec<Arc<SocketEntry>>,
    udp: Vec<Arc<SocketEntry>>,
}

impl InetSocketTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a socket and return the table's handle on it
    pub fn insert(&mut self, entry: SocketEntry) -> Arc<SocketEntry> {
        let entry = Arc::new(entry);
        match entry.protocol {
            L4Protocol::Tcp => self.tcp.push(Arc::clone(&entry)),
            L4Protocol::Udp => self.udp.push(Arc::clone(&entry)),
        }
        entry
    }

    pub fn len(&self) -> usize {
        self.tcp.len() + self.udp.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tcp.is_empty() && self.udp.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<SocketEntry>> {
        self.tcp.iter().chain(self.udp.iter())
    }

    fn best<F>(sockets: &[Arc<SocketEntry>], score: F) -> Option<Arc<SocketEntry>>
    where
        F: Fn(&SocketEntry) -> Option<u32>,
    {
        let mut best: Option<(&Arc<SocketEntry>, u32)> = None;
        for sock in sockets {
            if let Some(s) = score(sock) {
                // First socket wins ties, as in a hash chain walk
                if best.is_none_or(|(_, b)| s > b) {
                    best = Some((sock, s));
                }
            }
        }
        best.map(|(sock, _)| hold(sock))
    }
}

impl SocketTable for InetSocketTable {
    type Socket = Arc<SocketEntry>;

    fn tcp_lookup(
        &self,
        local: SocketAddr,
        remote: SocketAddr,
        ifindex: u32,
    ) -> Option<Arc<SocketEntry>> {
        self.tcp_lookup_established(local, remote, ifindex)
            .or_else(|| self.tcp_lookup_listener(local, ifindex))
    }

    fn tcp_lookup_listener(&self, local: SocketAddr, ifindex: u32) -> Option<Arc<SocketEntry>> {
        Self::best(&self.tcp, |sock| sock.listener_score(local, ifindex))
    }

    fn tcp_lookup_established(
        &self,
        local: SocketAddr,
        remote: SocketAddr,
        ifindex: u32,
    ) -> Option<Arc<SocketEntry>> {
        self.tcp
            .iter()
            .find(|sock| sock.is_established_for(local, remote, ifindex))
            .map(hold)
    }

    fn udp_lookup(
        &self,
        local: SocketAddr,
        remote: SocketAddr,
        ifindex: u32,
    ) -> Option<Arc<SocketEntry>> {
        Self::best(&self.udp, |sock| sock.udp_score(local, remote, ifindex))
    }

    fn release(&self, socket: Arc<SocketEntry>) {
        socket.put();
    }
}
