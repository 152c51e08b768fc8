//! Mode-sensitive socket table search

use super::socket_table::{NetDevice, Socket, SocketRef, SocketState, SocketTable};
use super::tuple::L4Protocol;
use crate::error::{FilterReason, MissReason};
use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;
use tracing::trace;

/// Which sockets a search may return
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LookupMode {
    #[default]
    Any,
    ListenerOnly,
    EstablishedOnly,
}

impl FromStr for LookupMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "any" => Ok(LookupMode::Any),
            "listener" => Ok(LookupMode::ListenerOnly),
            "established" => Ok(LookupMode::EstablishedOnly),
            _ => Err(format!("unknown lookup mode: {}", s)),
        }
    }
}

impl fmt::Display for LookupMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LookupMode::Any => "any",
            LookupMode::ListenerOnly => "listener",
            LookupMode::EstablishedOnly => "established",
        })
    }
}

/// Whether a UDP socket is acceptable under `mode`.
///
/// UDP has no listening state: an unconnected socket plays the listener,
/// a connected one the established socket.
fn udp_mode_allows<S: Socket + ?Sized>(sock: &S, mode: LookupMode) -> bool {
    let connected = sock.state() == SocketState::Established;
    let wildcard = sock.bound_addr().is_unspecified();

    match mode {
        LookupMode::Any => true,
        LookupMode::EstablishedOnly => connected && !wildcard,
        LookupMode::ListenerOnly => !connected,
    }
}

/// Search the socket table once for `protocol` traffic to `local` from
/// `remote`, applying the mode filter. Rejected sockets are released.
pub fn get_socket<'t, T: SocketTable + ?Sized>(
    table: &'t T,
    protocol: L4Protocol,
    local: SocketAddr,
    remote: SocketAddr,
    device: &NetDevice,
    mode: LookupMode,
) -> Result<SocketRef<'t, T>, MissReason> {
    let ifindex = device.ifindex;

    let found = match protocol {
        L4Protocol::Tcp => match mode {
            LookupMode::Any => table.tcp_lookup(local, remote, ifindex),
            LookupMode::ListenerOnly => table.tcp_lookup_listener(local, ifindex),
            LookupMode::EstablishedOnly => table.tcp_lookup_established(local, remote, ifindex),
        },
        L4Protocol::Udp => table.udp_lookup(local, remote, ifindex),
    };
    let sock = SocketRef::new(table, found.ok_or(MissReason::NoMatch)?);

    if protocol == L4Protocol::Udp && !udp_mode_allows(&*sock, mode) {
        trace!(%local, %remote, %mode, state = %sock.state(), "UDP socket rejected by mode");
        return Err(MissReason::Filtered(FilterReason::ModeMismatch));
    }

    Ok(sock)
}

/// [`get_socket`] plus the wildcard filter: a socket bound to the
/// unspecified address is only returned in TIME_WAIT.
pub fn lookup_socket<'t, T: SocketTable + ?Sized>(
    table: &'t T,
    protocol: L4Protocol,
    local: SocketAddr,
    remote: SocketAddr,
    device: &NetDevice,
    mode: LookupMode,
) -> Result<SocketRef<'t, T>, MissReason> {
    let sock = get_socket(table, protocol, local, remote, device, mode)?;

    if sock.state() != SocketState::TimeWait && sock.bound_addr().is_unspecified() {
        trace!(%local, %remote, "socket bound to wildcard address");
        return Err(MissReason::Filtered(FilterReason::WildcardBound));
    }

    Ok(sock)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataplane::socket_table::{InetSocketTable, SocketEntry};
    use std::sync::Arc;

    fn addr(s: &str) -> SocketAddr {
        s.parse().unwrap()
    }

    fn eth0() -> NetDevice {
        NetDevice::new(2, "eth0")
    }

    fn udp_table() -> (InetSocketTable, Arc<SocketEntry>, Arc<SocketEntry>) {
        let mut table = InetSocketTable::new();
        let wildcard = table.insert(SocketEntry::new(
            L4Protocol::Udp,
            addr("0.0.0.0:5000"),
            SocketState::Close,
        ));
        let connected = table.insert(
            SocketEntry::new(L4Protocol::Udp, addr("10.0.0.5:5000"), SocketState::Established)
                .with_remote(addr("203.0.113.9:53")),
        );
        (table, wildcard, connected)
    }

    #[test]
    fn test_mode_from_str() {
        assert_eq!("any".parse::<LookupMode>(), Ok(LookupMode::Any));
        assert_eq!("listener".parse::<LookupMode>(), Ok(LookupMode::ListenerOnly));
        assert_eq!(
            "established".parse::<LookupMode>(),
            Ok(LookupMode::EstablishedOnly)
        );
        assert!("both".parse::<LookupMode>().is_err());
        assert_eq!(LookupMode::ListenerOnly.to_string(), "listener");
    }

    #[test]
    fn test_udp_listener_only_returns_wildcard_listener() {
        let (table, wildcard, _) = udp_table();

        let sock = get_socket(
            &table,
            L4Protocol::Udp,
            addr("10.0.0.5:5000"),
            addr("198.51.100.1:53"),
            &eth0(),
            LookupMode::ListenerOnly,
        )
        .unwrap();
        assert!(Arc::ptr_eq(&*sock, &wildcard));
    }

    #[test]
    fn test_udp_listener_only_rejects_connected() {
        let (table, _, connected) = udp_table();

        let miss = get_socket(
            &table,
            L4Protocol::Udp,
            addr("10.0.0.5:5000"),
            addr("203.0.113.9:53"),
            &eth0(),
            LookupMode::ListenerOnly,
        )
        .unwrap_err();
        assert_eq!(miss, MissReason::Filtered(FilterReason::ModeMismatch));
        assert_eq!(connected.refcnt(), 1);
    }

    #[test]
    fn test_udp_established_only() {
        let (table, wildcard, connected) = udp_table();

        let sock = get_socket(
            &table,
            L4Protocol::Udp,
            addr("10.0.0.5:5000"),
            addr("203.0.113.9:53"),
            &eth0(),
            LookupMode::EstablishedOnly,
        )
        .unwrap();
        assert!(Arc::ptr_eq(&*sock, &connected));
        drop(sock);

        // Only the unconnected wildcard socket matches this peer
        let miss = get_socket(
            &table,
            L4Protocol::Udp,
            addr("10.0.0.5:5000"),
            addr("198.51.100.1:53"),
            &eth0(),
            LookupMode::EstablishedOnly,
        )
        .unwrap_err();
        assert_eq!(miss, MissReason::Filtered(FilterReason::ModeMismatch));
        assert_eq!(wildcard.refcnt(), 1);
        assert_eq!(connected.refcnt(), 1);
    }

    #[test]
    fn test_udp_established_only_rejects_wildcard_connected() {
        let mut table = InetSocketTable::new();
        table.insert(
            SocketEntry::new(L4Protocol::Udp, addr("0.0.0.0:6000"), SocketState::Established)
                .with_remote(addr("203.0.113.9:53")),
        );

        let miss = get_socket(
            &table,
            L4Protocol::Udp,
            addr("10.0.0.5:6000"),
            addr("203.0.113.9:53"),
            &eth0(),
            LookupMode::EstablishedOnly,
        )
        .unwrap_err();
        assert_eq!(miss, MissReason::Filtered(FilterReason::ModeMismatch));
    }

    #[test]
    fn test_tcp_modes_select_lookup() {
        let mut table = InetSocketTable::new();
        let listener = table.insert(SocketEntry::new(
            L4Protocol::Tcp,
            addr("10.0.0.5:80"),
            SocketState::Listen,
        ));
        let conn = table.insert(
            SocketEntry::new(L4Protocol::Tcp, addr("10.0.0.5:80"), SocketState::Established)
                .with_remote(addr("203.0.113.9:51000")),
        );
        let (local, remote) = (addr("10.0.0.5:80"), addr("203.0.113.9:51000"));

        let sock = get_socket(&table, L4Protocol::Tcp, local, remote, &eth0(), LookupMode::Any)
            .unwrap();
        assert!(Arc::ptr_eq(&*sock, &conn));
        drop(sock);

        let sock = get_socket(
            &table,
            L4Protocol::Tcp,
            local,
            remote,
            &eth0(),
            LookupMode::ListenerOnly,
        )
        .unwrap();
        assert!(Arc::ptr_eq(&*sock, &listener));
        drop(sock);

        let miss = get_socket(
            &table,
            L4Protocol::Tcp,
            local,
            addr("203.0.113.9:51001"),
            &eth0(),
            LookupMode::EstablishedOnly,
        )
        .unwrap_err();
        assert_eq!(miss, MissReason::NoMatch);
    }

    #[test]
    fn test_wildcard_filter() {
        let mut table = InetSocketTable::new();
        let listener = table.insert(SocketEntry::new(
            L4Protocol::Tcp,
            addr("0.0.0.0:80"),
            SocketState::Listen,
        ));

        let miss = lookup_socket(
            &table,
            L4Protocol::Tcp,
            addr("10.0.0.5:80"),
            addr("203.0.113.9:51000"),
            &eth0(),
            LookupMode::Any,
        )
        .unwrap_err();
        assert_eq!(miss, MissReason::Filtered(FilterReason::WildcardBound));
        assert_eq!(listener.refcnt(), 1);
    }

    #[test]
    fn test_wildcard_filter_keeps_time_wait() {
        let mut table = InetSocketTable::new();
        let tw = table.insert(
            SocketEntry::new(L4Protocol::Tcp, addr("[::]:443"), SocketState::TimeWait)
                .with_remote(addr("[2001:db8::9]:50000")),
        );

        let sock = lookup_socket(
            &table,
            L4Protocol::Tcp,
            addr("[::]:443"),
            addr("[2001:db8::9]:50000"),
            &eth0(),
            LookupMode::Any,
        )
        .unwrap();
        assert!(Arc::ptr_eq(&*sock, &tw));
    }
}
