//! Packet to owning socket resolution
//!
//! Ties the pipeline together: extract the tuple, undo source NAT using
//! connection tracking, then search the socket table. Every stage may end
//! the lookup; callers only see whether a socket was found.

use super::conntrack::ConnTrack;
use super::extract::{extract_v4, extract_v6};
use super::nat::rewrite_for_snat;
use super::search::{lookup_socket, LookupMode};
use super::socket_table::{NetDevice, SocketRef, SocketTable};
use super::tuple::{Extracted, TupleAddr};
use crate::error::{ExtractError, MissReason};
use crate::telemetry::LookupMetrics;
use std::sync::Arc;
use tracing::{debug, trace};

/// Resolves the local socket a packet belongs to.
pub struct SocketResolver<S, C> {
    sockets: S,
    conntrack: C,
    metrics: Arc<LookupMetrics>,
}

impl<S: SocketTable, C: ConnTrack> SocketResolver<S, C> {
    pub fn new(sockets: S, conntrack: C) -> Self {
        Self {
            sockets,
            conntrack,
            metrics: Arc::new(LookupMetrics::new()),
        }
    }

    /// Share a metrics instance with other resolvers.
    pub fn with_metrics(mut self, metrics: Arc<LookupMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn metrics(&self) -> &LookupMetrics {
        &self.metrics
    }

    pub fn sockets(&self) -> &S {
        &self.sockets
    }

    /// Socket owning the IPv4 `packet` received on `device`.
    pub fn lookup_v4_socket(&self, packet: &[u8], device: &NetDevice) -> Option<SocketRef<'_, S>> {
        self.lookup_v4_socket_with_mode(packet, device, LookupMode::Any)
    }

    /// Socket owning the IPv6 `packet` received on `device`.
    pub fn lookup_v6_socket(&self, packet: &[u8], device: &NetDevice) -> Option<SocketRef<'_, S>> {
        self.lookup_v6_socket_with_mode(packet, device, LookupMode::Any)
    }

    pub fn lookup_v4_socket_with_mode(
        &self,
        packet: &[u8],
        device: &NetDevice,
        mode: LookupMode,
    ) -> Option<SocketRef<'_, S>> {
        self.metrics.lookups_v4.inc();
        let outcome = self.resolve(extract_v4(packet), packet, device, mode);
        self.finish(outcome)
    }

    pub fn lookup_v6_socket_with_mode(
        &self,
        packet: &[u8],
        device: &NetDevice,
        mode: LookupMode,
    ) -> Option<SocketRef<'_, S>> {
        self.metrics.lookups_v6.inc();
        let outcome = self.resolve(extract_v6(packet), packet, device, mode);
        self.finish(outcome)
    }

    fn resolve<A: TupleAddr>(
        &self,
        extracted: Result<Extracted<A>, ExtractError>,
        packet: &[u8],
        device: &NetDevice,
        mode: LookupMode,
    ) -> Result<SocketRef<'_, S>, MissReason> {
        let Extracted { tuple, via_icmp } = extracted?;
        trace!(%tuple, via_icmp, dev = %device.name, "extracted tuple");

        let ct = self.conntrack.lookup_for_packet(packet);
        let (tuple, rewritten) = rewrite_for_snat(tuple, via_icmp, ct.as_ref());
        if rewritten {
            self.metrics.nat_rewrites.inc();
            trace!(%tuple, "tuple rewritten to pre-NAT address");
        }

        lookup_socket(
            &self.sockets,
            tuple.protocol,
            tuple.local(),
            tuple.remote(),
            device,
            mode,
        )
    }

    fn finish<'a>(
        &self,
        outcome: Result<SocketRef<'a, S>, MissReason>,
    ) -> Option<SocketRef<'a, S>> {
        match outcome {
            Ok(sock) => {
                self.metrics.found.inc();
                Some(sock)
            }
            Err(reason) => {
                self.metrics.record_miss(reason);
                match reason {
                    MissReason::Malformed => debug!("malformed IPv6 extension header chain"),
                    _ => trace!(%reason, "no socket"),
                }
                None
            }
        }
    }
}
