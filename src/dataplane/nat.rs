//! NAT-aware tuple rewriting
//!
//! A reply on a source-NAT'd flow is addressed to the translated address,
//! but the owning socket is bound to the address the flow had before
//! translation. The rewrite puts that address back into the local half.

use super::conntrack::{ConnInfo, ConnMatch, ConnStatus};
use super::tuple::{TransportTuple, TupleAddr};

/// Whether the tracked connection calls for undoing source NAT.
///
/// Direct packets must be replies on the flow; ICMP errors must be replies
/// related to it.
pub fn needs_snat_rewrite(ct: &ConnMatch, via_icmp: bool) -> bool {
    if ct.entry.is_untracked() || !ct.entry.status.contains(ConnStatus::SRC_NAT_DONE) {
        return false;
    }

    let expected = if via_icmp {
        ConnInfo::RelatedReply
    } else {
        ConnInfo::EstablishedReply
    };
    ct.info == expected
}

/// Replace the local half of `tuple` with the connection's pre-NAT source.
///
/// Returns the tuple to search with and whether it was changed. Without a
/// qualifying connection the tuple comes back untouched.
pub fn rewrite_for_snat<A: TupleAddr>(
    tuple: TransportTuple<A>,
    via_icmp: bool,
    ct: Option<&ConnMatch>,
) -> (TransportTuple<A>, bool) {
    let Some(ct) = ct.filter(|ct| needs_snat_rewrite(ct, via_icmp)) else {
        return (tuple, false);
    };

    let original_src = ct.entry.original.src;
    let Some(local_addr) = A::from_ip(original_src.ip()) else {
        return (tuple, false);
    };

    let rewritten = TransportTuple {
        local_addr,
        local_port: original_src.port(),
        ..tuple
    };
    (rewritten, rewritten != tuple)
}
