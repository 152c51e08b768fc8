//! Lookup metrics.
//!
//! Counters use relaxed atomics only, so recording is safe from any
//! context, including ones that must not block.

use crate::error::MissReason;
use std::sync::atomic::{AtomicU64, Ordering};

/// Atomic counter for thread-safe increment operations.
#[derive(Debug, Default)]
pub struct Counter(AtomicU64);

impl Counter {
    /// Creates a new counter initialized to zero.
    pub fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    /// Increments the counter by 1.
    pub fn inc(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    /// Adds a value to the counter.
    pub fn add(&self, val: u64) {
        self.0.fetch_add(val, Ordering::Relaxed);
    }

    /// Gets the current value of the counter.
    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Outcome counters of the socket lookup pipeline.
#[derive(Debug, Default)]
pub struct LookupMetrics {
    /// IPv4 lookups started.
    pub lookups_v4: Counter,
    /// IPv6 lookups started.
    pub lookups_v6: Counter,
    /// Packets without an extractable transport tuple.
    pub not_extractable: Counter,
    /// Packets with a malformed IPv6 extension header chain.
    pub malformed: Counter,
    /// Tuples rewritten to undo source NAT.
    pub nat_rewrites: Counter,
    /// Searches that matched no socket.
    pub misses: Counter,
    /// Matched sockets rejected by a filter.
    pub filtered: Counter,
    /// Lookups that returned a socket.
    pub found: Counter,
}

impl LookupMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the reason a lookup returned nothing.
    pub fn record_miss(&self, reason: MissReason) {
        match reason {
            MissReason::NotExtractable => self.not_extractable.inc(),
            MissReason::Malformed => self.malformed.inc(),
            MissReason::NoMatch => self.misses.inc(),
            MissReason::Filtered(_) => self.filtered.inc(),
        }
    }

    /// Exports all metrics as key-value pairs.
    pub fn export(&self) -> Vec<(String, u64)> {
        vec![
            ("lookups_v4".into(), self.lookups_v4.get()),
            ("lookups_v6".into(), self.lookups_v6.get()),
            ("not_extractable".into(), self.not_extractable.get()),
            ("malformed".into(), self.malformed.get()),
            ("nat_rewrites".into(), self.nat_rewrites.get()),
            ("misses".into(), self.misses.get()),
            ("filtered".into(), self.filtered.get()),
            ("found".into(), self.found.get()),
        ]
    }
}
