//! Lock-free counters describing how well requests are being coalesced.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

use crate::dedup::DedupPlan;

/// Counters shared between the queue task and its handles.
#[derive(Debug, Default)]
pub struct BatchStats {
    requests: AtomicU64,
    calls: AtomicU64,
    flushes: AtomicU64,
    upstream_calls: AtomicU64,
    deduplicated: AtomicU64,
    attached_in_flight: AtomicU64,
    transport_failures: AtomicU64,
}

/// Point-in-time copy of [`BatchStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    /// Requests enqueued by callers.
    pub requests: u64,
    /// Individual calls carried by those requests.
    pub calls: u64,
    /// Flush cycles run.
    pub flushes: u64,
    /// Calls actually sent upstream.
    pub upstream_calls: u64,
    /// Calls answered by an identical call in the same flush.
    pub deduplicated: u64,
    /// Requests answered by a call already in flight when they arrived.
    pub attached_in_flight: u64,
    /// Bulk calls that failed as a whole.
    pub transport_failures: u64,
}

impl BatchStats {
    pub(crate) fn record_enqueued(&self, calls: usize) {
        self.requests.fetch_add(1, Ordering::Relaxed);
        self.calls.fetch_add(calls as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_flush(&self, plan: &DedupPlan) {
        self.flushes.fetch_add(1, Ordering::Relaxed);
        self.deduplicated.fetch_add(plan.deduplicated() as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_upstream(&self, calls: usize) {
        self.upstream_calls.fetch_add(calls as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_attached(&self) {
        self.attached_in_flight.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_transport_failure(&self) {
        self.transport_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            requests: self.requests.load(Ordering::Relaxed),
            calls: self.calls.load(Ordering::Relaxed),
            flushes: self.flushes.load(Ordering::Relaxed),
            upstream_calls: self.upstream_calls.load(Ordering::Relaxed),
            deduplicated: self.deduplicated.load(Ordering::Relaxed),
            attached_in_flight: self.attached_in_flight.load(Ordering::Relaxed),
            transport_failures: self.transport_failures.load(Ordering::Relaxed),
        }
    }
}

impl StatsSnapshot {
    /// Calls per upstream call; 1.0 means nothing was coalesced.
    pub fn coalescing_ratio(&self) -> f64 {
        if self.upstream_calls == 0 {
            0.0
        } else {
            self.calls as f64 / self.upstream_calls as f64
        }
    }
}
