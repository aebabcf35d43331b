//! # Backend Metrics
//!
//! Lightweight counters describing what the mock backend has been asked, so
//! tests can assert that a request never reached the wire.
//!
//! ## Design Principles
//! 1. **Accumulator Pattern**: Atomic counters aggregate events cheaply.
//! 2. **Zero-Cost Access**: Snapshots are plain structs copied out of atomics.

use std::sync::atomic::{AtomicU64, Ordering};

/// Snapshot of all backend counters at a point in time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    /// Requests answered, including rejected bodies.
    pub requests_total: u64,
    /// Replies with a non-success status.
    pub errors_total: u64,
    /// Requests swallowed without a reply.
    pub stalled_total: u64,
}

/// Thread-safe counters for one backend.
///
/// `Ordering::Relaxed` is sufficient because no cross-field ordering is needed.
#[derive(Debug, Default)]
pub struct Metrics {
    requests_total: AtomicU64,
    errors_total: AtomicU64,
    stalled_total: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Metrics::default()
    }

    pub fn record_request(&self) {
        self.requests_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_error(&self) {
        self.errors_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_stall(&self) {
        self.stalled_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns a snapshot of all counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            requests_total: self.requests_total.load(Ordering::Relaxed),
            errors_total: self.errors_total.load(Ordering::Relaxed),
            stalled_total: self.stalled_total.load(Ordering::Relaxed),
        }
    }
}
