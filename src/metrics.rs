//! Relay metrics collection.
//!
//! Aggregate counters only; payload bytes are counted, never inspected.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use crate::rendezvous::Side;

/// Relay metrics collector.
pub struct RelayMetrics {
    /// Relay start time
    start_time: Instant,
    /// Connections accepted on the service side
    accepted_service: AtomicU64,
    /// Connections accepted on the public side
    accepted_public: AtomicU64,
    /// Pairs handed to forwarders
    pairs_formed: AtomicU64,
    /// Forwarding directions currently running
    active_directions: AtomicU64,
    /// Directions stopped by peer reset or broken pipe
    closed_directions: AtomicU64,
    /// Total bytes forwarded across all directions
    bytes_forwarded: AtomicU64,
    /// Read/write errors that were retried
    transient_errors: AtomicU64,
    /// Reads that returned no data
    idle_reads: AtomicU64,
}

impl RelayMetrics {
    /// Create a new metrics collector.
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            accepted_service: AtomicU64::new(0),
            accepted_public: AtomicU64::new(0),
            pairs_formed: AtomicU64::new(0),
            active_directions: AtomicU64::new(0),
            closed_directions: AtomicU64::new(0),
            bytes_forwarded: AtomicU64::new(0),
            transient_errors: AtomicU64::new(0),
            idle_reads: AtomicU64::new(0),
        }
    }

    /// Count an accepted connection.
    pub fn increment_accepted(&self, side: Side) {
        let counter = match side {
            Side::Service => &self.accepted_service,
            Side::Public => &self.accepted_public,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Count a formed pair.
    pub fn increment_pairs(&self) {
        self.pairs_formed.fetch_add(1, Ordering::Relaxed);
    }

    /// A forwarding direction started.
    pub fn direction_started(&self) {
        self.active_directions.fetch_add(1, Ordering::Relaxed);
    }

    /// A forwarding direction stopped.
    pub fn direction_stopped(&self, closed_by_peer: bool) {
        self.active_directions.fetch_sub(1, Ordering::Relaxed);
        if closed_by_peer {
            self.closed_directions.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Add forwarded bytes.
    pub fn add_bytes_forwarded(&self, bytes: u64) {
        self.bytes_forwarded.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Count a retried I/O error.
    pub fn increment_transient_errors(&self) {
        self.transient_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Count an empty read.
    pub fn increment_idle_reads(&self) {
        self.idle_reads.fetch_add(1, Ordering::Relaxed);
    }

    /// Get uptime in seconds.
    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Get accepted connections for a side.
    pub fn accepted(&self, side: Side) -> u64 {
        match side {
            Side::Service => self.accepted_service.load(Ordering::Relaxed),
            Side::Public => self.accepted_public.load(Ordering::Relaxed),
        }
    }

    /// Get formed pairs.
    pub fn pairs_formed(&self) -> u64 {
        self.pairs_formed.load(Ordering::Relaxed)
    }

    /// Get running directions.
    pub fn active_directions(&self) -> u64 {
        self.active_directions.load(Ordering::Relaxed)
    }

    /// Get directions closed by the peer.
    pub fn closed_directions(&self) -> u64 {
        self.closed_directions.load(Ordering::Relaxed)
    }

    /// Get total forwarded bytes.
    pub fn bytes_forwarded(&self) -> u64 {
        self.bytes_forwarded.load(Ordering::Relaxed)
    }

    /// Get retried errors.
    pub fn transient_errors(&self) -> u64 {
        self.transient_errors.load(Ordering::Relaxed)
    }

    /// Get a snapshot of all metrics.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            uptime_secs: self.uptime_secs(),
            accepted_service: self.accepted(Side::Service),
            accepted_public: self.accepted(Side::Public),
            pairs_formed: self.pairs_formed(),
            active_directions: self.active_directions(),
            closed_directions: self.closed_directions(),
            bytes_forwarded: self.bytes_forwarded(),
            transient_errors: self.transient_errors(),
            idle_reads: self.idle_reads.load(Ordering::Relaxed),
        }
    }

    /// Format metrics as a simple text report.
    pub fn format_report(&self) -> String {
        let snapshot = self.snapshot();

        format!(
            r#"Rendezvous Relay Metrics
========================
Uptime: {} seconds

Connections:
  Service:  {}
  Public:   {}
  Pairs:    {}

Forwarding:
  Active directions: {}
  Closed directions: {}
  Bytes:             {}

Errors:
  Transient:  {}
  Idle reads: {}
"#,
            snapshot.uptime_secs,
            snapshot.accepted_service,
            snapshot.accepted_public,
            snapshot.pairs_formed,
            snapshot.active_directions,
            snapshot.closed_directions,
            snapshot.bytes_forwarded,
            snapshot.transient_errors,
            snapshot.idle_reads,
        )
    }
}

impl Default for RelayMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of all metrics at a point in time.
#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
    pub uptime_secs: u64,
    pub accepted_service: u64,
    pub accepted_public: u64,
    pub pairs_formed: u64,
    pub active_directions: u64,
    pub closed_directions: u64,
    pub bytes_forwarded: u64,
    pub transient_errors: u64,
    pub idle_reads: u64,
}

impl MetricsSnapshot {
    /// Connections still waiting for a peer, assuming every pair consumed one
    /// connection from each side.
    pub fn unmatched(&self) -> u64 {
        (self.accepted_service + self.accepted_public).saturating_sub(self.pairs_formed * 2)
    }

    /// Calculate throughput in bytes per second.
    pub fn throughput_bps(&self) -> f64 {
        if self.uptime_secs == 0 {
            0.0
        } else {
            self.bytes_forwarded as f64 / self.uptime_secs as f64
        }
    }
}
