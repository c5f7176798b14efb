//! Mirroring worker metrics.
//!
//! [`MirrorMetrics`] provides lock-free atomic counters for the data
//! path, convertible to a [`MetricsSnapshot`] tagged with the consumer
//! client id. `dropped_messages` is the gauge of records whose delivery
//! callback reported an error and which are therefore not durably
//! mirrored.

use std::sync::atomic::{AtomicU64, Ordering};

/// Atomic counters for mirroring statistics.
#[derive(Debug, Default)]
pub struct MirrorMetrics {
    /// Total records handed to the destination producer.
    pub records_mirrored: AtomicU64,
    /// Total payload bytes handed to the destination producer.
    pub bytes_mirrored: AtomicU64,
    /// Total records whose delivery callback reported an error.
    pub dropped_messages: AtomicU64,
    /// Total successful offset commits.
    pub offset_commits: AtomicU64,
    /// Total partition ONLINE/OFFLINE transitions applied.
    pub partition_transitions: AtomicU64,
}

impl MirrorMetrics {
    /// Creates a new metrics instance with all counters at zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one record of `bytes` payload handed to the producer.
    pub fn record_mirrored(&self, bytes: u64) {
        self.records_mirrored.fetch_add(1, Ordering::Relaxed);
        self.bytes_mirrored.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Records a delivery failure.
    pub fn record_dropped(&self) {
        self.dropped_messages.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a successful offset commit.
    pub fn record_commit(&self) {
        self.offset_commits.fetch_add(1, Ordering::Relaxed);
    }

    /// Records an applied partition state transition.
    pub fn record_transition(&self) {
        self.partition_transitions.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns the current dropped-messages gauge value.
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.dropped_messages.load(Ordering::Relaxed)
    }

    /// Snapshots all counters, tagged with the consumer client id.
    #[must_use]
    pub fn snapshot(&self, client_id: &str) -> MetricsSnapshot {
        MetricsSnapshot {
            client_id: client_id.to_string(),
            records_mirrored: self.records_mirrored.load(Ordering::Relaxed),
            bytes_mirrored: self.bytes_mirrored.load(Ordering::Relaxed),
            dropped_messages: self.dropped_messages.load(Ordering::Relaxed),
            offset_commits: self.offset_commits.load(Ordering::Relaxed),
            partition_transitions: self.partition_transitions.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time view of [`MirrorMetrics`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricsSnapshot {
    /// Consumer client id the counters are tagged with.
    pub client_id: String,
    /// Total records handed to the destination producer.
    pub records_mirrored: u64,
    /// Total payload bytes handed to the destination producer.
    pub bytes_mirrored: u64,
    /// Records whose delivery callback reported an error.
    pub dropped_messages: u64,
    /// Successful offset commits.
    pub offset_commits: u64,
    /// Partition ONLINE/OFFLINE transitions applied.
    pub partition_transitions: u64,
}
