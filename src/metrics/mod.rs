//! In-process metrics for partition and reindex maintenance.
//!
//! Counters only; exposing them is left to the embedding service.
//!
//! ```rust,ignore
//! use dbkeeper::metrics::MaintenanceMetrics;
//!
//! let metrics = MaintenanceMetrics::new();
//! metrics.reindex_started.inc();
//!
//! let snapshot = metrics.snapshot();
//! println!("reindex failures: {}", snapshot.reindex_failed);
//! ```

mod counters;

pub use counters::{Counter, LabeledCounter};

/// Counters shared by the partition manager and the reindex coordinator.
#[derive(Debug)]
pub struct MaintenanceMetrics {
    /// Reindex attempts that acquired the lease.
    pub reindex_started: Counter,
    /// Reindex attempts that finished successfully.
    pub reindex_finished: Counter,
    /// Reindex attempts whose rebuild failed.
    pub reindex_failed: Counter,
    /// Reindex or drop calls skipped because the lease was held elsewhere.
    pub lease_skipped: Counter,
    /// Leftover indexes removed.
    pub indexes_dropped: Counter,
    /// Leftover index removals abandoned after lock retries.
    pub indexes_abandoned: Counter,
    /// Lock timeouts hit by retried DDL.
    pub lock_retries: Counter,
    /// Detach candidates excluded because they hold the column default.
    pub inconsistent_partitions: Counter,
    /// Partitions created, by table.
    pub partitions_created: LabeledCounter<1>,
    /// Partitions detached, by table.
    pub partitions_detached: LabeledCounter<1>,
}

impl MaintenanceMetrics {
    /// Create a new metrics instance.
    pub fn new() -> Self {
        Self {
            reindex_started: Counter::new("reindex_started_total", "Reindex attempts started"),
            reindex_finished: Counter::new("reindex_finished_total", "Reindex attempts finished"),
            reindex_failed: Counter::new("reindex_failed_total", "Reindex attempts failed"),
            lease_skipped: Counter::new(
                "maintenance_lease_skipped_total",
                "Operations skipped because another worker held the lease",
            ),
            indexes_dropped: Counter::new(
                "leftover_indexes_dropped_total",
                "Leftover indexes dropped",
            ),
            indexes_abandoned: Counter::new(
                "leftover_indexes_abandoned_total",
                "Leftover index removals abandoned after lock retries",
            ),
            lock_retries: Counter::new("ddl_lock_retries_total", "DDL lock timeouts retried"),
            inconsistent_partitions: Counter::new(
                "partitions_inconsistent_total",
                "Detach candidates excluded because they hold the column default",
            ),
            partitions_created: LabeledCounter::new(
                "partitions_created_total",
                "Partitions created",
                ["table"],
            ),
            partitions_detached: LabeledCounter::new(
                "partitions_detached_total",
                "Partitions detached",
                ["table"],
            ),
        }
    }

    /// Point-in-time copy of the unlabeled counters and label totals.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            reindex_started: self.reindex_started.get(),
            reindex_finished: self.reindex_finished.get(),
            reindex_failed: self.reindex_failed.get(),
            lease_skipped: self.lease_skipped.get(),
            indexes_dropped: self.indexes_dropped.get(),
            indexes_abandoned: self.indexes_abandoned.get(),
            lock_retries: self.lock_retries.get(),
            inconsistent_partitions: self.inconsistent_partitions.get(),
            partitions_created: self.partitions_created.total(),
            partitions_detached: self.partitions_detached.total(),
        }
    }
}

impl Default for MaintenanceMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of [`MaintenanceMetrics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub reindex_started: u64,
    pub reindex_finished: u64,
    pub reindex_failed: u64,
    pub lease_skipped: u64,
    pub indexes_dropped: u64,
    pub indexes_abandoned: u64,
    pub lock_retries: u64,
    pub inconsistent_partitions: u64,
    pub partitions_created: u64,
    pub partitions_detached: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot() {
        let metrics = MaintenanceMetrics::new();
        metrics.reindex_started.inc();
        metrics.reindex_failed.inc();
        metrics.partitions_created.inc_by(["events"], 2);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.reindex_started, 1);
        assert_eq!(snapshot.reindex_failed, 1);
        assert_eq!(snapshot.reindex_finished, 0);
        assert_eq!(snapshot.partitions_created, 2);
    }
}
