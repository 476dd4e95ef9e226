//! Configuration types for partition and reindex maintenance.

use crate::ddl::TimingConfiguration;
use std::time::Duration;

/// Top-level configuration.
#[derive(Debug, Clone, Default)]
pub struct MaintenanceConfig {
    /// Reindex coordination settings.
    pub reindex: ReindexConfig,

    /// Partition management settings.
    pub partitioning: PartitioningConfig,
}

impl MaintenanceConfig {
    /// Set reindex configuration.
    pub fn with_reindex_config(mut self, reindex: ReindexConfig) -> Self {
        self.reindex = reindex;
        self
    }

    /// Set partitioning configuration.
    pub fn with_partitioning_config(mut self, partitioning: PartitioningConfig) -> Self {
        self.partitioning = partitioning;
        self
    }
}

/// What a reindex lease serializes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaseScope {
    /// One reindex or leftover drop at a time per database.
    PerDatabase,

    /// One reindex or leftover drop at a time per index within a database.
    PerIndex,
}

/// Reindex coordination configuration.
#[derive(Debug, Clone)]
pub struct ReindexConfig {
    /// Lease TTL. Must be longer than any single rebuild, including
    /// statement timeouts, since the lease is never renewed.
    pub lease_timeout: Duration,

    /// Prefix of every reindex lease key.
    pub lease_namespace: String,

    /// What a lease key serializes.
    pub lease_scope: LeaseScope,

    /// Lock retries for dropping leftover temporary indexes.
    pub remove_index_retry: TimingConfiguration,

    /// Candidate selection thresholds.
    pub selection: SelectionConfig,
}

impl Default for ReindexConfig {
    fn default() -> Self {
        Self {
            lease_timeout: Duration::from_secs(24 * 60 * 60), // 1 day
            lease_namespace: "database/reindexing/coordinator".to_string(),
            lease_scope: LeaseScope::PerDatabase,
            remove_index_retry: TimingConfiguration::remove_index(),
            selection: SelectionConfig::default(),
        }
    }
}

impl ReindexConfig {
    /// Set the lease TTL.
    pub fn with_lease_timeout(mut self, timeout: Duration) -> Self {
        self.lease_timeout = timeout;
        self
    }

    /// Set the lease key prefix.
    pub fn with_lease_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.lease_namespace = namespace.into();
        self
    }

    /// Set the lease scope.
    pub fn with_lease_scope(mut self, scope: LeaseScope) -> Self {
        self.lease_scope = scope;
        self
    }

    /// Set the retry timing for leftover index removal.
    pub fn with_remove_index_retry(mut self, timing: TimingConfiguration) -> Self {
        self.remove_index_retry = timing;
        self
    }

    /// Set candidate selection thresholds.
    pub fn with_selection(mut self, selection: SelectionConfig) -> Self {
        self.selection = selection;
        self
    }
}

/// Thresholds for choosing which indexes to rebuild.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectionConfig {
    /// Smaller indexes are not worth a rebuild.
    pub minimum_index_size_bytes: u64,

    /// Larger indexes take too long to rebuild unattended.
    pub maximum_index_size_bytes: u64,

    /// Minimum estimated bloat as a fraction of on-disk size.
    pub minimum_relative_bloat: f64,

    /// Indexes with an action started within this window are skipped.
    pub recent_action_window: Duration,
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            minimum_index_size_bytes: 1 << 30,   // 1 GiB
            maximum_index_size_bytes: 100 << 30, // 100 GiB
            minimum_relative_bloat: 0.2,
            recent_action_window: Duration::from_secs(10 * 24 * 60 * 60), // 10 days
        }
    }
}

impl SelectionConfig {
    /// Set the on-disk size bounds.
    pub fn with_size_bounds(mut self, minimum_bytes: u64, maximum_bytes: u64) -> Self {
        self.minimum_index_size_bytes = minimum_bytes;
        self.maximum_index_size_bytes = maximum_bytes;
        self
    }

    /// Set the minimum relative bloat.
    pub fn with_minimum_relative_bloat(mut self, ratio: f64) -> Self {
        self.minimum_relative_bloat = ratio;
        self
    }

    /// Set the recent action window.
    pub fn with_recent_action_window(mut self, window: Duration) -> Self {
        self.recent_action_window = window;
        self
    }
}

/// Partition management configuration.
#[derive(Debug, Clone)]
pub struct PartitioningConfig {
    /// Schema holding dynamically created partitions.
    pub dynamic_schema: String,

    /// Prefix of every partition management lease key.
    pub lease_namespace: String,

    /// Lease TTL for one table's sync.
    pub lease_timeout: Duration,

    /// Lock retries for partition DDL.
    pub lock_retry: TimingConfiguration,
}

impl Default for PartitioningConfig {
    fn default() -> Self {
        Self {
            dynamic_schema: "partitions_dynamic".to_string(),
            lease_namespace: "database/partitioning".to_string(),
            lease_timeout: Duration::from_secs(60),
            lock_retry: TimingConfiguration::default_ddl(),
        }
    }
}

impl PartitioningConfig {
    /// Set the dynamic partition schema.
    pub fn with_dynamic_schema(mut self, schema: impl Into<String>) -> Self {
        self.dynamic_schema = schema.into();
        self
    }

    /// Set the lease TTL.
    pub fn with_lease_timeout(mut self, timeout: Duration) -> Self {
        self.lease_timeout = timeout;
        self
    }

    /// Set lock retry timing for partition DDL.
    pub fn with_lock_retry(mut self, timing: TimingConfiguration) -> Self {
        self.lock_retry = timing;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = MaintenanceConfig::default();
        assert_eq!(config.reindex.lease_timeout, Duration::from_secs(86_400));
        assert_eq!(config.reindex.lease_scope, LeaseScope::PerDatabase);
        assert_eq!(config.reindex.remove_index_retry.attempts(), 30);
        assert_eq!(config.partitioning.dynamic_schema, "partitions_dynamic");
        assert_eq!(config.reindex.selection.minimum_index_size_bytes, 1_073_741_824);
    }

    #[test]
    fn test_config_builder() {
        let config = MaintenanceConfig::default()
            .with_reindex_config(
                ReindexConfig::default()
                    .with_lease_timeout(Duration::from_secs(3600))
                    .with_lease_scope(LeaseScope::PerIndex),
            )
            .with_partitioning_config(PartitioningConfig::default().with_dynamic_schema("dyn"));

        assert_eq!(config.reindex.lease_timeout, Duration::from_secs(3600));
        assert_eq!(config.reindex.lease_scope, LeaseScope::PerIndex);
        assert_eq!(config.partitioning.dynamic_schema, "dyn");
    }
}
