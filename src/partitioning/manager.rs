//! Applies a partitioning strategy to the database.

use crate::config::PartitioningConfig;
use crate::ddl::{DdlExecutor, LockRetryExecutor};
use crate::error::Result;
use crate::lease::{ExclusiveLeaseGuard, LeaseStore};
use crate::metrics::MaintenanceMetrics;
use crate::partitioning::descriptor::PartitionDescriptor;
use crate::partitioning::PartitioningStrategy;
use std::sync::Arc;
use tracing::{info, warn};

/// Partitions changed by one [`PartitionManager::sync_partitions`] run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Partitions created, in creation order.
    pub created: Vec<PartitionDescriptor>,
    /// Partitions detached, in detach order.
    pub detached: Vec<PartitionDescriptor>,
}

impl SyncReport {
    /// Whether the run changed nothing.
    pub fn is_empty(&self) -> bool {
        self.created.is_empty() && self.detached.is_empty()
    }
}

/// Creates missing and detaches extra partitions for one table.
///
/// Runs under a per-table lease so that only one worker issues partition
/// DDL for a table at a time. Every statement goes through lock retries and
/// raises once they are exhausted.
#[derive(Debug)]
pub struct PartitionManager {
    strategy: Arc<dyn PartitioningStrategy>,
    retries: LockRetryExecutor,
    lease: ExclusiveLeaseGuard,
    config: PartitioningConfig,
    metrics: Arc<MaintenanceMetrics>,
}

impl PartitionManager {
    /// Create a manager for `strategy`'s table.
    pub fn new(
        strategy: Arc<dyn PartitioningStrategy>,
        ddl: Arc<dyn DdlExecutor>,
        lease_store: Arc<dyn LeaseStore>,
        config: PartitioningConfig,
    ) -> Self {
        let metrics = Arc::new(MaintenanceMetrics::new());
        Self {
            strategy,
            retries: LockRetryExecutor::with_metrics(ddl, Arc::clone(&metrics)),
            lease: ExclusiveLeaseGuard::new(lease_store),
            config,
            metrics,
        }
    }

    /// Record into shared metrics.
    pub fn with_metrics(mut self, metrics: Arc<MaintenanceMetrics>) -> Self {
        let ddl = Arc::clone(self.retries.executor());
        self.retries = LockRetryExecutor::with_metrics(ddl, Arc::clone(&metrics));
        self.metrics = metrics;
        self
    }

    /// Metrics recorded by this manager.
    pub fn metrics(&self) -> &Arc<MaintenanceMetrics> {
        &self.metrics
    }

    /// The lease serializing this table's partition DDL.
    pub fn lease_key(&self) -> String {
        format!("{}/{}", self.config.lease_namespace, self.strategy.table_name())
    }

    /// Bring the table's partitions in line with the strategy.
    ///
    /// Returns `None` if another worker is already syncing this table.
    pub async fn sync_partitions(&self) -> Result<Option<SyncReport>> {
        let key = self.lease_key();

        match self
            .lease
            .try_obtain_lease(&key, self.config.lease_timeout, || self.sync_locked())
            .await?
        {
            Some(report) => report.map(Some),
            None => {
                self.metrics.lease_skipped.inc();
                info!(
                    table = self.strategy.table_name(),
                    lease_key = %key,
                    "Partition sync already running elsewhere, skipping"
                );
                Ok(None)
            }
        }
    }

    async fn sync_locked(&self) -> Result<SyncReport> {
        let missing = self.strategy.missing_partitions().await?;
        let created = self.create_partitions(missing).await?;

        if created.is_empty() && self.strategy.default_lags_active().await? {
            warn!(
                table = self.strategy.table_name(),
                "Partitioning column default lags the active partition, moving it"
            );
            self.strategy.after_adding_partitions().await?;
        }

        // Read after creating: the new active partition may retire the old one.
        let extra = self.strategy.extra_partitions().await?;
        let detached = self.detach_partitions(extra).await?;

        Ok(SyncReport { created, detached })
    }

    async fn create_partitions(
        &self,
        partitions: Vec<PartitionDescriptor>,
    ) -> Result<Vec<PartitionDescriptor>> {
        if partitions.is_empty() {
            return Ok(partitions);
        }

        for partition in &partitions {
            self.retries
                .run(&partition.to_create_sql(), &self.config.lock_retry, true)
                .await?;

            self.metrics.partitions_created.inc_by([partition.table()], 1);
            info!(
                table = partition.table(),
                partition = partition.partition_name(),
                value = partition.value(),
                "Created partition"
            );
        }

        self.strategy.after_adding_partitions().await?;
        Ok(partitions)
    }

    async fn detach_partitions(
        &self,
        partitions: Vec<PartitionDescriptor>,
    ) -> Result<Vec<PartitionDescriptor>> {
        for partition in &partitions {
            self.retries
                .run(&partition.to_detach_sql(), &self.config.lock_retry, true)
                .await?;

            self.metrics.partitions_detached.inc_by([partition.table()], 1);
            info!(
                table = partition.table(),
                partition = partition.partition_name(),
                value = partition.value(),
                "Detached partition"
            );
        }

        Ok(partitions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ddl::{LockTiming, TimingConfiguration};
    use crate::error::{DdlError, Error};
    use crate::lease::InMemoryLeaseStore;
    use crate::partitioning::{PartitionedModel, SlidingListStrategy};
    use crate::testing::{FakeCatalog, RecordingDdlExecutor};
    use std::time::Duration;

    struct Fixture {
        catalog: Arc<FakeCatalog>,
        ddl: Arc<RecordingDdlExecutor>,
        leases: Arc<InMemoryLeaseStore>,
        manager: PartitionManager,
    }

    fn fixture(
        next_if: impl Fn(i64) -> bool + Send + Sync + 'static,
        detach_if: impl Fn(i64) -> bool + Send + Sync + 'static,
    ) -> Fixture {
        let catalog = Arc::new(FakeCatalog::new());
        let ddl = Arc::new(RecordingDdlExecutor::with_catalog(catalog.clone()));
        let leases = Arc::new(InMemoryLeaseStore::new());

        let config = PartitioningConfig::default().with_lock_retry(TimingConfiguration::repeat(
            LockTiming::new(Duration::from_millis(100), Duration::from_millis(10)),
            3,
        ));

        let strategy = SlidingListStrategy::new(
            PartitionedModel::new("Event", "events").with_ignored_column("partition"),
            "partition",
            next_if,
            detach_if,
            catalog.clone(),
            ddl.clone(),
        )
        .unwrap()
        .with_config(&config);

        let manager =
            PartitionManager::new(Arc::new(strategy), ddl.clone(), leases.clone(), config);

        Fixture {
            catalog,
            ddl,
            leases,
            manager,
        }
    }

    #[tokio::test]
    async fn test_sync_creates_initial_partition() {
        let f = fixture(|_| false, |_| false);

        let report = f.manager.sync_partitions().await.unwrap().unwrap();

        assert_eq!(report.created.len(), 1);
        assert_eq!(report.created[0].value(), 1);
        assert!(report.detached.is_empty());
        assert_eq!(f.catalog.values("events"), vec![1]);
        assert_eq!(f.catalog.default_of("events", "partition").as_deref(), Some("1"));
        assert_eq!(f.manager.metrics().partitions_created.get(["events"]), 1);
    }

    #[tokio::test]
    async fn test_sync_advances_and_detaches() {
        let f = fixture(|value| value == 3, |value| value < 3);
        f.catalog.attach_values("events", &[1, 2, 3]);
        f.catalog.set_default("events", "partition", "3");

        let report = f.manager.sync_partitions().await.unwrap().unwrap();

        let created: Vec<i64> = report.created.iter().map(|p| p.value()).collect();
        let detached: Vec<i64> = report.detached.iter().map(|p| p.value()).collect();
        assert_eq!(created, vec![4]);
        assert_eq!(detached, vec![1, 2]);
        assert_eq!(f.catalog.values("events"), vec![3, 4]);
        assert_eq!(f.catalog.default_of("events", "partition").as_deref(), Some("4"));

        // Default moves before anything is detached.
        let statements = f.ddl.statements_matching("SET DEFAULT");
        assert_eq!(statements.len(), 1);
        let set_default = f.ddl.position_of("SET DEFAULT 4").unwrap();
        let first_detach = f.ddl.position_of("DETACH PARTITION").unwrap();
        assert!(set_default < first_detach);
    }

    #[tokio::test]
    async fn test_sync_is_idempotent() {
        let f = fixture(|_| false, |_| false);
        f.catalog.attach_values("events", &[1]);
        f.catalog.set_default("events", "partition", "1");

        let report = f.manager.sync_partitions().await.unwrap().unwrap();

        assert!(report.is_empty());
        assert!(f.ddl.statements().is_empty());
    }

    #[tokio::test]
    async fn test_sync_skipped_when_lease_held() {
        let f = fixture(|_| true, |_| false);
        let key = f.manager.lease_key();
        let _held = f.leases.try_obtain(&key, Duration::from_secs(60)).await.unwrap().unwrap();

        assert!(f.manager.sync_partitions().await.unwrap().is_none());
        assert!(f.ddl.statements().is_empty());
        assert_eq!(f.manager.metrics().lease_skipped.get(), 1);
        assert_eq!(key, "database/partitioning/events");
    }

    #[tokio::test(start_paused = true)]
    async fn test_sync_raises_when_create_exhausts_retries() {
        let f = fixture(|_| false, |_| false);
        f.ddl.always_fail("CREATE TABLE", DdlError::lock_timeout("lock timeout"));

        let err = f.manager.sync_partitions().await.unwrap_err();

        assert!(matches!(err, Error::LockRetriesExhausted { attempts: 3, .. }));
        assert!(f.ddl.statements_matching("SET DEFAULT").is_empty());
        // Lease is released even though the sync failed.
        assert!(f.leases.holder(&f.manager.lease_key()).await.unwrap().is_none());
    }
}
