//! Lease-guarded reindex coordination.
//!
//! Rebuilding an index concurrently is expensive, so at most one rebuild (or
//! leftover drop) runs at a time per lease key across every worker of the
//! cluster. A worker that cannot take the lease skips instead of waiting.
//!
//! # Perform Flow
//!
//! ```text
//! lease ──▶ create action ──▶ notify_start ──▶ rebuild
//!                                                 │
//!                              ┌──── error ───────┤
//!                              ▼                  ▼
//!                          fail(msg) ──▶ finish + update ──▶ notify_end ──▶ release
//! ```

use crate::config::{LeaseScope, ReindexConfig};
use crate::ddl::{DdlExecutor, LockRetryExecutor, LockRetryOutcome};
use crate::error::{Error, Result};
use crate::lease::{ExclusiveLeaseGuard, LeaseStore};
use crate::metrics::MaintenanceMetrics;
use crate::reindexing::action::ReindexAction;
use crate::reindexing::action_store::ActionStore;
use crate::reindexing::index::PostgresIndex;
use crate::reindexing::notifier::{LoggingNotifier, Notifier};
use crate::reindexing::rebuilder::IndexRebuilder;
use crate::reindexing::selection::IndexSelection;
use crate::types::{Clock, SystemClock};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Result of [`ReindexCoordinator::perform`].
#[derive(Debug, Clone, PartialEq)]
pub enum ReindexOutcome {
    /// The rebuild ran; the closed action is attached.
    Performed(ReindexAction),
    /// Another worker held the lease.
    Skipped,
}

impl ReindexOutcome {
    /// The action, if the rebuild ran.
    pub fn action(&self) -> Option<&ReindexAction> {
        match self {
            Self::Performed(action) => Some(action),
            Self::Skipped => None,
        }
    }
}

/// Result of [`ReindexCoordinator::drop_index`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropOutcome {
    /// The index no longer exists.
    Dropped,
    /// Every lock retry timed out; the index is left for a later run.
    Abandoned,
    /// Another worker held the lease.
    Skipped,
}

/// Leftover removal results, by index identifier.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanupReport {
    pub dropped: Vec<String>,
    pub abandoned: Vec<String>,
    pub skipped: Vec<String>,
}

/// Runs index rebuilds and leftover drops under a cluster-wide lease.
#[derive(Debug)]
pub struct ReindexCoordinator {
    lease: ExclusiveLeaseGuard,
    rebuilder: Arc<dyn IndexRebuilder>,
    retries: LockRetryExecutor,
    actions: Arc<dyn ActionStore>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    selection: IndexSelection,
    config: ReindexConfig,
    metrics: Arc<MaintenanceMetrics>,
}

impl ReindexCoordinator {
    /// Create a coordinator that logs notifications and uses the system clock.
    pub fn new(
        lease_store: Arc<dyn LeaseStore>,
        rebuilder: Arc<dyn IndexRebuilder>,
        ddl: Arc<dyn DdlExecutor>,
        actions: Arc<dyn ActionStore>,
        config: ReindexConfig,
    ) -> Self {
        let metrics = Arc::new(MaintenanceMetrics::new());
        Self {
            lease: ExclusiveLeaseGuard::new(lease_store),
            rebuilder,
            retries: LockRetryExecutor::with_metrics(ddl, Arc::clone(&metrics)),
            actions,
            notifier: Arc::new(LoggingNotifier),
            clock: Arc::new(SystemClock),
            selection: IndexSelection::new(config.selection.clone()),
            config,
            metrics,
        }
    }

    /// Send lifecycle events to `notifier`.
    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    /// Take action timestamps from `clock`.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Record into shared metrics.
    pub fn with_metrics(mut self, metrics: Arc<MaintenanceMetrics>) -> Self {
        let ddl = Arc::clone(self.retries.executor());
        self.retries = LockRetryExecutor::with_metrics(ddl, Arc::clone(&metrics));
        self.metrics = metrics;
        self
    }

    /// Metrics recorded by this coordinator.
    pub fn metrics(&self) -> &Arc<MaintenanceMetrics> {
        &self.metrics
    }

    /// Configuration in use.
    pub fn config(&self) -> &ReindexConfig {
        &self.config
    }

    /// The lease key serializing work on `index`.
    pub fn lease_key_for(&self, index: &PostgresIndex) -> String {
        match self.config.lease_scope {
            LeaseScope::PerDatabase => {
                format!("{}/{}", self.config.lease_namespace, index.database)
            }
            LeaseScope::PerIndex => format!(
                "{}/{}/{}",
                self.config.lease_namespace,
                index.database,
                index.identifier()
            ),
        }
    }

    /// Rebuild `index` if no other worker holds its lease.
    ///
    /// A failed rebuild is recorded on the action and still notified, then
    /// returned as [`Error::RebuildFailed`].
    pub async fn perform(&self, index: &PostgresIndex) -> Result<ReindexOutcome> {
        let key = self.lease_key_for(index);

        match self
            .lease
            .try_obtain_lease(&key, self.config.lease_timeout, || self.perform_locked(index))
            .await?
        {
            Some(result) => result.map(ReindexOutcome::Performed),
            None => {
                self.metrics.lease_skipped.inc();
                info!(
                    index = %index,
                    lease_key = %key,
                    "Reindex already running elsewhere, skipping"
                );
                Ok(ReindexOutcome::Skipped)
            }
        }
    }

    async fn perform_locked(&self, index: &PostgresIndex) -> Result<ReindexAction> {
        let mut action = ReindexAction::create_for(index, self.clock.now_ms());
        self.actions.create(&action).await?;
        self.metrics.reindex_started.inc();

        if let Err(e) = self.notifier.notify_start(&action).await {
            warn!(action_id = %action.id, error = %e, "Reindex start notification failed");
        }

        let rebuilt = self.rebuilder.rebuild(index).await;
        if let Err(e) = &rebuilt {
            error!(action_id = %action.id, index = %index, error = %e, "Index rebuild failed");
            action.fail(e.to_string());
        }

        let ondisk_size_end = match self.rebuilder.ondisk_size(index).await {
            Ok(size) => Some(size),
            Err(e) => {
                warn!(index = %index, error = %e, "Could not read index size after rebuild");
                None
            }
        };
        action.finish(self.clock.now_ms(), ondisk_size_end);
        let updated = self.actions.update(&action).await;

        if let Err(e) = self.notifier.notify_end(&action).await {
            warn!(action_id = %action.id, error = %e, "Reindex end notification failed");
        }

        if let Err(e) = rebuilt {
            self.metrics.reindex_failed.inc();
            if let Err(store_err) = updated {
                error!(
                    action_id = %action.id,
                    error = %store_err,
                    "Failed to record reindex failure"
                );
            }
            return Err(Error::RebuildFailed {
                index: index.identifier(),
                source: Box::new(e),
            });
        }

        updated?;
        self.metrics.reindex_finished.inc();
        Ok(action)
    }

    /// Drop `index` with `DROP INDEX CONCURRENTLY IF EXISTS`, giving up
    /// quietly when every lock retry times out.
    pub async fn drop_index(&self, index: &PostgresIndex) -> Result<DropOutcome> {
        let key = self.lease_key_for(index);
        let sql = format!("DROP INDEX CONCURRENTLY IF EXISTS {}", index.quoted_identifier());

        let outcome = self
            .lease
            .try_obtain_lease(&key, self.config.lease_timeout, || {
                self.retries.run(&sql, &self.config.remove_index_retry, false)
            })
            .await?;

        match outcome {
            None => {
                self.metrics.lease_skipped.inc();
                info!(
                    index = %index,
                    lease_key = %key,
                    "Index drop blocked by running reindex, skipping"
                );
                Ok(DropOutcome::Skipped)
            }
            Some(result) => match result? {
                LockRetryOutcome::Completed { attempts } => {
                    self.metrics.indexes_dropped.inc();
                    info!(index = %index, attempts, "Dropped index");
                    Ok(DropOutcome::Dropped)
                }
                LockRetryOutcome::Exhausted { attempts } => {
                    self.metrics.indexes_abandoned.inc();
                    warn!(index = %index, attempts, "Gave up dropping index after lock retries");
                    Ok(DropOutcome::Abandoned)
                }
            },
        }
    }

    /// Drop every leftover temporary index of an interrupted concurrent
    /// rebuild among `indexes`.
    pub async fn cleanup_leftovers(&self, indexes: &[PostgresIndex]) -> Result<CleanupReport> {
        let mut report = CleanupReport::default();

        for index in indexes.iter().filter(|i| i.is_leftover_temporary()) {
            let bucket = match self.drop_index(index).await? {
                DropOutcome::Dropped => &mut report.dropped,
                DropOutcome::Abandoned => &mut report.abandoned,
                DropOutcome::Skipped => &mut report.skipped,
            };
            bucket.push(index.identifier());
        }

        Ok(report)
    }

    /// Remove leftovers, then rebuild up to `maximum` of the most bloated
    /// indexes. Stops at the first failed rebuild.
    pub async fn automatic_reindexing(
        &self,
        indexes: &[PostgresIndex],
        maximum: usize,
    ) -> Result<Vec<ReindexOutcome>> {
        self.cleanup_leftovers(indexes).await?;

        let candidates = self
            .selection
            .select(indexes, self.actions.as_ref(), self.clock.now_ms(), maximum)
            .await?;

        info!(candidates = candidates.len(), maximum, "Selected indexes for rebuild");

        let mut outcomes = Vec::with_capacity(candidates.len());
        for index in &candidates {
            outcomes.push(self.perform(index).await?);
        }
        Ok(outcomes)
    }
}
