//! Sliding list partitioning.
//!
//! The table is list-partitioned on an integer column whose values only ever
//! grow. The highest-valued partition is active: the column's default points
//! at it, so inserts that do not name the column land there. New partitions
//! are appended one at a time when `next_partition_if` says the active one is
//! done, and the oldest partitions are detached while `detach_partition_if`
//! holds for them.
//!
//! ```text
//!   detach prefix            kept              active
//!  ┌────────┬────────┐ ┌────────┬────────┐ ┌──────────┐ ┌ ─ ─ ─ ─ ┐
//!  │ p = 1  │ p = 2  │ │ p = 3  │ p = 4  │ │  p = 5   │   p = 6
//!  └────────┴────────┘ └────────┴────────┘ └──────────┘ └ ─ ─ ─ ─ ┘
//!                                            DEFAULT 5    missing
//! ```

use crate::config::PartitioningConfig;
use crate::ddl::{DdlExecutor, LockRetryExecutor, TimingConfiguration};
use crate::error::{ConfigError, PartitionError, Result};
use crate::metrics::MaintenanceMetrics;
use crate::partitioning::catalog::{PartitionCatalog, PartitionedModel};
use crate::partitioning::descriptor::PartitionDescriptor;
use crate::partitioning::PartitioningStrategy;
use crate::types::quote_ident;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use tracing::{error, info};

/// Predicate over a partition value.
pub type PartitionPredicate = Arc<dyn Fn(i64) -> bool + Send + Sync>;

/// Partitioning strategy for append-mostly tables keyed by an incrementing
/// integer.
pub struct SlidingListStrategy {
    model: PartitionedModel,
    partitioning_key: String,
    next_partition_if: PartitionPredicate,
    detach_partition_if: PartitionPredicate,
    catalog: Arc<dyn PartitionCatalog>,
    retries: LockRetryExecutor,
    lock_retry: TimingConfiguration,
    dynamic_schema: String,
    metrics: Arc<MaintenanceMetrics>,
}

impl fmt::Debug for SlidingListStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SlidingListStrategy")
            .field("model", &self.model)
            .field("partitioning_key", &self.partitioning_key)
            .field("dynamic_schema", &self.dynamic_schema)
            .finish_non_exhaustive()
    }
}

impl SlidingListStrategy {
    /// Create a strategy using the default [`PartitioningConfig`].
    ///
    /// Fails if the model still reads or writes `partitioning_key`: the
    /// column exists only for partitioning and is filled by its default.
    pub fn new<N, D>(
        model: PartitionedModel,
        partitioning_key: impl Into<String>,
        next_partition_if: N,
        detach_partition_if: D,
        catalog: Arc<dyn PartitionCatalog>,
        ddl: Arc<dyn DdlExecutor>,
    ) -> Result<Self>
    where
        N: Fn(i64) -> bool + Send + Sync + 'static,
        D: Fn(i64) -> bool + Send + Sync + 'static,
    {
        let partitioning_key = partitioning_key.into();

        if !model.ignores_column(&partitioning_key) {
            return Err(ConfigError::PartitioningColumnNotIgnored {
                model: model.name().to_string(),
                column: partitioning_key,
            }
            .into());
        }

        let config = PartitioningConfig::default();
        let metrics = Arc::new(MaintenanceMetrics::new());

        Ok(Self {
            model,
            partitioning_key,
            next_partition_if: Arc::new(next_partition_if),
            detach_partition_if: Arc::new(detach_partition_if),
            catalog,
            retries: LockRetryExecutor::with_metrics(ddl, Arc::clone(&metrics)),
            lock_retry: config.lock_retry,
            dynamic_schema: config.dynamic_schema,
            metrics,
        })
    }

    /// Take the partition schema and the lock retry timing from `config`.
    pub fn with_config(mut self, config: &PartitioningConfig) -> Self {
        self.dynamic_schema = config.dynamic_schema.clone();
        self.lock_retry = config.lock_retry.clone();
        self
    }

    /// Record consistency violations and lock retries into shared metrics.
    pub fn with_metrics(mut self, metrics: Arc<MaintenanceMetrics>) -> Self {
        let ddl = Arc::clone(self.retries.executor());
        self.retries = LockRetryExecutor::with_metrics(ddl, Arc::clone(&metrics));
        self.metrics = metrics;
        self
    }

    /// The model this strategy partitions.
    pub fn model(&self) -> &PartitionedModel {
        &self.model
    }

    /// The partitioning column.
    pub fn partitioning_key(&self) -> &str {
        &self.partitioning_key
    }

    /// The first partition of an empty table.
    pub fn initial_partition(&self) -> PartitionDescriptor {
        PartitionDescriptor::new(self.model.table_name(), 1, self.dynamic_schema.clone())
    }

    /// The partition after the active one.
    pub async fn next_partition(&self) -> Result<PartitionDescriptor> {
        let active = self.require_active_partition().await?;
        self.following(&active)
    }

    fn following(&self, active: &PartitionDescriptor) -> Result<PartitionDescriptor> {
        let value = active
            .value()
            .checked_add(1)
            .ok_or_else(|| PartitionError::ValueOverflow {
                table: self.model.table_name().to_string(),
                value: active.value(),
            })?;
        Ok(PartitionDescriptor::new(self.model.table_name(), value, self.dynamic_schema.clone()))
    }

    /// The highest-valued partition, the only one receiving inserts.
    pub async fn active_partition(&self) -> Result<Option<PartitionDescriptor>> {
        Ok(self.current_partitions().await?.pop())
    }

    /// Whether the table has no partitions yet.
    pub async fn no_partitions_exist(&self) -> Result<bool> {
        Ok(self.current_partitions().await?.is_empty())
    }

    async fn require_active_partition(&self) -> Result<PartitionDescriptor> {
        self.active_partition()
            .await?
            .ok_or_else(|| PartitionError::NoPartitions(self.model.table_name().to_string()).into())
    }

    /// The partitioning column's current default, as an integer.
    async fn current_default_value(&self) -> Result<i64> {
        self.read_default_value().await?.ok_or_else(|| {
            ConfigError::NoDefaultValue {
                model: self.model.name().to_string(),
                column: self.partitioning_key.clone(),
            }
            .into()
        })
    }

    async fn read_default_value(&self) -> Result<Option<i64>> {
        let table = self.model.table_name();

        let Some(raw) = self.catalog.column_default(table, &self.partitioning_key).await? else {
            return Ok(None);
        };

        parse_default_value(&raw).map(Some).ok_or_else(|| {
            ConfigError::InvalidDefaultValue {
                table: table.to_string(),
                column: self.partitioning_key.clone(),
                value: raw.clone(),
            }
            .into()
        })
    }

    fn set_default_sql(&self, value: i64) -> String {
        format!(
            "ALTER TABLE {} ALTER COLUMN {} SET DEFAULT {}",
            quote_ident(self.model.table_name()),
            quote_ident(&self.partitioning_key),
            value
        )
    }
}

/// Parse a column default such as `3` or `'3'::bigint`.
fn parse_default_value(raw: &str) -> Option<i64> {
    let expr = raw.trim();
    let expr = expr.split("::").next().unwrap_or(expr).trim();
    let expr = expr
        .strip_prefix('\'')
        .and_then(|rest| rest.strip_suffix('\''))
        .unwrap_or(expr);
    expr.parse().ok()
}

#[async_trait]
impl PartitioningStrategy for SlidingListStrategy {
    fn table_name(&self) -> &str {
        self.model.table_name()
    }

    async fn current_partitions(&self) -> Result<Vec<PartitionDescriptor>> {
        let table = self.model.table_name();

        let mut partitions = self
            .catalog
            .partitions_for_parent_table(table)
            .await?
            .into_iter()
            .map(|p| PartitionDescriptor::from_catalog(table, &p.schema, &p.name, &p.condition))
            .collect::<std::result::Result<Vec<_>, _>>()?;

        partitions.sort();
        Ok(partitions)
    }

    async fn missing_partitions(&self) -> Result<Vec<PartitionDescriptor>> {
        let current = self.current_partitions().await?;

        let missing = match current.last() {
            None => vec![self.initial_partition()],
            Some(active) if (self.next_partition_if)(active.value()) => {
                vec![self.following(active)?]
            }
            Some(_) => Vec::new(),
        };

        Ok(missing)
    }

    async fn extra_partitions(&self) -> Result<Vec<PartitionDescriptor>> {
        let current = self.current_partitions().await?;
        let default_value = self.current_default_value().await?;

        // The active partition is never a candidate.
        let retired = current.len().saturating_sub(1);
        let mut extra: Vec<PartitionDescriptor> = current
            .into_iter()
            .take(retired)
            .take_while(|p| (self.detach_partition_if)(p.value()))
            .collect();

        if extra.iter().any(|p| p.value() == default_value) {
            self.metrics.inconsistent_partitions.inc();
            error!(
                table = self.model.table_name(),
                partition_number = default_value,
                "Inconsistent partition detected: partition with value {} \
                 should not be detached because it's used as the default value",
                default_value
            );
            extra.retain(|p| p.value() != default_value);
        }

        Ok(extra)
    }

    async fn after_adding_partitions(&self) -> Result<()> {
        let active = self.require_active_partition().await?;
        self.retries
            .run(&self.set_default_sql(active.value()), &self.lock_retry, true)
            .await?;

        info!(
            table = self.model.table_name(),
            column = %self.partitioning_key,
            value = active.value(),
            "Partitioning column default moved to active partition"
        );
        Ok(())
    }

    async fn default_lags_active(&self) -> Result<bool> {
        let Some(active) = self.active_partition().await? else {
            return Ok(false);
        };

        // A missing default is left for `extra_partitions` to report.
        Ok(self
            .read_default_value()
            .await?
            .is_some_and(|value| value != active.value()))
    }
}
