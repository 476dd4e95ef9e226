//! Partition management for list-partitioned tables.
//!
//! A [`PartitioningStrategy`] decides which partitions should exist; the
//! [`PartitionManager`] turns that decision into DDL. The catalog is the only
//! source of truth: strategies read it on every call and keep no state, so
//! two workers racing on the same table both compute the same answer and the
//! database's `IF NOT EXISTS` settles who creates the partition.
//!
//! # Example
//!
//! ```rust,ignore
//! use dbkeeper::partitioning::{PartitionManager, PartitionedModel, SlidingListStrategy};
//!
//! let model = PartitionedModel::new("DeletedRecord", "deleted_records")
//!     .with_ignored_column("partition");
//!
//! let strategy = SlidingListStrategy::new(
//!     model,
//!     "partition",
//!     |active| rows_in_partition(active) > 1_000_000,
//!     |value| all_rows_processed(value),
//!     catalog,
//!     ddl.clone(),
//! )?
//! .with_config(&config.partitioning);
//!
//! let manager = PartitionManager::new(Arc::new(strategy), ddl, leases, config.partitioning);
//! if let Some(report) = manager.sync_partitions().await? {
//!     println!("created {}, detached {}", report.created.len(), report.detached.len());
//! }
//! ```

mod catalog;
mod descriptor;
mod manager;
mod sliding_list;

pub use catalog::{CatalogPartition, PartitionCatalog, PartitionedModel};
pub use descriptor::{parse_partition_condition, PartitionDescriptor};
pub use manager::{PartitionManager, SyncReport};
pub use sliding_list::{PartitionPredicate, SlidingListStrategy};

use crate::error::Result;
use async_trait::async_trait;

/// Decides which partitions of one table should exist.
#[async_trait]
pub trait PartitioningStrategy: Send + Sync + std::fmt::Debug {
    /// Parent table name.
    fn table_name(&self) -> &str;

    /// Attached partitions, ascending by value.
    async fn current_partitions(&self) -> Result<Vec<PartitionDescriptor>>;

    /// Partitions to create now.
    async fn missing_partitions(&self) -> Result<Vec<PartitionDescriptor>>;

    /// Partitions that may be detached now.
    async fn extra_partitions(&self) -> Result<Vec<PartitionDescriptor>>;

    /// Hook run after missing partitions were created.
    async fn after_adding_partitions(&self) -> Result<()>;

    /// Whether an earlier [`after_adding_partitions`](Self::after_adding_partitions)
    /// was interrupted and left the table behind its newest partition.
    async fn default_lags_active(&self) -> Result<bool> {
        Ok(false)
    }
}
