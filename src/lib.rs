//! Partition and index maintenance for PostgreSQL, coordinated across workers.
//!
//! This crate provides two background maintenance jobs that many workers may
//! run at once against the same database:
//! - **Sliding list partitioning** for append-mostly tables keyed by an
//!   ever-growing integer column
//! - **Reindex coordination** that rebuilds bloated indexes one at a time
//!   under a cluster-wide lease
//!
//! # Features
//!
//! - Catalog-driven partition decisions, no cached state
//! - Partition DDL retried through short `lock_timeout` windows
//! - Lease-guarded rebuilds and leftover index cleanup with guaranteed release
//! - Persisted reindex history driving candidate selection
//!
//! # Example
//!
//! ```rust,ignore
//! use dbkeeper::{MaintenanceConfig, PartitionManager, ReindexCoordinator, SlidingListStrategy};
//! use dbkeeper::partitioning::PartitionedModel;
//! use std::sync::Arc;
//!
//! let config = MaintenanceConfig::default();
//!
//! // Partitions
//! let strategy = SlidingListStrategy::new(
//!     PartitionedModel::new("DeletedRecord", "deleted_records").with_ignored_column("partition"),
//!     "partition",
//!     |active| partition_is_full(active),
//!     |value| partition_is_processed(value),
//!     catalog.clone(),
//!     ddl.clone(),
//! )?
//! .with_config(&config.partitioning);
//! let manager = PartitionManager::new(Arc::new(strategy), ddl.clone(), leases.clone(), config.partitioning);
//! manager.sync_partitions().await?;
//!
//! // Indexes
//! let coordinator = ReindexCoordinator::new(leases, rebuilder, ddl, actions, config.reindex);
//! coordinator.automatic_reindexing(&indexes, 2).await?;
//! ```
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │              External scheduler              │
//! └─────────────────────────────────────────────┘
//!           │                         │
//!           ▼                         ▼
//! ┌───────────────────┐     ┌───────────────────┐
//! │ PartitionManager  │     │ReindexCoordinator │
//! │ SlidingListStrat. │     │ IndexSelection    │
//! └───────────────────┘     └───────────────────┘
//!     │         │               │           │
//!     ▼         ▼               ▼           ▼
//! ┌────────┐ ┌──────────────────────┐ ┌──────────┐
//! │Catalog │ │ LockRetryExecutor    │ │ Rebuilder│
//! └────────┘ │ ExclusiveLeaseGuard  │ │ Actions  │
//!            └──────────────────────┘ └──────────┘
//! ```
//!
//! # Concurrency Model
//!
//! - **Mutual exclusion**: only through the [`lease::LeaseStore`]; a worker
//!   that cannot take a lease skips the job
//! - **Idempotence**: partition creation uses `IF NOT EXISTS`, index drops
//!   use `IF EXISTS`

pub mod config;
pub mod ddl;
pub mod error;
pub mod lease;
pub mod metrics;
pub mod partitioning;
pub mod reindexing;
pub mod testing;
pub mod types;

// Re-export main types for convenience
pub use config::{
    LeaseScope, MaintenanceConfig, PartitioningConfig, ReindexConfig, SelectionConfig,
};
pub use error::{Error, Result};
pub use types::{Clock, SystemClock, TimestampMs};

// Re-export DDL types
pub use ddl::{DdlExecutor, LockRetryExecutor, LockRetryOutcome, LockTiming, TimingConfiguration};

// Re-export lease types
pub use lease::{ExclusiveLeaseGuard, InMemoryLeaseStore, LeaseGuard, LeaseStore, LeaseToken};

// Re-export partitioning types
pub use partitioning::{
    PartitionCatalog, PartitionDescriptor, PartitionManager, PartitioningStrategy,
    SlidingListStrategy, SyncReport,
};

// Re-export reindexing types
pub use reindexing::{
    ActionStore, DropOutcome, FileActionStore, IndexRebuilder, IndexSelection,
    InMemoryActionStore, Notifier, PostgresIndex, ReindexAction, ReindexCoordinator,
    ReindexOutcome, ReindexState,
};

// Re-export metrics types
pub use metrics::{Counter, LabeledCounter, MaintenanceMetrics, MetricsSnapshot};
