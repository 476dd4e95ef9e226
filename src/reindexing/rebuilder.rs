//! Online index rebuild boundary.

use crate::error::Result;
use crate::reindexing::index::PostgresIndex;
use async_trait::async_trait;

/// Rebuilds an index without blocking writes, e.g. `REINDEX INDEX CONCURRENTLY`.
///
/// The rebuild holds no lease of its own; callers serialize it through the
/// coordinator.
#[async_trait]
pub trait IndexRebuilder: Send + Sync + std::fmt::Debug {
    /// Rebuild `index`. Errors mark the reindex action failed.
    async fn rebuild(&self, index: &PostgresIndex) -> Result<()>;

    /// Current on-disk size of `index` in bytes.
    async fn ondisk_size(&self, index: &PostgresIndex) -> Result<u64>;
}
