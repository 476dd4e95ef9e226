//! Catalog access for partitioned tables.

use crate::error::Result;
use async_trait::async_trait;
use std::collections::BTreeSet;

/// A partition as listed by the catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogPartition {
    /// Schema of the partition table.
    pub schema: String,
    /// Partition table name.
    pub name: String,
    /// Partition bound expression, e.g. `FOR VALUES IN ('3')`.
    pub condition: String,
}

impl CatalogPartition {
    /// Create a catalog entry.
    pub fn new(
        schema: impl Into<String>,
        name: impl Into<String>,
        condition: impl Into<String>,
    ) -> Self {
        Self {
            schema: schema.into(),
            name: name.into(),
            condition: condition.into(),
        }
    }
}

/// Read-only view of the database catalog.
///
/// Every call reads live state; implementations must not cache.
#[async_trait]
pub trait PartitionCatalog: Send + Sync + std::fmt::Debug {
    /// Partitions currently attached to `table`, in any order.
    async fn partitions_for_parent_table(&self, table: &str) -> Result<Vec<CatalogPartition>>;

    /// The column's default expression as stored in the catalog, if any.
    async fn column_default(&self, table: &str, column: &str) -> Result<Option<String>>;
}

/// The application model a partitioned table belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionedModel {
    name: String,
    table_name: String,
    ignored_columns: BTreeSet<String>,
}

impl PartitionedModel {
    /// Create a model for `table_name`.
    pub fn new(name: impl Into<String>, table_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            table_name: table_name.into(),
            ignored_columns: BTreeSet::new(),
        }
    }

    /// Exclude a column from the model's read/write column set.
    pub fn with_ignored_column(mut self, column: impl Into<String>) -> Self {
        self.ignored_columns.insert(column.into());
        self
    }

    /// Model name, used in error messages.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Parent table name.
    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    /// Whether the model never reads or writes `column`.
    pub fn ignores_column(&self, column: &str) -> bool {
        self.ignored_columns.contains(column)
    }
}
