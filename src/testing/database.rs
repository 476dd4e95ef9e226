//! In-memory stand-ins for the database catalog and DDL execution.

use crate::ddl::DdlExecutor;
use crate::error::{DdlError, PartitionError, Result};
use crate::partitioning::{parse_partition_condition, CatalogPartition, PartitionCatalog};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Schema used by [`FakeCatalog::attach_values`].
pub const DYNAMIC_SCHEMA: &str = "partitions_dynamic";

/// Catalog holding partitions and column defaults in memory.
#[derive(Debug, Default)]
pub struct FakeCatalog {
    partitions: RwLock<HashMap<String, Vec<CatalogPartition>>>,
    defaults: RwLock<HashMap<(String, String), String>>,
    unavailable: AtomicBool,
}

impl FakeCatalog {
    /// Create an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach `{table}_{value}` partitions in the dynamic schema.
    pub fn attach_values(&self, table: &str, values: &[i64]) {
        for value in values {
            self.attach(
                table,
                DYNAMIC_SCHEMA,
                format!("{}_{}", table, value),
                format!("FOR VALUES IN ('{}')", value),
            );
        }
    }

    /// Attach a partition with an arbitrary bound expression. No-op if a
    /// partition with the same schema and name is already attached.
    pub fn attach(
        &self,
        table: impl Into<String>,
        schema: impl Into<String>,
        name: impl Into<String>,
        condition: impl Into<String>,
    ) {
        let partition = CatalogPartition::new(schema, name, condition);
        let mut partitions = self.partitions.write();
        let attached = partitions.entry(table.into()).or_default();

        if !attached
            .iter()
            .any(|p| p.schema == partition.schema && p.name == partition.name)
        {
            attached.push(partition);
        }
    }

    /// Detach a partition. Returns whether it was attached.
    pub fn detach(&self, table: &str, schema: &str, name: &str) -> bool {
        let mut partitions = self.partitions.write();
        let Some(attached) = partitions.get_mut(table) else {
            return false;
        };

        let before = attached.len();
        attached.retain(|p| !(p.schema == schema && p.name == name));
        attached.len() != before
    }

    /// Set a column default expression.
    pub fn set_default(&self, table: &str, column: &str, value: impl Into<String>) {
        self.defaults
            .write()
            .insert((table.to_string(), column.to_string()), value.into());
    }

    /// Column default expression, if set.
    pub fn default_of(&self, table: &str, column: &str) -> Option<String> {
        self.defaults
            .read()
            .get(&(table.to_string(), column.to_string()))
            .cloned()
    }

    /// Values of the attached partitions with a parseable bound, ascending.
    pub fn values(&self, table: &str) -> Vec<i64> {
        let mut values: Vec<i64> = self
            .partitions
            .read()
            .get(table)
            .map(|attached| {
                attached
                    .iter()
                    .filter_map(|p| parse_partition_condition(&p.condition).ok())
                    .collect()
            })
            .unwrap_or_default();
        values.sort_unstable();
        values
    }

    /// Make every catalog read fail.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self, table: &str) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(PartitionError::CatalogRead {
                table: table.to_string(),
                reason: "connection refused".to_string(),
            }
            .into());
        }
        Ok(())
    }
}

#[async_trait]
impl PartitionCatalog for FakeCatalog {
    async fn partitions_for_parent_table(&self, table: &str) -> Result<Vec<CatalogPartition>> {
        self.check_available(table)?;
        Ok(self.partitions.read().get(table).cloned().unwrap_or_default())
    }

    async fn column_default(&self, table: &str, column: &str) -> Result<Option<String>> {
        self.check_available(table)?;
        Ok(self.default_of(table, column))
    }
}

#[derive(Debug)]
struct ScriptedFailure {
    pattern: String,
    remaining: Option<usize>,
    error: DdlError,
}

/// DDL executor that records every statement and fails on request.
///
/// With a catalog attached, successful partition DDL is applied to it so
/// that later catalog reads observe the change.
#[derive(Debug, Default)]
pub struct RecordingDdlExecutor {
    statements: RwLock<Vec<String>>,
    failures: RwLock<Vec<ScriptedFailure>>,
    catalog: Option<Arc<FakeCatalog>>,
}

impl RecordingDdlExecutor {
    /// Create an executor that accepts every statement.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an executor that applies partition DDL to `catalog`.
    pub fn with_catalog(catalog: Arc<FakeCatalog>) -> Self {
        Self {
            catalog: Some(catalog),
            ..Self::default()
        }
    }

    /// Fail the next `times` statements containing `pattern`.
    pub fn fail_times(&self, pattern: impl Into<String>, times: usize, error: DdlError) {
        self.failures.write().push(ScriptedFailure {
            pattern: pattern.into(),
            remaining: Some(times),
            error,
        });
    }

    /// Fail every statement containing `pattern`.
    pub fn always_fail(&self, pattern: impl Into<String>, error: DdlError) {
        self.failures.write().push(ScriptedFailure {
            pattern: pattern.into(),
            remaining: None,
            error,
        });
    }

    /// Remove all scripted failures.
    pub fn clear_failures(&self) {
        self.failures.write().clear();
    }

    /// Every statement executed, including failed ones.
    pub fn statements(&self) -> Vec<String> {
        self.statements.read().clone()
    }

    /// Statements containing `pattern`.
    pub fn statements_matching(&self, pattern: &str) -> Vec<String> {
        self.statements
            .read()
            .iter()
            .filter(|s| s.contains(pattern))
            .cloned()
            .collect()
    }

    /// Number of statements containing `pattern`.
    pub fn count_matching(&self, pattern: &str) -> usize {
        self.statements.read().iter().filter(|s| s.contains(pattern)).count()
    }

    /// Position of the first statement containing `pattern`.
    pub fn position_of(&self, pattern: &str) -> Option<usize> {
        self.statements.read().iter().position(|s| s.contains(pattern))
    }

    fn scripted_failure(&self, sql: &str) -> Option<DdlError> {
        let mut failures = self.failures.write();
        let failure = failures
            .iter_mut()
            .find(|f| sql.contains(&f.pattern) && f.remaining != Some(0))?;

        if let Some(remaining) = failure.remaining.as_mut() {
            *remaining -= 1;
        }
        Some(failure.error.clone())
    }

    fn apply(catalog: &FakeCatalog, sql: &str) {
        if let Some(rest) = sql.strip_prefix("CREATE TABLE IF NOT EXISTS ") {
            let Some((qualified, rest)) = rest.split_once(" PARTITION OF ") else {
                return;
            };
            let Some((table, bound)) = rest.split_once(" FOR VALUES IN ") else {
                return;
            };
            if let Some((schema, name)) = split_qualified(qualified) {
                catalog.attach(unquote(table), schema, name, format!("FOR VALUES IN {}", bound));
            }
        } else if let Some(rest) = sql.strip_prefix("ALTER TABLE ") {
            if let Some((table, qualified)) = rest.split_once(" DETACH PARTITION ") {
                if let Some((schema, name)) = split_qualified(qualified) {
                    catalog.detach(&unquote(table), &schema, &name);
                }
            } else if let Some((table, rest)) = rest.split_once(" ALTER COLUMN ") {
                if let Some((column, value)) = rest.split_once(" SET DEFAULT ") {
                    catalog.set_default(&unquote(table), &unquote(column), value.trim());
                }
            }
        }
    }
}

fn unquote(ident: &str) -> String {
    let ident = ident.trim();
    ident
        .strip_prefix('"')
        .and_then(|rest| rest.strip_suffix('"'))
        .unwrap_or(ident)
        .replace("\"\"", "\"")
}

fn split_qualified(qualified: &str) -> Option<(String, String)> {
    let (schema, name) = qualified.trim().split_once("\".\"")?;
    Some((unquote(&format!("{}\"", schema)), unquote(&format!("\"{}", name))))
}

#[async_trait]
impl DdlExecutor for RecordingDdlExecutor {
    async fn execute(&self, sql: &str) -> std::result::Result<(), DdlError> {
        self.statements.write().push(sql.to_string());

        if let Some(error) = self.scripted_failure(sql) {
            return Err(error);
        }

        if let Some(catalog) = &self.catalog {
            Self::apply(catalog, sql);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::partitioning::PartitionDescriptor;

    #[tokio::test]
    async fn test_applies_partition_ddl_to_catalog() {
        let catalog = Arc::new(FakeCatalog::new());
        let ddl = RecordingDdlExecutor::with_catalog(catalog.clone());
        let partition = PartitionDescriptor::new("events", 1, DYNAMIC_SCHEMA);

        ddl.execute(&partition.to_create_sql()).await.unwrap();
        ddl.execute("ALTER TABLE \"events\" ALTER COLUMN \"partition\" SET DEFAULT 1")
            .await
            .unwrap();
        assert_eq!(catalog.values("events"), vec![1]);
        assert_eq!(catalog.default_of("events", "partition").as_deref(), Some("1"));

        ddl.execute(&partition.to_detach_sql()).await.unwrap();
        assert!(catalog.values("events").is_empty());
    }

    #[tokio::test]
    async fn test_scripted_failures() {
        let ddl = RecordingDdlExecutor::new();
        ddl.fail_times("DROP", 1, DdlError::lock_timeout("lock timeout"));

        assert!(ddl.execute("DROP INDEX x").await.is_err());
        assert!(ddl.execute("DROP INDEX x").await.is_ok());
        assert_eq!(ddl.count_matching("DROP"), 2);
    }

    #[tokio::test]
    async fn test_unavailable_catalog() {
        let catalog = FakeCatalog::new();
        catalog.set_unavailable(true);

        assert!(catalog.partitions_for_parent_table("events").await.is_err());
    }
}
