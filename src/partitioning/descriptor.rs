//! Partition descriptors and list-bound parsing.

use crate::error::{ConditionParseError, PartitionError};
use crate::types::{quote_ident, quote_qualified};
use std::cmp::Ordering;
use std::fmt;

const LIST_BOUND_PREFIX: &str = "FOR VALUES IN";

/// Parse a single-value list bound as the catalog prints it.
///
/// Accepts `FOR VALUES IN ('3')` and `FOR VALUES IN (3)`.
pub fn parse_partition_condition(condition: &str) -> Result<i64, ConditionParseError> {
    let condition = condition.trim();

    let has_prefix = condition
        .get(..LIST_BOUND_PREFIX.len())
        .is_some_and(|head| head.eq_ignore_ascii_case(LIST_BOUND_PREFIX));
    if !has_prefix {
        return Err(ConditionParseError::NoBound);
    }

    let list = condition[LIST_BOUND_PREFIX.len()..].trim();
    let inner = list
        .strip_prefix('(')
        .and_then(|rest| rest.strip_suffix(')'))
        .ok_or_else(|| ConditionParseError::Malformed(list.to_string()))?;

    let values: Vec<&str> = inner.split(',').map(str::trim).collect();
    if values.len() > 1 {
        return Err(ConditionParseError::MultipleValues(values.len()));
    }

    let raw = values[0];
    let unquoted = raw
        .strip_prefix('\'')
        .and_then(|rest| rest.strip_suffix('\''))
        .unwrap_or(raw);

    unquoted
        .parse::<i64>()
        .map_err(|_| ConditionParseError::Malformed(raw.to_string()))
}

/// One partition of a list-partitioned table holding a single integer value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PartitionDescriptor {
    table: String,
    value: i64,
    partition_name: String,
    schema: String,
}

impl PartitionDescriptor {
    /// Describe a partition that may not exist yet, named `{table}_{value}`.
    pub fn new(table: impl Into<String>, value: i64, schema: impl Into<String>) -> Self {
        let table = table.into();
        let partition_name = format!("{}_{}", table, value);
        Self {
            table,
            value,
            partition_name,
            schema: schema.into(),
        }
    }

    /// Describe an attached partition from its catalog entry.
    pub fn from_catalog(
        table: &str,
        schema: &str,
        partition_name: &str,
        condition: &str,
    ) -> Result<Self, PartitionError> {
        let value =
            parse_partition_condition(condition).map_err(|reason| PartitionError::CatalogParse {
                table: table.to_string(),
                partition: partition_name.to_string(),
                condition: condition.to_string(),
                reason,
            })?;

        Ok(Self {
            table: table.to_string(),
            value,
            partition_name: partition_name.to_string(),
            schema: schema.to_string(),
        })
    }

    /// Parent table name.
    pub fn table(&self) -> &str {
        &self.table
    }

    /// The single list value this partition holds.
    pub fn value(&self) -> i64 {
        self.value
    }

    /// Partition table name.
    pub fn partition_name(&self) -> &str {
        &self.partition_name
    }

    /// Schema of the partition table.
    pub fn schema(&self) -> &str {
        &self.schema
    }

    /// The partition following this one, in the same schema.
    pub fn next(&self) -> Result<Self, PartitionError> {
        let value = self
            .value
            .checked_add(1)
            .ok_or_else(|| PartitionError::ValueOverflow {
                table: self.table.clone(),
                value: self.value,
            })?;
        Ok(Self::new(self.table.clone(), value, self.schema.clone()))
    }

    /// Statement creating this partition.
    pub fn to_create_sql(&self) -> String {
        format!(
            "CREATE TABLE IF NOT EXISTS {} PARTITION OF {} FOR VALUES IN ({})",
            quote_qualified(&self.schema, &self.partition_name),
            quote_ident(&self.table),
            self.value
        )
    }

    /// Statement detaching this partition from its parent.
    pub fn to_detach_sql(&self) -> String {
        format!(
            "ALTER TABLE {} DETACH PARTITION {}",
            quote_ident(&self.table),
            quote_qualified(&self.schema, &self.partition_name)
        )
    }
}

impl Ord for PartitionDescriptor {
    fn cmp(&self, other: &Self) -> Ordering {
        self.table
            .cmp(&other.table)
            .then(self.value.cmp(&other.value))
            .then_with(|| self.partition_name.cmp(&other.partition_name))
    }
}

impl PartialOrd for PartitionDescriptor {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for PartitionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{} ({})", self.schema, self.partition_name, self.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_quoted_and_bare_values() {
        assert_eq!(parse_partition_condition("FOR VALUES IN ('1')"), Ok(1));
        assert_eq!(parse_partition_condition("FOR VALUES IN (42)"), Ok(42));
        assert_eq!(parse_partition_condition("  for values in ( '7' ) "), Ok(7));
    }

    #[test]
    fn test_parse_distinguishes_failures() {
        assert_eq!(
            parse_partition_condition("FOR VALUES FROM ('2021-01-01') TO ('2021-02-01')"),
            Err(ConditionParseError::NoBound)
        );
        assert_eq!(parse_partition_condition("DEFAULT"), Err(ConditionParseError::NoBound));
        assert_eq!(parse_partition_condition(""), Err(ConditionParseError::NoBound));
        assert_eq!(
            parse_partition_condition("FOR VALUES IN ('1', '2')"),
            Err(ConditionParseError::MultipleValues(2))
        );
        assert_eq!(
            parse_partition_condition("FOR VALUES IN ('abc')"),
            Err(ConditionParseError::Malformed("'abc'".to_string()))
        );
        assert_eq!(
            parse_partition_condition("FOR VALUES IN 3"),
            Err(ConditionParseError::Malformed("3".to_string()))
        );
        assert_eq!(
            parse_partition_condition("FOR VALUES IN ()"),
            Err(ConditionParseError::Malformed(String::new()))
        );
    }

    #[test]
    fn test_from_catalog_reports_partition() {
        let err = PartitionDescriptor::from_catalog(
            "events",
            "partitions_dynamic",
            "events_x",
            "FOR VALUES IN ('x')",
        )
        .unwrap_err();

        match err {
            PartitionError::CatalogParse {
                table, partition, reason, ..
            } => {
                assert_eq!(table, "events");
                assert_eq!(partition, "events_x");
                assert!(matches!(reason, ConditionParseError::Malformed(_)));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_ordering_by_value() {
        let mut partitions = vec![
            PartitionDescriptor::new("events", 10, "partitions_dynamic"),
            PartitionDescriptor::new("events", 2, "partitions_dynamic"),
            PartitionDescriptor::new("events", 3, "partitions_dynamic"),
        ];
        partitions.sort();

        let values: Vec<i64> = partitions.iter().map(PartitionDescriptor::value).collect();
        assert_eq!(values, vec![2, 3, 10]);
    }

    #[test]
    fn test_ddl_statements() {
        let partition = PartitionDescriptor::new("events", 4, "partitions_dynamic");

        assert_eq!(partition.partition_name(), "events_4");
        assert_eq!(
            partition.to_create_sql(),
            concat!(
                "CREATE TABLE IF NOT EXISTS \"partitions_dynamic\".\"events_4\" ",
                "PARTITION OF \"events\" FOR VALUES IN (4)"
            )
        );
        assert_eq!(
            partition.to_detach_sql(),
            "ALTER TABLE \"events\" DETACH PARTITION \"partitions_dynamic\".\"events_4\""
        );
        assert_eq!(partition.next().unwrap().value(), 5);
    }

    #[test]
    fn test_next_at_maximum_value() {
        let partition = PartitionDescriptor::new("events", i64::MAX, "partitions_dynamic");

        let err = partition.next().unwrap_err();
        assert!(matches!(err, PartitionError::ValueOverflow { value: i64::MAX, .. }));
    }
}
