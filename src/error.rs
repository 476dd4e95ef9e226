//! Error types for partition maintenance and reindex coordination.

use thiserror::Error;

/// Result type alias for maintenance operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the crate.
#[derive(Error, Debug)]
pub enum Error {
    /// Setup mistakes that must be fixed before any scheduling runs.
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// Partition catalog errors.
    #[error("partitioning error: {0}")]
    Partitioning(#[from] PartitionError),

    /// A DDL statement failed.
    #[error("ddl error: {0}")]
    Ddl(#[from] DdlError),

    /// Every configured lock-retry attempt hit a lock timeout.
    #[error("lock retries exhausted after {attempts} attempts: {source}")]
    LockRetriesExhausted {
        attempts: usize,
        #[source]
        source: DdlError,
    },

    /// Lease store errors.
    #[error("lease error: {0}")]
    Lease(#[from] LeaseError),

    /// Reindex action persistence errors.
    #[error("action store error: {0}")]
    ActionStore(#[from] ActionStoreError),

    /// The online index rebuild failed.
    #[error("rebuild of index {index} failed: {source}")]
    RebuildFailed {
        index: String,
        #[source]
        source: Box<Error>,
    },

    /// Notifier errors. Only ever logged by the coordinator.
    #[error("notification failed: {0}")]
    Notification(String),
}

/// Configuration errors. Never retried.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// The partitioning column is still part of the model's column set.
    #[error("add {column} to {model}.ignored_columns to use it with SlidingListStrategy")]
    PartitioningColumnNotIgnored { model: String, column: String },

    /// The partitioning column has no default value in the catalog.
    #[error("no default value found for the {column} column within {model}")]
    NoDefaultValue { model: String, column: String },

    /// The partitioning column default is not an integer.
    #[error("default value {value:?} of {table}.{column} is not an integer")]
    InvalidDefaultValue {
        table: String,
        column: String,
        value: String,
    },

    /// A timing configuration with no entries.
    #[error("timing configuration must contain at least one entry")]
    EmptyTimingConfiguration,
}

/// Why a stored partition condition could not be parsed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConditionParseError {
    /// No `FOR VALUES IN (...)` clause present.
    #[error("no list bound in partition condition")]
    NoBound,

    /// More than one value in the list bound.
    #[error("expected a single list value, found {0}")]
    MultipleValues(usize),

    /// The bound value is not an integer.
    #[error("malformed list bound value {0:?}")]
    Malformed(String),
}

/// Partition catalog errors.
#[derive(Error, Debug)]
pub enum PartitionError {
    /// A partition's stored condition has an unexpected shape.
    #[error("unknown partition definition for {partition} of {table}: {condition:?} ({reason})")]
    CatalogParse {
        table: String,
        partition: String,
        condition: String,
        #[source]
        reason: ConditionParseError,
    },

    /// The catalog could not be read.
    #[error("catalog read failed for {table}: {reason}")]
    CatalogRead { table: String, reason: String },

    /// An operation needed an active partition but the table has none.
    #[error("table {0} has no partitions")]
    NoPartitions(String),

    /// The active partition already holds the largest possible value.
    #[error("partition value {value} of {table} cannot be advanced")]
    ValueOverflow { table: String, value: i64 },
}

/// Error reported by the database for a single DDL statement.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct DdlError {
    /// SQLSTATE code, when the driver reported one.
    pub sqlstate: Option<String>,
    /// Database error message.
    pub message: String,
}

/// SQLSTATE `lock_not_available`.
pub const LOCK_NOT_AVAILABLE: &str = "55P03";

impl DdlError {
    /// Create an error with a SQLSTATE code.
    pub fn new(sqlstate: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            sqlstate: Some(sqlstate.into()),
            message: message.into(),
        }
    }

    /// Create an error with no SQLSTATE (connection loss, driver errors).
    pub fn other(message: impl Into<String>) -> Self {
        Self {
            sqlstate: None,
            message: message.into(),
        }
    }

    /// A `lock_timeout` expiry.
    pub fn lock_timeout(message: impl Into<String>) -> Self {
        Self::new(LOCK_NOT_AVAILABLE, message)
    }

    /// Whether the statement failed because a conflicting lock was held.
    pub fn is_lock_timeout(&self) -> bool {
        self.sqlstate.as_deref() == Some(LOCK_NOT_AVAILABLE)
    }
}

/// Lease store errors.
#[derive(Error, Debug)]
pub enum LeaseError {
    /// The backing store is unreachable.
    #[error("lease store unavailable: {0}")]
    Unavailable(String),
}

/// Reindex action persistence errors.
#[derive(Error, Debug)]
pub enum ActionStoreError {
    /// Encoding or decoding an action failed.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Filesystem error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Update of an action that was never created.
    #[error("action not found: {0}")]
    NotFound(uuid::Uuid),
}

impl From<bincode::Error> for Error {
    fn from(e: bincode::Error) -> Self {
        Error::ActionStore(ActionStoreError::Serialization(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lock_timeout_classification() {
        let timeout = DdlError::lock_timeout("canceling statement due to lock timeout");
        assert!(timeout.is_lock_timeout());
        assert!(!DdlError::new("42P01", "relation does not exist").is_lock_timeout());
        assert!(!DdlError::other("connection reset").is_lock_timeout());
    }

    #[test]
    fn test_config_error_message() {
        let err = ConfigError::PartitioningColumnNotIgnored {
            model: "Event".to_string(),
            column: "partition".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "add partition to Event.ignored_columns to use it with SlidingListStrategy"
        );
    }
}
