//! DDL execution against the database.
//!
//! The crate never talks to a database driver directly. Statements go through
//! a [`DdlExecutor`], and anything that may block on a table lock goes through
//! the [`LockRetryExecutor`], which bounds how long each attempt may wait for
//! the lock and how long to back off between attempts.
//!
//! ```text
//!   caller ──► LockRetryExecutor ──► SET lock_timeout ──► DdlExecutor
//!                   ▲      │                                  │
//!                   │      └──── 55P03 lock_not_available ◄───┘
//!                   └── sleep(timing[i].sleep), next timing entry
//! ```

mod lock_retries;

pub use lock_retries::{LockRetryExecutor, LockRetryOutcome, LockTiming, TimingConfiguration};

use crate::error::DdlError;
use async_trait::async_trait;

/// Executes raw SQL statements outside of a transaction.
///
/// Implementations wrap a single database connection. Statements such as
/// `DROP INDEX CONCURRENTLY` cannot run inside a transaction block, so the
/// executor must not open one implicitly.
#[async_trait]
pub trait DdlExecutor: Send + Sync + std::fmt::Debug {
    /// Execute one statement.
    async fn execute(&self, sql: &str) -> std::result::Result<(), DdlError>;
}
