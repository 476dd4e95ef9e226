//! Testing utilities for partition and reindex maintenance.
//!
//! In-memory stand-ins for every external collaborator, so partition syncs
//! and reindex runs can be exercised without a database or lease service:
//!
//! - [`FakeCatalog`] holds partitions and column defaults.
//! - [`RecordingDdlExecutor`] records statements, fails on request and, when
//!   given a catalog, applies partition DDL to it.
//! - [`ScriptedRebuilder`] rebuilds instantly or after a delay and fails
//!   scripted indexes.
//! - [`RecordingNotifier`] records lifecycle events.
//! - [`ManualClock`] only moves when told to.
//!
//! # Example
//!
//! ```rust,ignore
//! use dbkeeper::testing::{FakeCatalog, RecordingDdlExecutor};
//! use dbkeeper::error::DdlError;
//!
//! let catalog = Arc::new(FakeCatalog::new());
//! catalog.attach_values("events", &[1, 2, 3]);
//! catalog.set_default("events", "partition", "3");
//!
//! let ddl = Arc::new(RecordingDdlExecutor::with_catalog(catalog.clone()));
//! ddl.fail_times("DETACH PARTITION", 2, DdlError::lock_timeout("lock timeout"));
//! ```

mod database;
mod reindex;


pub use database::{FakeCatalog, RecordingDdlExecutor, DYNAMIC_SCHEMA};
pub use reindex::{ManualClock, NotificationEvent, RecordingNotifier, ScriptedRebuilder};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Clock;
    use std::time::Duration;

    #[test]
    fn test_manual_clock() {
        let clock = ManualClock::new(1_000);
        clock.advance(Duration::from_secs(2));
        assert_eq!(clock.now_ms(), 3_000);

        clock.set(10);
        assert_eq!(clock.now_ms(), 10);
    }
}
