//! Cluster-wide leases.
//!
//! A lease is a named, time-bounded mutual-exclusion token held in an
//! external store. Workers on any host that share the store see the same
//! leases, so a lease key serializes one operation across the whole cluster.
//!
//! # Example
//!
//! ```rust,ignore
//! use dbkeeper::lease::{ExclusiveLeaseGuard, InMemoryLeaseStore};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let guard = ExclusiveLeaseGuard::new(Arc::new(InMemoryLeaseStore::new()));
//!
//! match guard.try_obtain_lease("database/partitioning/events", Duration::from_secs(60), || async {
//!     // only one worker runs this at a time
//! }).await? {
//!     Some(()) => println!("ran"),
//!     None => println!("another worker holds the lease"),
//! }
//! ```

mod guard;
mod store;

pub use guard::{ExclusiveLeaseGuard, LeaseGuard};
pub use store::{InMemoryLeaseStore, LeaseStore, LeaseToken};
