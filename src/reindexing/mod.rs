//! Cluster-wide index rebuild coordination.
//!
//! Every worker may call [`ReindexCoordinator::perform`]; the lease store
//! makes sure only one rebuild per lease key runs at a time and the others
//! skip. Each attempt leaves a [`ReindexAction`] behind, which later runs use
//! to avoid rebuilding the same index again too soon.
//!
//! # Example
//!
//! ```rust,ignore
//! use dbkeeper::reindexing::{FileActionStore, ReindexCoordinator};
//!
//! let actions = Arc::new(FileActionStore::new("/var/lib/dbkeeper/actions").await?);
//! let coordinator = ReindexCoordinator::new(leases, rebuilder, ddl, actions, config.reindex);
//!
//! // Drop leftovers of interrupted rebuilds, then rebuild the two most
//! // bloated indexes.
//! coordinator.automatic_reindexing(&indexes, 2).await?;
//! ```

mod action;
mod action_store;
mod coordinator;
mod index;
mod notifier;
mod rebuilder;
mod selection;

pub use action::{ReindexAction, ReindexState};
pub use action_store::{ActionStore, FileActionStore, InMemoryActionStore};
pub use coordinator::{CleanupReport, DropOutcome, ReindexCoordinator, ReindexOutcome};
pub use index::PostgresIndex;
pub use notifier::{LoggingNotifier, NoopNotifier, Notifier};
pub use rebuilder::IndexRebuilder;
pub use selection::IndexSelection;
