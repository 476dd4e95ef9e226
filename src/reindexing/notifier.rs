//! Reindex lifecycle notifications.

use crate::error::Result;
use crate::reindexing::action::ReindexAction;
use async_trait::async_trait;
use tracing::info;

/// Receives start and end events of reindex actions.
///
/// Failures are logged by the coordinator and never abort a reindex.
#[async_trait]
pub trait Notifier: Send + Sync + std::fmt::Debug {
    /// A rebuild is about to start.
    async fn notify_start(&self, action: &ReindexAction) -> Result<()>;

    /// A rebuild ended, successfully or not.
    async fn notify_end(&self, action: &ReindexAction) -> Result<()>;
}

/// Notifier that writes lifecycle events to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingNotifier;

#[async_trait]
impl Notifier for LoggingNotifier {
    async fn notify_start(&self, action: &ReindexAction) -> Result<()> {
        info!(
            action_id = %action.id,
            database = %action.database,
            index = %action.index_identifier,
            ondisk_size_bytes = action.ondisk_size_bytes_start,
            bloat_estimate_bytes = action.bloat_estimate_bytes_start,
            "Starting index rebuild"
        );
        Ok(())
    }

    async fn notify_end(&self, action: &ReindexAction) -> Result<()> {
        info!(
            action_id = %action.id,
            database = %action.database,
            index = %action.index_identifier,
            state = %action.state,
            ondisk_size_bytes_end = action.ondisk_size_bytes_end,
            reclaimed_bytes = action.reclaimed_bytes(),
            "Index rebuild ended"
        );
        Ok(())
    }
}

/// Notifier that does nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopNotifier;

#[async_trait]
impl Notifier for NoopNotifier {
    async fn notify_start(&self, _action: &ReindexAction) -> Result<()> {
        Ok(())
    }

    async fn notify_end(&self, _action: &ReindexAction) -> Result<()> {
        Ok(())
    }
}
