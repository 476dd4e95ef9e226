//! Choosing which indexes to rebuild.

use crate::config::SelectionConfig;
use crate::error::Result;
use crate::reindexing::action_store::ActionStore;
use crate::reindexing::index::PostgresIndex;
use crate::types::TimestampMs;
use std::cmp::Reverse;
use tracing::debug;

/// Filters and ranks reindex candidates by estimated bloat.
#[derive(Debug, Clone, Default)]
pub struct IndexSelection {
    config: SelectionConfig,
}

impl IndexSelection {
    /// Create a selection with the given thresholds.
    pub fn new(config: SelectionConfig) -> Self {
        Self { config }
    }

    /// Thresholds in use.
    pub fn config(&self) -> &SelectionConfig {
        &self.config
    }

    /// Whether `index` passes the static filters: valid, not a leftover,
    /// within the size bounds and bloated enough.
    pub fn is_eligible(&self, index: &PostgresIndex) -> bool {
        if !index.valid || index.is_leftover_temporary() {
            return false;
        }

        if index.ondisk_size_bytes < self.config.minimum_index_size_bytes
            || index.ondisk_size_bytes > self.config.maximum_index_size_bytes
        {
            return false;
        }

        index
            .relative_bloat()
            .is_some_and(|ratio| ratio >= self.config.minimum_relative_bloat)
    }

    /// Up to `maximum` candidates, most bloated first. Indexes with an
    /// action started inside the recent window are skipped.
    pub async fn select(
        &self,
        candidates: &[PostgresIndex],
        actions: &dyn ActionStore,
        now_ms: TimestampMs,
        maximum: usize,
    ) -> Result<Vec<PostgresIndex>> {
        let window_ms = self.config.recent_action_window.as_millis() as u64;
        let cutoff = now_ms.saturating_sub(window_ms);

        let mut selected = Vec::new();
        for index in candidates.iter().filter(|i| self.is_eligible(i)) {
            let history = actions
                .actions_for_index(&index.database, &index.identifier())
                .await?;

            if history.iter().any(|a| a.action_start_ms >= cutoff) {
                debug!(index = %index, "Skipping recently reindexed index");
                continue;
            }

            selected.push(index.clone());
        }

        selected.sort_by_key(|i| Reverse(i.bloat_size_bytes.unwrap_or(0)));
        selected.truncate(maximum);
        Ok(selected)
    }
}
