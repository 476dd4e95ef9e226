//! Reindex action records.

use crate::reindexing::index::PostgresIndex;
use crate::types::TimestampMs;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

/// State of a reindex attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReindexState {
    /// The rebuild is in progress.
    Running,
    /// The rebuild completed.
    Finished,
    /// The rebuild raised an error.
    Failed,
}

impl fmt::Display for ReindexState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Running => write!(f, "running"),
            Self::Finished => write!(f, "finished"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Audit record of one reindex attempt. Never reused across attempts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReindexAction {
    /// Unique action ID.
    pub id: Uuid,

    /// Database the index lives in.
    pub database: String,

    /// `schema.name` of the index.
    pub index_identifier: String,

    /// Current state.
    pub state: ReindexState,

    /// When the attempt started.
    pub action_start_ms: TimestampMs,

    /// When the attempt ended.
    pub action_end_ms: Option<TimestampMs>,

    /// On-disk size before the rebuild.
    pub ondisk_size_bytes_start: u64,

    /// On-disk size after the rebuild, if it could be read.
    pub ondisk_size_bytes_end: Option<u64>,

    /// Bloat estimate before the rebuild.
    pub bloat_estimate_bytes_start: Option<u64>,

    /// Error message if the rebuild failed.
    pub error: Option<String>,
}

impl ReindexAction {
    /// Start a `running` action for `index`.
    pub fn create_for(index: &PostgresIndex, now_ms: TimestampMs) -> Self {
        Self {
            id: Uuid::new_v4(),
            database: index.database.clone(),
            index_identifier: index.identifier(),
            state: ReindexState::Running,
            action_start_ms: now_ms,
            action_end_ms: None,
            ondisk_size_bytes_start: index.ondisk_size_bytes,
            ondisk_size_bytes_end: None,
            bloat_estimate_bytes_start: index.bloat_size_bytes,
            error: None,
        }
    }

    /// Record a rebuild failure.
    pub fn fail(&mut self, error: impl Into<String>) {
        self.error = Some(error.into());
        self.state = ReindexState::Failed;
    }

    /// Close the attempt. Sets `finished` unless it already failed.
    pub fn finish(&mut self, now_ms: TimestampMs, ondisk_size_bytes_end: Option<u64>) {
        self.action_end_ms = Some(now_ms);
        self.ondisk_size_bytes_end = ondisk_size_bytes_end;

        if self.state != ReindexState::Failed {
            self.state = ReindexState::Finished;
        }

        tracing::info!(
            action_id = %self.id,
            index = %self.index_identifier,
            state = %self.state,
            duration_ms = self.duration().map(|d| d.as_millis() as u64),
            "Reindex action finished"
        );
    }

    /// Whether the attempt has ended.
    pub fn is_closed(&self) -> bool {
        self.action_end_ms.is_some()
    }

    /// Wall-clock duration of a closed attempt.
    pub fn duration(&self) -> Option<Duration> {
        self.action_end_ms
            .map(|end| Duration::from_millis(end.saturating_sub(self.action_start_ms)))
    }

    /// Bytes reclaimed by the rebuild, when both sizes are known.
    pub fn reclaimed_bytes(&self) -> Option<i64> {
        self.ondisk_size_bytes_end
            .map(|end| self.ondisk_size_bytes_start as i64 - end as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index() -> PostgresIndex {
        PostgresIndex::new("main", "public", "index_events_on_id")
            .with_ondisk_size(10_000)
            .with_bloat_size(4_000)
    }

    #[test]
    fn test_create_for() {
        let action = ReindexAction::create_for(&index(), 1_000);

        assert_eq!(action.state, ReindexState::Running);
        assert_eq!(action.index_identifier, "public.index_events_on_id");
        assert_eq!(action.database, "main");
        assert_eq!(action.ondisk_size_bytes_start, 10_000);
        assert_eq!(action.bloat_estimate_bytes_start, Some(4_000));
        assert!(!action.is_closed());
    }

    #[test]
    fn test_finish() {
        let mut action = ReindexAction::create_for(&index(), 1_000);
        action.finish(61_000, Some(6_000));

        assert_eq!(action.state, ReindexState::Finished);
        assert_eq!(action.duration(), Some(Duration::from_secs(60)));
        assert_eq!(action.reclaimed_bytes(), Some(4_000));
    }

    #[test]
    fn test_failed_action_stays_failed_after_finish() {
        let mut action = ReindexAction::create_for(&index(), 1_000);
        action.fail("deadlock detected");
        action.finish(2_000, None);

        assert_eq!(action.state, ReindexState::Failed);
        assert_eq!(action.action_end_ms, Some(2_000));
        assert_eq!(action.error.as_deref(), Some("deadlock detected"));
    }

    #[test]
    fn test_state_display() {
        assert_eq!(ReindexState::Running.to_string(), "running");
        assert_eq!(ReindexState::Finished.to_string(), "finished");
        assert_eq!(ReindexState::Failed.to_string(), "failed");
    }
}
