//! Scripted collaborators for reindex coordination tests.

use crate::error::{DdlError, Error, Result};
use crate::reindexing::{IndexRebuilder, Notifier, PostgresIndex, ReindexAction};
use crate::types::{Clock, TimestampMs};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

/// Index rebuilder with per-index scripted failures and sizes.
///
/// Tracks how many rebuilds overlap so tests can assert mutual exclusion.
#[derive(Debug, Default)]
pub struct ScriptedRebuilder {
    delay: Option<Duration>,
    failures: RwLock<HashMap<String, String>>,
    sizes: RwLock<HashMap<String, u64>>,
    rebuilt: RwLock<Vec<String>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedRebuilder {
    /// Create a rebuilder that succeeds immediately.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every rebuild take `delay` (tokio time).
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Fail rebuilds of `identifier` (`schema.name`) with `message`.
    pub fn fail_with(&self, identifier: impl Into<String>, message: impl Into<String>) {
        self.failures.write().insert(identifier.into(), message.into());
    }

    /// Report `bytes` as the on-disk size of `identifier`.
    pub fn set_size(&self, identifier: impl Into<String>, bytes: u64) {
        self.sizes.write().insert(identifier.into(), bytes);
    }

    /// Identifiers of every rebuild started, in order.
    pub fn rebuilt(&self) -> Vec<String> {
        self.rebuilt.read().clone()
    }

    /// Highest number of rebuilds observed running at once.
    pub fn max_concurrent(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IndexRebuilder for ScriptedRebuilder {
    async fn rebuild(&self, index: &PostgresIndex) -> Result<()> {
        let identifier = index.identifier();
        self.rebuilt.write().push(identifier.clone());

        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(running, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        match self.failures.read().get(&identifier) {
            Some(message) => Err(DdlError::other(message.clone()).into()),
            None => Ok(()),
        }
    }

    async fn ondisk_size(&self, index: &PostgresIndex) -> Result<u64> {
        Ok(self
            .sizes
            .read()
            .get(&index.identifier())
            .copied()
            .unwrap_or(index.ondisk_size_bytes))
    }
}

/// A notification seen by [`RecordingNotifier`].
#[derive(Debug, Clone, PartialEq)]
pub enum NotificationEvent {
    Start(ReindexAction),
    End(ReindexAction),
}

/// Notifier that records every event and can be made to fail.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    events: RwLock<Vec<NotificationEvent>>,
    failing: AtomicBool,
}

impl RecordingNotifier {
    /// Create a notifier that accepts every event.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every notification return an error after recording it.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Every event, in order.
    pub fn events(&self) -> Vec<NotificationEvent> {
        self.events.read().clone()
    }

    /// Actions passed to `notify_end`.
    pub fn ended(&self) -> Vec<ReindexAction> {
        self.events
            .read()
            .iter()
            .filter_map(|e| match e {
                NotificationEvent::End(action) => Some(action.clone()),
                NotificationEvent::Start(_) => None,
            })
            .collect()
    }

    fn record(&self, event: NotificationEvent) -> Result<()> {
        self.events.write().push(event);
        if self.failing.load(Ordering::SeqCst) {
            return Err(Error::Notification("webhook returned 503".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify_start(&self, action: &ReindexAction) -> Result<()> {
        self.record(NotificationEvent::Start(action.clone()))
    }

    async fn notify_end(&self, action: &ReindexAction) -> Result<()> {
        self.record(NotificationEvent::End(action.clone()))
    }
}

/// Clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
    now_ms: AtomicU64,
}

impl ManualClock {
    /// Create a clock reading `now_ms`.
    pub fn new(now_ms: TimestampMs) -> Self {
        Self {
            now_ms: AtomicU64::new(now_ms),
        }
    }

    /// Move the clock forward.
    pub fn advance(&self, by: Duration) {
        self.now_ms.fetch_add(by.as_millis() as u64, Ordering::SeqCst);
    }

    /// Set the clock.
    pub fn set(&self, now_ms: TimestampMs) {
        self.now_ms.store(now_ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> TimestampMs {
        self.now_ms.load(Ordering::SeqCst)
    }
}
