//! Lock-timeout retries for DDL run outside a transaction.

use crate::ddl::DdlExecutor;
use crate::error::{ConfigError, DdlError, Error, Result};
use crate::metrics::MaintenanceMetrics;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// One attempt's lock timeout and the pause after it fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockTiming {
    /// How long the statement may wait for its lock.
    pub lock_timeout: Duration,
    /// How long to sleep after a lock timeout before the next attempt.
    pub sleep: Duration,
}

impl LockTiming {
    /// Create a timing entry.
    pub const fn new(lock_timeout: Duration, sleep: Duration) -> Self {
        Self { lock_timeout, sleep }
    }
}

/// Ordered sequence of attempts, one [`LockTiming`] per attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimingConfiguration {
    timings: Vec<LockTiming>,
}

impl TimingConfiguration {
    /// Create a configuration. Fails if `timings` is empty.
    pub fn new(timings: Vec<LockTiming>) -> Result<Self> {
        if timings.is_empty() {
            return Err(ConfigError::EmptyTimingConfiguration.into());
        }
        Ok(Self { timings })
    }

    /// `attempts` identical entries.
    pub fn repeat(timing: LockTiming, attempts: usize) -> Self {
        Self {
            timings: vec![timing; attempts.max(1)],
        }
    }

    /// Timings for short partition DDL: start with tight lock timeouts and
    /// escalate both the timeout and the pause when traffic keeps the lock busy.
    pub fn default_ddl() -> Self {
        let ms = Duration::from_millis;
        let secs = Duration::from_secs;
        let short_burst = [
            LockTiming::new(ms(100), ms(50)),
            LockTiming::new(ms(100), ms(50)),
            LockTiming::new(ms(200), ms(50)),
            LockTiming::new(ms(300), ms(100)),
            LockTiming::new(ms(400), ms(150)),
            LockTiming::new(ms(500), secs(2)),
            LockTiming::new(ms(500), secs(2)),
        ];

        let mut timings = Vec::with_capacity(short_burst.len() * 3 + 3);
        timings.extend_from_slice(&short_burst);
        timings.push(LockTiming::new(secs(1), secs(5)));
        timings.extend_from_slice(&short_burst);
        timings.push(LockTiming::new(secs(3), secs(60)));
        timings.extend_from_slice(&short_burst);
        timings.push(LockTiming::new(secs(5), secs(180)));

        Self { timings }
    }

    /// Timings for removing a leftover index: 30 attempts of one minute
    /// lock timeout followed by a nine minute pause.
    pub fn remove_index() -> Self {
        Self::repeat(
            LockTiming::new(Duration::from_secs(60), Duration::from_secs(9 * 60)),
            30,
        )
    }

    /// Number of attempts.
    pub fn attempts(&self) -> usize {
        self.timings.len()
    }

    /// The timing entries in attempt order.
    pub fn timings(&self) -> &[LockTiming] {
        &self.timings
    }
}

impl Default for TimingConfiguration {
    fn default() -> Self {
        Self::default_ddl()
    }
}

/// How a lock-retried statement ended without raising.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockRetryOutcome {
    /// The statement succeeded on attempt `attempts`.
    Completed { attempts: usize },
    /// Every attempt hit a lock timeout and the caller asked not to raise.
    Exhausted { attempts: usize },
}

impl LockRetryOutcome {
    /// Whether the statement actually ran.
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }
}

/// Runs a statement, retrying on lock timeouts.
///
/// Each attempt sets `lock_timeout` on the session, runs the statement and
/// resets the timeout. Only lock-timeout-class failures are retried; any
/// other failure is returned immediately.
#[derive(Debug, Clone)]
pub struct LockRetryExecutor {
    executor: Arc<dyn DdlExecutor>,
    metrics: Arc<MaintenanceMetrics>,
}

impl LockRetryExecutor {
    /// Create a retry executor over a DDL executor.
    pub fn new(executor: Arc<dyn DdlExecutor>) -> Self {
        Self::with_metrics(executor, Arc::new(MaintenanceMetrics::new()))
    }

    /// Create a retry executor that records retries into `metrics`.
    pub fn with_metrics(executor: Arc<dyn DdlExecutor>, metrics: Arc<MaintenanceMetrics>) -> Self {
        Self { executor, metrics }
    }

    /// The underlying executor.
    pub fn executor(&self) -> &Arc<dyn DdlExecutor> {
        &self.executor
    }

    /// Run `statement` under `timing`.
    ///
    /// When every attempt times out on its lock, returns
    /// [`Error::LockRetriesExhausted`] if `raise_on_exhaustion` is set, and
    /// [`LockRetryOutcome::Exhausted`] otherwise.
    pub async fn run(
        &self,
        statement: &str,
        timing: &TimingConfiguration,
        raise_on_exhaustion: bool,
    ) -> Result<LockRetryOutcome> {
        let total = timing.attempts();
        let mut last_error: Option<DdlError> = None;

        for (index, entry) in timing.timings().iter().enumerate() {
            let attempt = index + 1;

            self.executor
                .execute(&format!(
                    "SET lock_timeout TO '{}ms'",
                    entry.lock_timeout.as_millis()
                ))
                .await?;

            debug!(
                attempt,
                total,
                lock_timeout_ms = entry.lock_timeout.as_millis() as u64,
                statement,
                "Executing statement with lock timeout"
            );

            let result = self.executor.execute(statement).await;

            if let Err(e) = self.executor.execute("RESET lock_timeout").await {
                warn!(error = %e, "Failed to reset lock_timeout");
            }

            match result {
                Ok(()) => return Ok(LockRetryOutcome::Completed { attempts: attempt }),
                Err(e) if e.is_lock_timeout() => {
                    self.metrics.lock_retries.inc();
                    warn!(
                        attempt,
                        total,
                        sleep_ms = entry.sleep.as_millis() as u64,
                        error = %e,
                        statement,
                        "Lock timeout, retrying"
                    );
                    last_error = Some(e);

                    if attempt < total {
                        tokio::time::sleep(entry.sleep).await;
                    }
                }
                Err(e) => return Err(e.into()),
            }
        }

        let source = last_error
            .unwrap_or_else(|| DdlError::lock_timeout("lock retries exhausted"));

        if raise_on_exhaustion {
            return Err(Error::LockRetriesExhausted {
                attempts: total,
                source,
            });
        }

        warn!(
            attempts = total,
            error = %source,
            statement,
            "Lock retries exhausted, giving up"
        );
        Ok(LockRetryOutcome::Exhausted { attempts: total })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingDdlExecutor;

    const STATEMENT: &str =
        "ALTER TABLE \"events\" DETACH PARTITION \"partitions_dynamic\".\"events_1\"";

    fn timing(attempts: usize) -> TimingConfiguration {
        TimingConfiguration::repeat(
            LockTiming::new(Duration::from_millis(100), Duration::from_secs(1)),
            attempts,
        )
    }

    #[test]
    fn test_empty_timing_configuration_rejected() {
        assert!(matches!(
            TimingConfiguration::new(Vec::new()),
            Err(Error::Config(ConfigError::EmptyTimingConfiguration))
        ));
    }

    #[test]
    fn test_remove_index_timing() {
        let timing = TimingConfiguration::remove_index();
        assert_eq!(timing.attempts(), 30);
        assert_eq!(timing.timings()[0].lock_timeout, Duration::from_secs(60));
        assert_eq!(timing.timings()[29].sleep, Duration::from_secs(540));
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_first_attempt() {
        let ddl = Arc::new(RecordingDdlExecutor::new());
        let retries = LockRetryExecutor::new(ddl.clone());

        let outcome = retries.run(STATEMENT, &timing(3), true).await.unwrap();

        assert_eq!(outcome, LockRetryOutcome::Completed { attempts: 1 });
        assert_eq!(
            ddl.statements(),
            vec![
                "SET lock_timeout TO '100ms'".to_string(),
                STATEMENT.to_string(),
                "RESET lock_timeout".to_string(),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_until_lock_is_free() {
        let ddl = Arc::new(RecordingDdlExecutor::new());
        ddl.fail_times("DETACH PARTITION", 2, DdlError::lock_timeout("lock timeout"));
        let metrics = Arc::new(MaintenanceMetrics::new());
        let retries = LockRetryExecutor::with_metrics(ddl.clone(), metrics.clone());

        let outcome = retries.run(STATEMENT, &timing(5), true).await.unwrap();

        assert_eq!(outcome, LockRetryOutcome::Completed { attempts: 3 });
        assert_eq!(ddl.count_matching("DETACH PARTITION"), 3);
        assert_eq!(metrics.lock_retries.get(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_raises_when_requested() {
        let ddl = Arc::new(RecordingDdlExecutor::new());
        ddl.always_fail("DETACH PARTITION", DdlError::lock_timeout("lock timeout"));
        let retries = LockRetryExecutor::new(ddl.clone());

        let err = retries.run(STATEMENT, &timing(4), true).await.unwrap_err();

        assert!(matches!(err, Error::LockRetriesExhausted { attempts: 4, .. }));
        assert_eq!(ddl.count_matching("DETACH PARTITION"), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_swallowed_when_not_raising() {
        let ddl = Arc::new(RecordingDdlExecutor::new());
        ddl.always_fail("DETACH PARTITION", DdlError::lock_timeout("lock timeout"));
        let retries = LockRetryExecutor::new(ddl.clone());

        let outcome = retries.run(STATEMENT, &timing(4), false).await.unwrap();

        assert_eq!(outcome, LockRetryOutcome::Exhausted { attempts: 4 });
        assert!(!outcome.is_completed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_sleeps_between_attempts_only() {
        let ddl = Arc::new(RecordingDdlExecutor::new());
        ddl.always_fail("DETACH PARTITION", DdlError::lock_timeout("lock timeout"));
        let retries = LockRetryExecutor::new(ddl.clone());

        let start = tokio::time::Instant::now();
        retries.run(STATEMENT, &timing(3), false).await.unwrap();

        // Two pauses of one second between three attempts.
        assert_eq!(start.elapsed(), Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_other_errors_are_not_retried() {
        let ddl = Arc::new(RecordingDdlExecutor::new());
        ddl.always_fail("DETACH PARTITION", DdlError::new("42P01", "relation does not exist"));
        let retries = LockRetryExecutor::new(ddl.clone());

        let err = retries.run(STATEMENT, &timing(5), false).await.unwrap_err();

        assert!(matches!(err, Error::Ddl(ref e) if e.sqlstate.as_deref() == Some("42P01")));
        assert_eq!(ddl.count_matching("DETACH PARTITION"), 1);
        // lock_timeout is still reset after the failed attempt
        assert_eq!(ddl.count_matching("RESET lock_timeout"), 1);
    }
}
