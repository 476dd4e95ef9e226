//! Scoped lease acquisition.

use crate::error::Result;
use crate::lease::store::{LeaseStore, LeaseToken};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// A held lease. Released by [`LeaseGuard::release`], or on drop.
///
/// Dropping an unreleased guard (the guarded future panicked or was
/// cancelled) spawns the release on the current tokio runtime. Without a
/// runtime the lease is left to expire through its TTL.
#[derive(Debug)]
pub struct LeaseGuard {
    store: Arc<dyn LeaseStore>,
    key: String,
    token: LeaseToken,
    released: bool,
}

impl LeaseGuard {
    /// The lease key.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// The holder token.
    pub fn token(&self) -> LeaseToken {
        self.token
    }

    /// Release the lease. Returns false if it had already expired or been
    /// taken over.
    pub async fn release(mut self) -> bool {
        self.released = true;
        match self.store.release(&self.key, &self.token).await {
            Ok(true) => true,
            Ok(false) => {
                warn!(lease_key = %self.key, "Lease expired before it was released");
                false
            }
            Err(e) => {
                warn!(
                    lease_key = %self.key,
                    error = %e,
                    "Failed to release lease, leaving it to expire"
                );
                false
            }
        }
    }
}

impl Drop for LeaseGuard {
    fn drop(&mut self) {
        if self.released {
            return;
        }

        let store = Arc::clone(&self.store);
        let key = std::mem::take(&mut self.key);
        let token = self.token;

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(e) = store.release(&key, &token).await {
                        warn!(lease_key = %key, error = %e, "Failed to release abandoned lease");
                    }
                });
            }
            Err(_) => {
                warn!(
                    lease_key = %key,
                    "No runtime to release abandoned lease, leaving it to expire"
                );
            }
        }
    }
}

/// Cluster-wide single-flight execution of named operations.
///
/// Acquisition never waits: a held lease means the operation is already
/// running somewhere and this call is skipped.
#[derive(Debug, Clone)]
pub struct ExclusiveLeaseGuard {
    store: Arc<dyn LeaseStore>,
}

impl ExclusiveLeaseGuard {
    /// Create a guard over a lease store.
    pub fn new(store: Arc<dyn LeaseStore>) -> Self {
        Self { store }
    }

    /// The backing store.
    pub fn store(&self) -> &Arc<dyn LeaseStore> {
        &self.store
    }

    /// Take the lease if it is free.
    pub async fn acquire(&self, key: &str, ttl: Duration) -> Result<Option<LeaseGuard>> {
        let token = self.store.try_obtain(key, ttl).await?;

        Ok(token.map(|token| LeaseGuard {
            store: Arc::clone(&self.store),
            key: key.to_string(),
            token,
            released: false,
        }))
    }

    /// Run `f` while holding the lease `key`.
    ///
    /// Returns `Ok(None)` without calling `f` if another holder has the
    /// lease. `ttl` must exceed the worst-case duration of `f`; the lease is
    /// not renewed.
    pub async fn try_obtain_lease<F, Fut, T>(
        &self,
        key: &str,
        ttl: Duration,
        f: F,
    ) -> Result<Option<T>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let Some(lease) = self.acquire(key, ttl).await? else {
            debug!(lease_key = key, "Lease held by another worker, skipping");
            return Ok(None);
        };

        debug!(lease_key = key, token = %lease.token(), "Lease obtained");

        let value = f().await;
        lease.release().await;

        Ok(Some(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lease::InMemoryLeaseStore;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const TTL: Duration = Duration::from_secs(60);

    fn guard() -> (Arc<InMemoryLeaseStore>, ExclusiveLeaseGuard) {
        let store = Arc::new(InMemoryLeaseStore::new());
        (store.clone(), ExclusiveLeaseGuard::new(store))
    }

    #[tokio::test]
    async fn test_runs_block_and_releases() {
        let (store, guard) = guard();

        let result = guard
            .try_obtain_lease("partitioning/events", TTL, || async { 42 })
            .await
            .unwrap();

        assert_eq!(result, Some(42));
        assert!(store.holder("partitioning/events").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_releases_when_block_returns_error() {
        let (store, guard) = guard();

        let result: Option<std::result::Result<(), &str>> = guard
            .try_obtain_lease("partitioning/events", TTL, || async { Err("rebuild failed") })
            .await
            .unwrap();

        assert_eq!(result, Some(Err("rebuild failed")));
        assert!(store.holder("partitioning/events").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_held_lease_skips_block() {
        let (_store, guard) = guard();
        let calls = AtomicUsize::new(0);

        let held = guard.acquire("partitioning/events", TTL).await.unwrap().unwrap();

        let result = guard
            .try_obtain_lease("partitioning/events", TTL, || async {
                calls.fetch_add(1, Ordering::SeqCst);
            })
            .await
            .unwrap();

        assert!(result.is_none());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(held.release().await);
    }

    #[tokio::test]
    async fn test_nested_acquire_of_same_key_is_skipped() {
        let (_store, guard) = guard();

        let inner = guard
            .try_obtain_lease("reindex/main", TTL, || async {
                guard
                    .try_obtain_lease("reindex/main", TTL, || async { "inner ran" })
                    .await
                    .unwrap()
            })
            .await
            .unwrap();

        assert_eq!(inner, Some(None));
    }

    #[tokio::test]
    async fn test_dropped_guard_releases_lease() {
        let (store, guard) = guard();

        let lease = guard.acquire("reindex/main", TTL).await.unwrap().unwrap();
        drop(lease);

        // The release runs on a spawned task.
        for _ in 0..10 {
            if store.holder("reindex/main").await.unwrap().is_none() {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert!(store.holder("reindex/main").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_panicking_block_releases_lease() {
        let (store, guard) = guard();

        let task_guard = guard.clone();
        let handle = tokio::spawn(async move {
            task_guard
                .try_obtain_lease("reindex/main", TTL, || async {
                    let crashed = true;
                    if crashed {
                        panic!("rebuilder crashed");
                    }
                })
                .await
        });
        assert!(handle.await.is_err());

        for _ in 0..10 {
            if store.holder("reindex/main").await.unwrap().is_none() {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert!(store.holder("reindex/main").await.unwrap().is_none());
    }
}
