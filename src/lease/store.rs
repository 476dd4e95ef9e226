//! Lease stores: atomic set-if-absent with a TTL.

use crate::error::Result;
use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;
use uuid::Uuid;

/// Identifies the holder of a lease. Only the holder's token releases it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LeaseToken(Uuid);

impl LeaseToken {
    /// Generate a fresh random token.
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// The token's UUID.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl fmt::Display for LeaseToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Backing store for cluster-wide leases.
///
/// Uniqueness of the holder is the store's responsibility: `try_obtain` must
/// be a single atomic set-if-absent, and an entry must disappear on its own
/// once its TTL passes. Callers never renew a lease.
#[async_trait]
pub trait LeaseStore: Send + Sync + fmt::Debug {
    /// Take the lease if nobody holds it. Returns the holder token on success.
    async fn try_obtain(&self, key: &str, ttl: Duration) -> Result<Option<LeaseToken>>;

    /// Release the lease if `token` still holds it. Returns whether it did.
    async fn release(&self, key: &str, token: &LeaseToken) -> Result<bool>;

    /// Current holder, if the lease is held.
    async fn holder(&self, key: &str) -> Result<Option<LeaseToken>>;
}

#[derive(Debug, Clone, Copy)]
struct LeaseEntry {
    token: LeaseToken,
    expires_at: Instant,
}

/// In-process lease store.
///
/// Only coordinates workers sharing this process. Expiry follows tokio's
/// clock, so tests with a paused runtime can advance past a TTL. Expired
/// entries are evicted on the next `try_obtain`, or when their key is read
/// or released.
#[derive(Debug, Default)]
pub struct InMemoryLeaseStore {
    leases: DashMap<String, LeaseEntry>,
}

impl InMemoryLeaseStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of unexpired leases.
    pub fn active_count(&self) -> usize {
        let now = Instant::now();
        self.leases.iter().filter(|e| e.expires_at > now).count()
    }

    /// Number of stored entries, including expired ones not yet evicted.
    pub fn entry_count(&self) -> usize {
        self.leases.len()
    }

    fn evict_expired(&self, now: Instant) {
        self.leases.retain(|_, entry| entry.expires_at > now);
    }
}

#[async_trait]
impl LeaseStore for InMemoryLeaseStore {
    async fn try_obtain(&self, key: &str, ttl: Duration) -> Result<Option<LeaseToken>> {
        let now = Instant::now();
        let fresh = LeaseEntry {
            token: LeaseToken::generate(),
            expires_at: now + ttl,
        };

        // One key per table or index, so expired entries would otherwise pile up.
        self.evict_expired(now);

        match self.leases.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().expires_at > now {
                    return Ok(None);
                }
                occupied.insert(fresh);
            }
            Entry::Vacant(vacant) => {
                vacant.insert(fresh);
            }
        }

        Ok(Some(fresh.token))
    }

    async fn release(&self, key: &str, token: &LeaseToken) -> Result<bool> {
        let released = self
            .leases
            .remove_if(key, |_, entry| entry.token == *token)
            .is_some();

        if !released {
            let now = Instant::now();
            self.leases.remove_if(key, |_, entry| entry.expires_at <= now);
        }
        Ok(released)
    }

    async fn holder(&self, key: &str) -> Result<Option<LeaseToken>> {
        let now = Instant::now();
        self.leases.remove_if(key, |_, entry| entry.expires_at <= now);
        Ok(self.leases.get(key).map(|entry| entry.token))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TTL: Duration = Duration::from_secs(60);

    #[tokio::test(start_paused = true)]
    async fn test_obtain_is_exclusive() {
        let store = InMemoryLeaseStore::new();

        let first = store.try_obtain("reindex/main", TTL).await.unwrap();
        let second = store.try_obtain("reindex/main", TTL).await.unwrap();
        let other_key = store.try_obtain("reindex/ci", TTL).await.unwrap();

        assert!(first.is_some());
        assert!(second.is_none());
        assert!(other_key.is_some());
        assert_eq!(store.holder("reindex/main").await.unwrap(), first);
    }

    #[tokio::test(start_paused = true)]
    async fn test_release_requires_holder_token() {
        let store = InMemoryLeaseStore::new();
        let token = store.try_obtain("reindex/main", TTL).await.unwrap().unwrap();

        assert!(!store.release("reindex/main", &LeaseToken::generate()).await.unwrap());
        assert!(store.holder("reindex/main").await.unwrap().is_some());

        assert!(store.release("reindex/main", &token).await.unwrap());
        assert!(store.try_obtain("reindex/main", TTL).await.unwrap().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_lease_can_be_retaken() {
        let store = InMemoryLeaseStore::new();
        let stale = store.try_obtain("reindex/main", TTL).await.unwrap().unwrap();

        tokio::time::advance(TTL + Duration::from_secs(1)).await;
        assert_eq!(store.active_count(), 0);

        let fresh = store.try_obtain("reindex/main", TTL).await.unwrap().unwrap();
        assert_ne!(stale, fresh);

        // The crashed holder cannot release the new holder's lease.
        assert!(!store.release("reindex/main", &stale).await.unwrap());
        assert_eq!(store.holder("reindex/main").await.unwrap(), Some(fresh));
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_entries_are_evicted() {
        let store = InMemoryLeaseStore::new();
        for table in ["events", "audit_log", "deleted_records"] {
            store
                .try_obtain(&format!("partitioning/{table}"), TTL)
                .await
                .unwrap()
                .unwrap();
        }
        assert_eq!(store.entry_count(), 3);

        tokio::time::advance(TTL + Duration::from_secs(1)).await;

        assert!(store.holder("partitioning/events").await.unwrap().is_none());
        assert_eq!(store.entry_count(), 2);

        store.try_obtain("reindex/main", TTL).await.unwrap().unwrap();
        assert_eq!(store.entry_count(), 1);
        assert_eq!(store.active_count(), 1);
    }
}
