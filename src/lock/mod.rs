//! Process-external mutual exclusion keyed by slot identity, with fencing
//! tokens and TTL-bounded leases.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};
use uuid::Uuid;

use crate::error::{CoreError, Result};

/// Opaque proof of lock ownership, validated by compare-and-delete on
/// release. Never compared by anything but the manager itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaseToken(String);

impl LeaseToken {
    fn generate() -> Self {
        LeaseToken(Uuid::new_v4().to_string())
    }
}

/// Two operations: atomic test-and-set with TTL, and compare-and-delete
/// release. `release` must never degrade to a plain delete — a plain
/// delete would let a holder whose lease already expired and was
/// re-acquired by someone else tear down the new holder's lock.
#[async_trait]
pub trait LockManager: Send + Sync {
    /// Atomic test-and-set of `lock:{key}`. Returns `None` if the key is
    /// already held by an unexpired lease, or if the backing store is
    /// unreachable — acquisition fails closed rather than racing ahead
    /// without mutual exclusion.
    async fn acquire(&self, key: &str, ttl: Duration) -> Result<Option<LeaseToken>>;

    /// Deletes `lock:{key}` iff its current value equals `token`. Returns
    /// `false` if the lease had already expired or been stolen, in which
    /// case the caller must assume another holder may have entered.
    async fn release(&self, key: &str, token: &LeaseToken) -> Result<bool>;
}

struct Lease {
    token: LeaseToken,
    expires_at: Instant,
}

/// In-process reference implementation: a thin shim over a `HashMap`
/// instead of an external KV store, but the same atomicity contract —
/// acquire and release are each a single critical section under one
/// lock, mirroring the atomic `SET NX PX` / scripted compare-and-delete
/// an external store would provide.
pub struct InMemoryLockManager {
    leases: RwLock<HashMap<String, Lease>>,
}

impl InMemoryLockManager {
    pub fn new() -> Self {
        InMemoryLockManager { leases: RwLock::new(HashMap::new()) }
    }

    fn is_expired(lease: &Lease, now: Instant) -> bool {
        lease.expires_at <= now
    }
}

impl Default for InMemoryLockManager {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LockManager for InMemoryLockManager {
    async fn acquire(&self, key: &str, ttl: Duration) -> Result<Option<LeaseToken>> {
        let now = Instant::now();
        let mut leases = self.leases.write().map_err(|_| CoreError::Internal("lock manager poisoned".to_string()))?;

        if let Some(existing) = leases.get(key) {
            if !Self::is_expired(existing, now) {
                return Ok(None);
            }
        }

        let token = LeaseToken::generate();
        leases.insert(key.to_string(), Lease { token: token.clone(), expires_at: now + ttl });
        log::debug!("lock acquired key={} ttl={:?}", key, ttl);
        Ok(Some(token))
    }

    async fn release(&self, key: &str, token: &LeaseToken) -> Result<bool> {
        let now = Instant::now();
        let mut leases = self.leases.write().map_err(|_| CoreError::Internal("lock manager poisoned".to_string()))?;

        match leases.get(key) {
            Some(lease) if !Self::is_expired(lease, now) && lease.token == *token => {
                leases.remove(key);
                log::debug!("lock released key={}", key);
                Ok(true)
            }
            _ => {
                log::warn!("lock release failed key={} (expired or stolen)", key);
                Ok(false)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn second_acquire_on_held_key_fails() {
        let mgr = InMemoryLockManager::new();
        let a = mgr.acquire("slot:1", Duration::from_secs(15)).await.unwrap();
        assert!(a.is_some());
        let b = mgr.acquire("slot:1", Duration::from_secs(15)).await.unwrap();
        assert!(b.is_none());
    }

    #[tokio::test]
    async fn release_with_wrong_token_fails_and_keeps_lock() {
        let mgr = InMemoryLockManager::new();
        let token = mgr.acquire("slot:1", Duration::from_secs(15)).await.unwrap().unwrap();
        let bogus = LeaseToken::generate();
        assert!(!mgr.release("slot:1", &bogus).await.unwrap());
        // the real holder can still release it
        assert!(mgr.release("slot:1", &token).await.unwrap());
    }

    #[tokio::test]
    async fn release_then_acquire_succeeds() {
        let mgr = InMemoryLockManager::new();
        let token = mgr.acquire("slot:1", Duration::from_secs(15)).await.unwrap().unwrap();
        assert!(mgr.release("slot:1", &token).await.unwrap());
        assert!(mgr.acquire("slot:1", Duration::from_secs(15)).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn expired_lease_can_be_reacquired_by_another_holder() {
        let mgr = InMemoryLockManager::new();
        let _first = mgr.acquire("slot:1", Duration::from_millis(10)).await.unwrap().unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        let second = mgr.acquire("slot:1", Duration::from_secs(15)).await.unwrap();
        assert!(second.is_some());
    }

    #[tokio::test]
    async fn stale_release_after_expiry_and_steal_returns_false() {
        let mgr = InMemoryLockManager::new();
        let first = mgr.acquire("slot:1", Duration::from_millis(10)).await.unwrap().unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        let _second = mgr.acquire("slot:1", Duration::from_secs(15)).await.unwrap().unwrap();
        // first holder's lease is gone; its release must not clobber the new holder's lock.
        assert!(!mgr.release("slot:1", &first).await.unwrap());
    }
}
