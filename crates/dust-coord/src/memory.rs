//! In-process implementation of the coordination store.
//!
//! Backs a single-node deployment and the test suite. Entries carry an
//! absolute expiry; reads treat expired entries as absent and writes sweep
//! them out, so nothing outlives its TTL by more than one access.

use std::collections::HashMap;
use std::str::FromStr;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::Mutex;

use dust_core::{Balance, UserId};

use crate::{CoordStore, Result};

const LOCK_PREFIX: &str = "lock:user:";
const IDEM_PREFIX: &str = "idem:";
const BALANCE_PREFIX: &str = "balance:";

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Instant,
}

impl Entry {
    fn live(&self) -> bool {
        Instant::now() < self.expires_at
    }
}

/// In-memory coordination store.
#[derive(Default)]
pub struct MemoryCoord {
    entries: Mutex<HashMap<String, Entry>>,
}

impl MemoryCoord {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn sweep(entries: &mut HashMap<String, Entry>) {
        entries.retain(|_, e| e.live());
    }
}

#[async_trait]
impl CoordStore for MemoryCoord {
    async fn try_lock(&self, key: &str, token: &str, ttl: Duration) -> Result<bool> {
        let mut entries = self.entries.lock().await;
        Self::sweep(&mut entries);
        if entries.contains_key(key) {
            return Ok(false);
        }
        entries.insert(
            key.to_string(),
            Entry {
                value: token.to_string(),
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(true)
    }

    async fn unlock(&self, key: &str, token: &str) -> Result<bool> {
        let mut entries = self.entries.lock().await;
        match entries.get(key) {
            Some(entry) if entry.live() && entry.value == token => {
                entries.remove(key);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn get_idempotent(&self, key: &str) -> Result<Option<String>> {
        let entries = self.entries.lock().await;
        Ok(entries
            .get(&format!("{IDEM_PREFIX}{key}"))
            .filter(|e| e.live())
            .map(|e| e.value.clone()))
    }

    async fn put_idempotent(&self, key: &str, transaction_id: &str, ttl: Duration) -> Result<()> {
        let mut entries = self.entries.lock().await;
        Self::sweep(&mut entries);
        entries.insert(
            format!("{IDEM_PREFIX}{key}"),
            Entry {
                value: transaction_id.to_string(),
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn get_cached_balance(&self, user_id: &UserId) -> Result<Option<Balance>> {
        let entries = self.entries.lock().await;
        Ok(entries
            .get(&format!("{BALANCE_PREFIX}{user_id}"))
            .filter(|e| e.live())
            .and_then(|e| serde_json::from_str(&e.value).ok()))
    }

    async fn set_cached_balance(&self, balance: &Balance, ttl: Duration) -> Result<()> {
        let value = serde_json::to_string(balance)
            .map_err(|e| crate::CoordError::Unavailable(e.to_string()))?;
        let mut entries = self.entries.lock().await;
        Self::sweep(&mut entries);
        entries.insert(
            format!("{BALANCE_PREFIX}{}", balance.user_id),
            Entry {
                value,
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn invalidate_balance(&self, user_id: &UserId) -> Result<()> {
        let mut entries = self.entries.lock().await;
        entries.remove(&format!("{BALANCE_PREFIX}{user_id}"));
        Ok(())
    }

    async fn cached_balance_users(&self) -> Result<Vec<UserId>> {
        let entries = self.entries.lock().await;
        Ok(entries
            .iter()
            .filter(|(k, e)| k.starts_with(BALANCE_PREFIX) && e.live())
            .filter_map(|(k, _)| UserId::from_str(&k[BALANCE_PREFIX.len()..]).ok())
            .collect())
    }
}

/// Build the lock key for a user.
#[must_use]
pub fn user_lock_key(user_id: &UserId) -> String {
    format!("{LOCK_PREFIX}{user_id}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn lock_is_exclusive_until_released() {
        let coord = MemoryCoord::new();
        let ttl = Duration::from_secs(2);

        assert!(coord.try_lock("lock:user:a", "t1", ttl).await.unwrap());
        assert!(!coord.try_lock("lock:user:a", "t2", ttl).await.unwrap());

        assert!(coord.unlock("lock:user:a", "t1").await.unwrap());
        assert!(coord.try_lock("lock:user:a", "t2", ttl).await.unwrap());
    }

    #[tokio::test]
    async fn unlock_with_wrong_token_is_a_noop() {
        let coord = MemoryCoord::new();
        let ttl = Duration::from_secs(2);

        assert!(coord.try_lock("lock:user:a", "t1", ttl).await.unwrap());
        assert!(!coord.unlock("lock:user:a", "t2").await.unwrap());
        // Still held by t1.
        assert!(!coord.try_lock("lock:user:a", "t3", ttl).await.unwrap());
    }

    #[tokio::test]
    async fn expired_lock_can_be_reacquired() {
        let coord = MemoryCoord::new();

        assert!(coord
            .try_lock("lock:user:a", "t1", Duration::from_millis(10))
            .await
            .unwrap());
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(coord
            .try_lock("lock:user:a", "t2", Duration::from_secs(2))
            .await
            .unwrap());
        // t1's release must not evict t2's lock.
        assert!(!coord.unlock("lock:user:a", "t1").await.unwrap());
    }

    #[tokio::test]
    async fn idempotency_record_roundtrip_and_expiry() {
        let coord = MemoryCoord::new();

        coord
            .put_idempotent("k1", "01TX", Duration::from_millis(10))
            .await
            .unwrap();
        assert_eq!(
            coord.get_idempotent("k1").await.unwrap(),
            Some("01TX".to_string())
        );

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(coord.get_idempotent("k1").await.unwrap(), None);
    }

    #[tokio::test]
    async fn balance_cache_invalidation() {
        let coord = MemoryCoord::new();
        let user = UserId::generate();
        let mut balance = Balance::empty(user);
        balance.amount = 42;

        coord
            .set_cached_balance(&balance, Duration::from_secs(30))
            .await
            .unwrap();
        let cached = coord.get_cached_balance(&user).await.unwrap().unwrap();
        assert_eq!(cached.amount, 42);
        assert_eq!(coord.cached_balance_users().await.unwrap(), vec![user]);

        coord.invalidate_balance(&user).await.unwrap();
        assert!(coord.get_cached_balance(&user).await.unwrap().is_none());
        assert!(coord.cached_balance_users().await.unwrap().is_empty());
    }
}
