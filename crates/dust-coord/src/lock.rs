//! Per-user mutual exclusion for balance mutations.
//!
//! Lock acquisition is a single conditional write against the coordination
//! store with a fresh owner token; contention surfaces immediately as
//! `LedgerError::Conflict` for the caller to retry at the application layer.
//! Release checks the token so an expired holder can never evict its
//! successor.

use std::sync::Arc;
use std::time::Duration;

use dust_core::{LedgerError, UserId};

use crate::memory::user_lock_key;
use crate::CoordStore;

/// Default time-to-live for a user lock.
pub const DEFAULT_LOCK_TTL: Duration = Duration::from_secs(2);

/// Acquires and releases per-user locks against the coordination store.
#[derive(Clone)]
pub struct LockManager {
    coord: Arc<dyn CoordStore>,
    ttl: Duration,
}

impl LockManager {
    /// Create a manager with the given lock TTL.
    #[must_use]
    pub fn new(coord: Arc<dyn CoordStore>, ttl: Duration) -> Self {
        Self { coord, ttl }
    }

    /// Try to acquire the lock for `user_id`, failing fast on contention.
    ///
    /// # Errors
    ///
    /// `LedgerError::Conflict` when another operation holds the lock;
    /// `LedgerError::Storage` when the coordination store is unreachable.
    pub async fn acquire(&self, user_id: &UserId) -> Result<UserLock, LedgerError> {
        let key = user_lock_key(user_id);
        let token = uuid::Uuid::new_v4().to_string();

        let acquired = self
            .coord
            .try_lock(&key, &token, self.ttl)
            .await
            .map_err(|e| LedgerError::Storage(e.to_string()))?;

        if !acquired {
            tracing::debug!(user_id = %user_id, "User lock contended");
            return Err(LedgerError::Conflict(
                "another balance operation is in progress for this user".into(),
            ));
        }

        Ok(UserLock {
            coord: Arc::clone(&self.coord),
            key,
            token,
        })
    }
}

/// A held per-user lock.
///
/// Callers must invoke [`UserLock::release`] from their cleanup path; an
/// unreleased lock is not a correctness problem (it times out after its
/// TTL) but will 409 concurrent callers until then.
pub struct UserLock {
    coord: Arc<dyn CoordStore>,
    key: String,
    token: String,
}

impl std::fmt::Debug for UserLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserLock")
            .field("key", &self.key)
            .field("token", &self.token)
            .finish_non_exhaustive()
    }
}

impl UserLock {
    /// Release the lock. Failures are logged, never propagated — the TTL
    /// bounds the damage.
    pub async fn release(self) {
        match self.coord.unlock(&self.key, &self.token).await {
            Ok(true) => {}
            Ok(false) => {
                tracing::warn!(key = %self.key, "Lock already expired before release");
            }
            Err(e) => {
                tracing::warn!(key = %self.key, error = %e, "Failed to release lock");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryCoord;

    #[tokio::test]
    async fn second_acquire_conflicts() {
        let coord: Arc<dyn CoordStore> = Arc::new(MemoryCoord::new());
        let locks = LockManager::new(coord, DEFAULT_LOCK_TTL);
        let user = UserId::generate();

        let held = locks.acquire(&user).await.unwrap();
        let err = locks.acquire(&user).await.unwrap_err();
        assert!(matches!(err, LedgerError::Conflict(_)));

        held.release().await;
        let reacquired = locks.acquire(&user).await.unwrap();
        reacquired.release().await;
    }

    #[tokio::test]
    async fn locks_for_different_users_are_independent() {
        let coord: Arc<dyn CoordStore> = Arc::new(MemoryCoord::new());
        let locks = LockManager::new(coord, DEFAULT_LOCK_TTL);

        let a = locks.acquire(&UserId::generate()).await.unwrap();
        let b = locks.acquire(&UserId::generate()).await.unwrap();
        a.release().await;
        b.release().await;
    }

    #[tokio::test]
    async fn expired_lock_release_does_not_evict_successor() {
        let coord: Arc<dyn CoordStore> = Arc::new(MemoryCoord::new());
        let user = UserId::generate();

        let short = LockManager::new(Arc::clone(&coord), Duration::from_millis(10));
        let normal = LockManager::new(Arc::clone(&coord), DEFAULT_LOCK_TTL);

        let stale = short.acquire(&user).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        let successor = normal.acquire(&user).await.unwrap();
        stale.release().await;

        // The successor still holds the lock.
        assert!(matches!(
            normal.acquire(&user).await.unwrap_err(),
            LedgerError::Conflict(_)
        ));
        successor.release().await;
    }
}
