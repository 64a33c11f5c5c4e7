//! Coordination store for the DUST ledger.
//!
//! Everything in this crate is advisory and ephemeral: the per-user lock that
//! serializes balance mutations, the idempotency ledger that short-circuits
//! retried requests, and the short-TTL balance cache. The durable store's own
//! transaction remains the final arbiter of correctness — a crashed lock
//! holder simply times out, and a lost idempotency record is backstopped by
//! database uniqueness constraints.
//!
//! The [`CoordStore`] trait is the seam for the shared key-value service; the
//! bundled [`MemoryCoord`] implementation covers single-process deployments
//! and tests.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod events;
pub mod lock;
pub mod memory;

use std::time::Duration;

use async_trait::async_trait;

use dust_core::{Balance, UserId};

pub use events::EventBus;
pub use lock::{LockManager, UserLock};
pub use memory::MemoryCoord;

/// Result type for coordination-store operations.
pub type Result<T> = std::result::Result<T, CoordError>;

/// Errors from the coordination store.
///
/// These never carry correctness weight: callers treat a failed cache or
/// idempotency write as a miss and fall through to the durable store.
#[derive(Debug, thiserror::Error)]
pub enum CoordError {
    /// The backing key-value service failed.
    #[error("coordination store unavailable: {0}")]
    Unavailable(String),
}

/// The shared key-value coordination store.
///
/// Implementations must make `try_lock` a conditional set-if-absent and
/// `unlock` an atomic check-and-delete — releasing a lock another holder
/// acquired after TTL expiry must be impossible.
#[async_trait]
pub trait CoordStore: Send + Sync {
    /// Attempt to acquire `key` for `token` with the given TTL.
    ///
    /// Returns `false` immediately on contention; the primitive never blocks
    /// or retries.
    async fn try_lock(&self, key: &str, token: &str, ttl: Duration) -> Result<bool>;

    /// Release `key` if and only if it is still held by `token`.
    ///
    /// Returns `true` when the lock was released, `false` when it had already
    /// expired or been taken by another holder.
    async fn unlock(&self, key: &str, token: &str) -> Result<bool>;

    /// Look up the transaction id previously stored for an idempotency key.
    async fn get_idempotent(&self, key: &str) -> Result<Option<String>>;

    /// Map an idempotency key to the transaction it produced.
    async fn put_idempotent(&self, key: &str, transaction_id: &str, ttl: Duration) -> Result<()>;

    /// Read a cached balance snapshot, if present and unexpired.
    async fn get_cached_balance(&self, user_id: &UserId) -> Result<Option<Balance>>;

    /// Cache a balance snapshot with the given TTL.
    async fn set_cached_balance(&self, balance: &Balance, ttl: Duration) -> Result<()>;

    /// Drop a cached balance. Called after every mutation.
    async fn invalidate_balance(&self, user_id: &UserId) -> Result<()>;

    /// Users with a currently cached balance, for the reconciler's sync pass.
    async fn cached_balance_users(&self) -> Result<Vec<UserId>>;
}
