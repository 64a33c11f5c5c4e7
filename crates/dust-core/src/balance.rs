//! Balance types and change events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{TransactionId, TransactionType, UserId};

/// A user's current DUST balance.
///
/// One row per user in the durable store; `amount` is the only mutable
/// field and never goes below zero.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Balance {
    /// The balance owner.
    pub user_id: UserId,

    /// Current balance in DUST, always non-negative.
    pub amount: i64,

    /// When the balance last changed.
    pub updated_at: DateTime<Utc>,
}

impl Balance {
    /// A zero balance for a user the ledger has not seen yet.
    #[must_use]
    pub fn empty(user_id: UserId) -> Self {
        Self {
            user_id,
            amount: 0,
            updated_at: Utc::now(),
        }
    }
}

/// A balance-change notification published after a successful commit.
///
/// Delivery is best-effort; the durable ledger is the source of truth and
/// listeners must tolerate missed events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BalanceChanged {
    /// The affected user.
    pub user_id: UserId,

    /// Signed change applied to the balance.
    pub delta: i64,

    /// Balance after the change.
    pub balance: i64,

    /// The transaction that caused the change.
    pub transaction_id: TransactionId,

    /// Type of the causing transaction.
    pub tx_type: TransactionType,

    /// When the change was committed.
    pub at: DateTime<Utc>,
}
