//! Ledger transaction types.
//!
//! Every change to a user's balance creates exactly one immutable
//! `Transaction` record; the balance is always the sum of the completed
//! transaction amounts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::{AppId, LedgerError, TransactionId, UserId};

/// Maximum accepted length of a caller-supplied idempotency key.
pub const IDEMPOTENCY_KEY_MAX_LEN: usize = 128;

/// An immutable ledger entry recording one balance change.
///
/// Amounts are signed: negative for consumption, positive for grants,
/// purchases, and refunds. Once `status` is `Completed` the amount and type
/// never change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    /// Unique transaction ID (ULID for time-ordering).
    pub id: TransactionId,

    /// The user whose balance was affected.
    pub user_id: UserId,

    /// Signed amount in DUST.
    pub amount: i64,

    /// Type of transaction.
    pub tx_type: TransactionType,

    /// Lifecycle status.
    pub status: TransactionStatus,

    /// Human-readable description.
    pub description: String,

    /// The consuming/granting application, when applicable.
    pub app_id: Option<AppId>,

    /// Opaque metadata payload (action name, payment id, admin id, ...).
    pub metadata: serde_json::Value,

    /// Caller-supplied idempotency key, unique when present.
    pub idempotency_key: Option<String>,

    /// When the transaction was created.
    pub created_at: DateTime<Utc>,

    /// When the transaction was last updated.
    pub updated_at: DateTime<Utc>,
}

impl Transaction {
    fn new(
        user_id: UserId,
        amount: i64,
        tx_type: TransactionType,
        description: String,
        app_id: Option<AppId>,
        metadata: serde_json::Value,
        idempotency_key: Option<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: TransactionId::generate(),
            user_id,
            amount,
            tx_type,
            status: TransactionStatus::Completed,
            description,
            app_id,
            metadata,
            idempotency_key,
            created_at: now,
            updated_at: now,
        }
    }

    /// Create a consume transaction. The amount is always recorded negative.
    #[must_use]
    pub fn consume(
        user_id: UserId,
        amount: i64,
        app_id: AppId,
        description: String,
        metadata: serde_json::Value,
        idempotency_key: Option<String>,
    ) -> Self {
        Self::new(
            user_id,
            -amount.abs(),
            TransactionType::Consume,
            description,
            Some(app_id),
            metadata,
            idempotency_key,
        )
    }

    /// Create a grant transaction (initial, streak, referral, promotional, admin).
    #[must_use]
    pub fn grant(
        user_id: UserId,
        amount: i64,
        description: String,
        app_id: Option<AppId>,
        metadata: serde_json::Value,
        idempotency_key: Option<String>,
    ) -> Self {
        Self::new(
            user_id,
            amount.abs(),
            TransactionType::Grant,
            description,
            app_id,
            metadata,
            idempotency_key,
        )
    }

    /// Create a purchase transaction recording the DUST effect of a verified payment.
    #[must_use]
    pub fn purchase(
        user_id: UserId,
        amount: i64,
        description: String,
        metadata: serde_json::Value,
        idempotency_key: Option<String>,
    ) -> Self {
        Self::new(
            user_id,
            amount.abs(),
            TransactionType::Purchase,
            description,
            None,
            metadata,
            idempotency_key,
        )
    }

    /// Create a signed admin adjustment.
    ///
    /// Positive deltas are recorded as grants, negative deltas as consumes,
    /// so the sign convention of the ledger holds for manual corrections too.
    #[must_use]
    pub fn adjustment(
        user_id: UserId,
        delta: i64,
        reason: String,
        admin_id: String,
    ) -> Self {
        let tx_type = if delta < 0 {
            TransactionType::Consume
        } else {
            TransactionType::Grant
        };
        let metadata = serde_json::json!({
            "adjustment": true,
            "admin_id": admin_id,
        });
        Self::new(user_id, delta, tx_type, reason, None, metadata, None)
    }

    /// Create a refund transaction crediting back a prior consume.
    ///
    /// The original transaction id is recorded under the
    /// `refunded_transaction_id` metadata key.
    #[must_use]
    pub fn refund(
        user_id: UserId,
        amount: i64,
        original: TransactionId,
        reason: String,
        admin_id: Option<String>,
    ) -> Self {
        let metadata = serde_json::json!({
            "refunded_transaction_id": original.to_string(),
            "admin_id": admin_id,
        });
        Self::new(
            user_id,
            amount.abs(),
            TransactionType::Refund,
            reason,
            None,
            metadata,
            None,
        )
    }
}

/// Type of ledger transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    /// Credit not tied to a purchase (initial, streak, referral, promo, admin).
    Grant,

    /// Debit for using a feature or app.
    Consume,

    /// Credit recording the DUST effect of a verified payment.
    Purchase,

    /// Credit reversing a prior consume.
    Refund,

    /// Peer-to-peer transfer. Present in the data model, currently unused.
    Transfer,
}

impl TransactionType {
    /// Stable string form used in the database and in API filters.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Grant => "grant",
            Self::Consume => "consume",
            Self::Purchase => "purchase",
            Self::Refund => "refund",
            Self::Transfer => "transfer",
        }
    }

    /// Check if this transaction type adds DUST (positive balance change).
    #[must_use]
    pub const fn is_credit(&self) -> bool {
        matches!(self, Self::Grant | Self::Purchase | Self::Refund)
    }
}

impl FromStr for TransactionType {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "grant" => Ok(Self::Grant),
            "consume" => Ok(Self::Consume),
            "purchase" => Ok(Self::Purchase),
            "refund" => Ok(Self::Refund),
            "transfer" => Ok(Self::Transfer),
            other => Err(LedgerError::Validation(format!(
                "unknown transaction type: {other}"
            ))),
        }
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle status of a ledger transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    /// Created but not yet settled.
    Pending,

    /// Settled; amount and type are frozen.
    Completed,

    /// Abandoned, e.g. expired by the reconciler.
    Failed,

    /// Undone by a compensating transaction.
    Reversed,
}

impl TransactionStatus {
    /// Stable string form used in the database.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Reversed => "reversed",
        }
    }
}

impl FromStr for TransactionStatus {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "reversed" => Ok(Self::Reversed),
            other => Err(LedgerError::Validation(format!(
                "unknown transaction status: {other}"
            ))),
        }
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Validate a caller-supplied idempotency key.
///
/// Keys must match `[A-Za-z0-9_\-:]+` and be at most
/// [`IDEMPOTENCY_KEY_MAX_LEN`] characters.
///
/// # Errors
///
/// Returns `LedgerError::Validation` for an empty, oversized, or
/// malformed key.
pub fn validate_idempotency_key(key: &str) -> crate::Result<()> {
    if key.is_empty() {
        return Err(LedgerError::Validation("idempotency key is empty".into()));
    }
    if key.len() > IDEMPOTENCY_KEY_MAX_LEN {
        return Err(LedgerError::Validation(format!(
            "idempotency key exceeds {IDEMPOTENCY_KEY_MAX_LEN} characters"
        )));
    }
    if !key
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | ':'))
    {
        return Err(LedgerError::Validation(
            "idempotency key may only contain [A-Za-z0-9_-:]".into(),
        ));
    }
    Ok(())
}
