//! Error taxonomy for ledger operations.

/// Result type for ledger operations.
pub type Result<T> = std::result::Result<T, LedgerError>;

/// Errors that can occur while processing a ledger operation.
///
/// Each variant maps to a stable API error code; anything outside this
/// taxonomy rolls back the enclosing database transaction and surfaces as a
/// generic internal error.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    /// Malformed amount, app id, or idempotency key. Rejected before any
    /// lock or database work.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Unknown user, app, or transaction.
    #[error("not found: {0}")]
    NotFound(String),

    /// App not active/approved, or caller not authorized for the target user.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Consume exceeds the current balance.
    #[error("insufficient balance: balance={balance}, required={required}")]
    InsufficientBalance {
        /// Current balance in DUST.
        balance: i64,
        /// Required amount in DUST.
        required: i64,
    },

    /// Lock not acquired, or a one-per-day/one-per-app uniqueness constraint
    /// was violated. Retryable by the caller.
    #[error("conflict: {0}")]
    Conflict(String),

    /// The referenced consume has already been refunded.
    #[error("transaction already refunded: {transaction_id}")]
    AlreadyRefunded {
        /// The consume transaction that was already refunded.
        transaction_id: String,
    },

    /// The refund target is not a completed consume transaction.
    #[error("invalid refund target: {0}")]
    InvalidRefundTarget(String),

    /// App-validation or pricing lookup failed. A hard failure for consume.
    #[error("upstream unavailable: {0}")]
    Upstream(String),

    /// Durable store failure.
    #[error("storage error: {0}")]
    Storage(String),
}

impl LedgerError {
    /// Stable machine-readable code for API responses.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation_error",
            Self::NotFound(_) => "not_found",
            Self::Forbidden(_) => "forbidden",
            Self::InsufficientBalance { .. } => "insufficient_balance",
            Self::Conflict(_) => "conflict",
            Self::AlreadyRefunded { .. } => "already_refunded",
            Self::InvalidRefundTarget(_) => "invalid_refund_target",
            Self::Upstream(_) => "upstream_unavailable",
            Self::Storage(_) => "internal_error",
        }
    }
}
