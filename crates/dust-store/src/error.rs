//! Storage error types.

use dust_core::LedgerError;

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Postgres unique-violation SQLSTATE.
const UNIQUE_VIOLATION: &str = "23505";

/// Errors from the durable store.
///
/// Unique violations are classified by constraint name so the processor can
/// turn races into their domain errors (already-claimed, already-refunded,
/// duplicate idempotency key) instead of opaque database failures.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// An entity lookup found nothing.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// Entity kind, e.g. "balance" or "transaction".
        entity: &'static str,
        /// The id that was looked up.
        id: String,
    },

    /// A transaction with this idempotency key already exists.
    #[error("idempotency key already used")]
    DuplicateIdempotencyKey,

    /// An `app_grants` uniqueness constraint fired: the grant was already
    /// issued for this (user, app[, day]).
    #[error("grant already issued")]
    DuplicateGrant,

    /// A refund for the target transaction already exists.
    #[error("refund already recorded")]
    DuplicateRefund,

    /// A stored row failed to decode into its domain type.
    #[error("corrupt row: {0}")]
    Corrupt(String),

    /// Any other database failure.
    #[error("database error: {0}")]
    Database(sqlx::Error),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db) = &err {
            if db.code().as_deref() == Some(UNIQUE_VIOLATION) {
                return match db.constraint() {
                    Some("transactions_idempotency_key_key") => Self::DuplicateIdempotencyKey,
                    Some("transactions_one_refund_per_target") => Self::DuplicateRefund,
                    Some("app_grants_once_per_app" | "app_grants_once_per_day") => {
                        Self::DuplicateGrant
                    }
                    _ => Self::Database(err),
                };
            }
        }
        Self::Database(err)
    }
}

impl From<StoreError> for LedgerError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { entity, id } => Self::NotFound(format!("{entity}: {id}")),
            StoreError::DuplicateGrant => Self::Conflict("grant already claimed".into()),
            StoreError::DuplicateRefund => Self::Conflict("refund already recorded".into()),
            StoreError::DuplicateIdempotencyKey => {
                Self::Conflict("idempotency key already used".into())
            }
            StoreError::Corrupt(msg) => Self::Storage(msg),
            StoreError::Database(e) => Self::Storage(e.to_string()),
        }
    }
}
