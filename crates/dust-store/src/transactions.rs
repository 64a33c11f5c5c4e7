//! Transaction ledger repository.

use chrono::{DateTime, Utc};
use sqlx::{FromRow, Postgres, Transaction as PgTransaction};
use uuid::Uuid;

use dust_core::{AppId, Transaction, TransactionId, TransactionType, UserId};

use crate::{PgStore, Result, StoreError};

#[derive(Debug, FromRow)]
struct TransactionRow {
    id: String,
    user_id: Uuid,
    amount: i64,
    tx_type: String,
    status: String,
    description: String,
    app_id: Option<Uuid>,
    metadata: serde_json::Value,
    idempotency_key: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<TransactionRow> for Transaction {
    type Error = StoreError;

    fn try_from(row: TransactionRow) -> Result<Self> {
        Ok(Self {
            id: row
                .id
                .trim()
                .parse()
                .map_err(|_| StoreError::Corrupt(format!("transaction id: {}", row.id)))?,
            user_id: UserId::from_uuid(row.user_id),
            amount: row.amount,
            tx_type: row
                .tx_type
                .parse()
                .map_err(|_| StoreError::Corrupt(format!("tx_type: {}", row.tx_type)))?,
            status: row
                .status
                .parse()
                .map_err(|_| StoreError::Corrupt(format!("status: {}", row.status)))?,
            description: row.description,
            app_id: row.app_id.map(AppId::from_uuid),
            metadata: row.metadata,
            idempotency_key: row.idempotency_key,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

const SELECT_COLUMNS: &str = "id, user_id, amount, tx_type, status, description, app_id, \
                              metadata, idempotency_key, created_at, updated_at";

/// Append a transaction to the ledger inside the critical section.
///
/// # Errors
///
/// `StoreError::DuplicateIdempotencyKey` or `StoreError::DuplicateRefund`
/// when the corresponding unique index fires; any other database failure as
/// `StoreError::Database`.
pub async fn insert(tx: &mut PgTransaction<'_, Postgres>, t: &Transaction) -> Result<()> {
    sqlx::query(
        "INSERT INTO transactions
            (id, user_id, amount, tx_type, status, description, app_id, metadata,
             idempotency_key, created_at, updated_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
    )
    .bind(t.id.to_string())
    .bind(t.user_id.as_uuid())
    .bind(t.amount)
    .bind(t.tx_type.as_str())
    .bind(t.status.as_str())
    .bind(&t.description)
    .bind(t.app_id.as_ref().map(AppId::as_uuid))
    .bind(&t.metadata)
    .bind(&t.idempotency_key)
    .bind(t.created_at)
    .bind(t.updated_at)
    .execute(&mut **tx)
    .await?;

    Ok(())
}

/// Fetch a transaction by id.
///
/// # Errors
///
/// Returns an error on database failure or a corrupt row.
pub async fn get(store: &PgStore, id: &TransactionId) -> Result<Option<Transaction>> {
    let row = sqlx::query_as::<_, TransactionRow>(&format!(
        "SELECT {SELECT_COLUMNS} FROM transactions WHERE id = $1"
    ))
    .bind(id.to_string())
    .fetch_optional(store.pool())
    .await?;

    row.map(Transaction::try_from).transpose()
}

/// Fetch the transaction previously committed under an idempotency key.
///
/// This is the durable backstop behind the coordination-store fast path: a
/// retry whose cached mapping was lost still resolves to the original row.
///
/// # Errors
///
/// Returns an error on database failure or a corrupt row.
pub async fn get_by_idempotency_key(store: &PgStore, key: &str) -> Result<Option<Transaction>> {
    let row = sqlx::query_as::<_, TransactionRow>(&format!(
        "SELECT {SELECT_COLUMNS} FROM transactions WHERE idempotency_key = $1"
    ))
    .bind(key)
    .fetch_optional(store.pool())
    .await?;

    row.map(Transaction::try_from).transpose()
}

/// Find the refund that references `original`, if one exists.
///
/// # Errors
///
/// Returns an error on database failure or a corrupt row.
pub async fn find_refund_of(
    store: &PgStore,
    original: &TransactionId,
) -> Result<Option<Transaction>> {
    let row = sqlx::query_as::<_, TransactionRow>(&format!(
        "SELECT {SELECT_COLUMNS} FROM transactions
         WHERE tx_type = 'refund' AND metadata ->> 'refunded_transaction_id' = $1"
    ))
    .bind(original.to_string())
    .fetch_optional(store.pool())
    .await?;

    row.map(Transaction::try_from).transpose()
}

/// Paginated transaction history for a user, newest first, with optional
/// type and app filters.
///
/// # Errors
///
/// Returns an error on database failure or a corrupt row.
pub async fn list_for_user(
    store: &PgStore,
    user_id: &UserId,
    limit: i64,
    offset: i64,
    tx_type: Option<TransactionType>,
    app_id: Option<&AppId>,
) -> Result<Vec<Transaction>> {
    let rows = sqlx::query_as::<_, TransactionRow>(&format!(
        "SELECT {SELECT_COLUMNS} FROM transactions
         WHERE user_id = $1
           AND ($2::text IS NULL OR tx_type = $2)
           AND ($3::uuid IS NULL OR app_id = $3)
         ORDER BY id DESC
         LIMIT $4 OFFSET $5"
    ))
    .bind(user_id.as_uuid())
    .bind(tx_type.map(|t| t.as_str()))
    .bind(app_id.map(AppId::as_uuid))
    .bind(limit)
    .bind(offset)
    .fetch_all(store.pool())
    .await?;

    rows.into_iter().map(Transaction::try_from).collect()
}

/// Mark pending transactions created before `cutoff` as failed.
///
/// Run by the reconciler; returns the number of rows expired.
///
/// # Errors
///
/// Returns an error on database failure.
pub async fn expire_stale_pending(store: &PgStore, cutoff: DateTime<Utc>) -> Result<u64> {
    let result = sqlx::query(
        "UPDATE transactions SET status = 'failed', updated_at = now()
         WHERE status = 'pending' AND created_at < $1",
    )
    .bind(cutoff)
    .execute(store.pool())
    .await?;

    Ok(result.rows_affected())
}
