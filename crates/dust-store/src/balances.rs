//! Balance repository.
//!
//! The `FOR UPDATE` variants are the strong reads used inside the
//! processor's critical section; plain reads serve the cache-miss path and
//! the reconciler.

use chrono::{DateTime, Utc};
use sqlx::{FromRow, Postgres, Transaction};
use uuid::Uuid;

use dust_core::{Balance, UserId};

use crate::{PgStore, Result};

#[derive(Debug, FromRow)]
struct BalanceRow {
    user_id: Uuid,
    amount: i64,
    updated_at: DateTime<Utc>,
}

impl From<BalanceRow> for Balance {
    fn from(row: BalanceRow) -> Self {
        Self {
            user_id: UserId::from_uuid(row.user_id),
            amount: row.amount,
            updated_at: row.updated_at,
        }
    }
}

/// Read a balance without locking. Returns `None` for users the ledger has
/// never credited.
///
/// # Errors
///
/// Returns an error on database failure.
pub async fn get(store: &PgStore, user_id: &UserId) -> Result<Option<Balance>> {
    let row = sqlx::query_as::<_, BalanceRow>(
        "SELECT user_id, amount, updated_at FROM balances WHERE user_id = $1",
    )
    .bind(user_id.as_uuid())
    .fetch_optional(store.pool())
    .await?;

    Ok(row.map(Balance::from))
}

/// Read a balance with a row lock, creating the zero row on first touch.
///
/// Every mutating operation goes through this read so two processes that
/// both slipped past the advisory lock still serialize here.
///
/// # Errors
///
/// Returns an error on database failure.
pub async fn get_or_create_for_update(
    tx: &mut Transaction<'_, Postgres>,
    user_id: &UserId,
) -> Result<Balance> {
    sqlx::query(
        "INSERT INTO balances (user_id, amount, updated_at) VALUES ($1, 0, now())
         ON CONFLICT (user_id) DO NOTHING",
    )
    .bind(user_id.as_uuid())
    .execute(&mut **tx)
    .await?;

    let row = sqlx::query_as::<_, BalanceRow>(
        "SELECT user_id, amount, updated_at FROM balances WHERE user_id = $1 FOR UPDATE",
    )
    .bind(user_id.as_uuid())
    .fetch_one(&mut **tx)
    .await?;

    Ok(row.into())
}

/// Write a new balance amount inside the critical section.
///
/// # Errors
///
/// Returns an error on database failure, including the CHECK violation if a
/// caller ever tries to write a negative amount.
pub async fn set_amount(
    tx: &mut Transaction<'_, Postgres>,
    user_id: &UserId,
    amount: i64,
) -> Result<()> {
    sqlx::query("UPDATE balances SET amount = $2, updated_at = now() WHERE user_id = $1")
        .bind(user_id.as_uuid())
        .bind(amount)
        .execute(&mut **tx)
        .await?;
    Ok(())
}

/// Sum of pending transaction amounts for a user, for the balance endpoint.
///
/// # Errors
///
/// Returns an error on database failure.
pub async fn pending_delta(store: &PgStore, user_id: &UserId) -> Result<i64> {
    let (sum,): (i64,) = sqlx::query_as(
        "SELECT COALESCE(SUM(amount), 0) FROM transactions
         WHERE user_id = $1 AND status = 'pending'",
    )
    .bind(user_id.as_uuid())
    .fetch_one(store.pool())
    .await?;

    Ok(sum)
}

/// Sum of completed transaction amounts for a user.
///
/// The ledger-consistency invariant is `balance == sum_completed`; the
/// reconciler and the audit tests both check it through this query.
///
/// # Errors
///
/// Returns an error on database failure.
pub async fn sum_completed(store: &PgStore, user_id: &UserId) -> Result<i64> {
    let (sum,): (i64,) = sqlx::query_as(
        "SELECT COALESCE(SUM(amount), 0) FROM transactions
         WHERE user_id = $1 AND status = 'completed'",
    )
    .bind(user_id.as_uuid())
    .fetch_one(store.pool())
    .await?;

    Ok(sum)
}
