//! App grant repository.
//!
//! The partial unique indexes on `app_grants` are the authoritative
//! de-duplication mechanism for one-time and daily grants; the idempotency
//! cache in front of them is only a fast path.

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{FromRow, Postgres, Transaction as PgTransaction};
use uuid::Uuid;

use dust_core::{AppGrant, AppId, GrantKind, TransactionId, UserId};

use crate::{PgStore, Result, StoreError};

#[derive(Debug, FromRow)]
struct GrantRow {
    user_id: Uuid,
    app_id: Uuid,
    grant_type: String,
    granted_date: Option<NaiveDate>,
    transaction_id: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<GrantRow> for AppGrant {
    type Error = StoreError;

    fn try_from(row: GrantRow) -> Result<Self> {
        Ok(Self {
            user_id: UserId::from_uuid(row.user_id),
            app_id: AppId::from_uuid(row.app_id),
            kind: row
                .grant_type
                .parse()
                .map_err(|_| StoreError::Corrupt(format!("grant_type: {}", row.grant_type)))?,
            granted_date: row.granted_date,
            transaction_id: row.transaction_id.trim().parse().map_err(|_| {
                StoreError::Corrupt(format!("transaction id: {}", row.transaction_id))
            })?,
            created_at: row.created_at,
        })
    }
}

/// Record a grant inside the same transaction as its ledger entry.
///
/// # Errors
///
/// `StoreError::DuplicateGrant` when the (user, app, type[, day]) row
/// already exists — a concurrent claim lost the race.
pub async fn insert(tx: &mut PgTransaction<'_, Postgres>, grant: &AppGrant) -> Result<()> {
    sqlx::query(
        "INSERT INTO app_grants (user_id, app_id, grant_type, granted_date, transaction_id)
         VALUES ($1, $2, $3, $4, $5)",
    )
    .bind(grant.user_id.as_uuid())
    .bind(grant.app_id.as_uuid())
    .bind(grant.kind.as_str())
    .bind(grant.granted_date)
    .bind(grant.transaction_id.to_string())
    .execute(&mut **tx)
    .await?;

    Ok(())
}

/// Look up a one-time grant for (user, app, kind).
///
/// # Errors
///
/// Returns an error on database failure or a corrupt row.
pub async fn find_one_time(
    store: &PgStore,
    user_id: &UserId,
    app_id: &AppId,
    kind: GrantKind,
) -> Result<Option<AppGrant>> {
    let row = sqlx::query_as::<_, GrantRow>(
        "SELECT user_id, app_id, grant_type, granted_date, transaction_id, created_at
         FROM app_grants
         WHERE user_id = $1 AND app_id = $2 AND grant_type = $3 AND granted_date IS NULL",
    )
    .bind(user_id.as_uuid())
    .bind(app_id.as_uuid())
    .bind(kind.as_str())
    .fetch_optional(store.pool())
    .await?;

    row.map(AppGrant::try_from).transpose()
}

/// Look up a daily grant for (user, app, kind, day).
///
/// # Errors
///
/// Returns an error on database failure or a corrupt row.
pub async fn find_daily(
    store: &PgStore,
    user_id: &UserId,
    app_id: &AppId,
    kind: GrantKind,
    day: NaiveDate,
) -> Result<Option<AppGrant>> {
    let row = sqlx::query_as::<_, GrantRow>(
        "SELECT user_id, app_id, grant_type, granted_date, transaction_id, created_at
         FROM app_grants
         WHERE user_id = $1 AND app_id = $2 AND grant_type = $3 AND granted_date = $4",
    )
    .bind(user_id.as_uuid())
    .bind(app_id.as_uuid())
    .bind(kind.as_str())
    .bind(day)
    .fetch_optional(store.pool())
    .await?;

    row.map(AppGrant::try_from).transpose()
}

/// Convenience constructor for a grant row pointing at its transaction.
#[must_use]
pub fn new_grant(
    user_id: UserId,
    app_id: AppId,
    kind: GrantKind,
    granted_date: Option<NaiveDate>,
    transaction_id: TransactionId,
) -> AppGrant {
    AppGrant {
        user_id,
        app_id,
        kind,
        granted_date,
        transaction_id,
        created_at: Utc::now(),
    }
}
