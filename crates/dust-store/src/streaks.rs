//! Login-streak repository.
//!
//! The streak counter is recomputed inside the same database transaction as
//! the bonus grant it sizes, under the user's balance row lock.

use chrono::NaiveDate;
use sqlx::{Postgres, Transaction as PgTransaction};

use dust_core::UserId;

use crate::Result;

/// Read a user's streak counter with a row lock.
///
/// Returns `(current_streak, last_login_date)` or `None` for a first-ever
/// claim.
///
/// # Errors
///
/// Returns an error on database failure.
pub async fn get_for_update(
    tx: &mut PgTransaction<'_, Postgres>,
    user_id: &UserId,
) -> Result<Option<(u32, NaiveDate)>> {
    let row: Option<(i32, NaiveDate)> = sqlx::query_as(
        "SELECT current_streak, last_login_date FROM login_streaks
         WHERE user_id = $1 FOR UPDATE",
    )
    .bind(user_id.as_uuid())
    .fetch_optional(&mut **tx)
    .await?;

    Ok(row.map(|(streak, date)| (streak.unsigned_abs(), date)))
}

/// Write the recomputed streak counter.
///
/// # Errors
///
/// Returns an error on database failure.
pub async fn upsert(
    tx: &mut PgTransaction<'_, Postgres>,
    user_id: &UserId,
    streak: u32,
    login_date: NaiveDate,
) -> Result<()> {
    sqlx::query(
        "INSERT INTO login_streaks (user_id, current_streak, last_login_date, updated_at)
         VALUES ($1, $2, $3, now())
         ON CONFLICT (user_id) DO UPDATE SET
             current_streak = EXCLUDED.current_streak,
             last_login_date = EXCLUDED.last_login_date,
             updated_at = now()",
    )
    .bind(user_id.as_uuid())
    .bind(i32::try_from(streak).unwrap_or(i32::MAX))
    .bind(login_date)
    .execute(&mut **tx)
    .await?;

    Ok(())
}
