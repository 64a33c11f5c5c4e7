//! Hourly consumption rollups.
//!
//! The reconciler re-aggregates recent hours on every pass; the upsert
//! replaces the row wholesale, so repeated passes over the same hour are
//! idempotent.

use chrono::{DateTime, Utc};
use sqlx::FromRow;

use crate::{PgStore, Result};

/// One per-app, per-hour consumption summary.
#[derive(Debug, Clone, FromRow)]
pub struct UsageRollup {
    /// The consuming application.
    pub app_id: uuid::Uuid,
    /// Start of the aggregated hour.
    pub hour_start: DateTime<Utc>,
    /// Number of completed consume transactions.
    pub tx_count: i64,
    /// Total DUST consumed (positive).
    pub total_consumed: i64,
}

/// Aggregate completed consumption since `since` into `usage_rollups`.
///
/// Returns the number of (app, hour) rows written.
///
/// # Errors
///
/// Returns an error on database failure.
pub async fn rollup_consumption(store: &PgStore, since: DateTime<Utc>) -> Result<u64> {
    let result = sqlx::query(
        "INSERT INTO usage_rollups (app_id, hour_start, tx_count, total_consumed, updated_at)
         SELECT app_id,
                date_trunc('hour', created_at) AS hour_start,
                count(*),
                COALESCE(SUM(-amount), 0),
                now()
         FROM transactions
         WHERE tx_type = 'consume'
           AND status = 'completed'
           AND app_id IS NOT NULL
           AND created_at >= $1
         GROUP BY app_id, date_trunc('hour', created_at)
         ON CONFLICT (app_id, hour_start) DO UPDATE SET
             tx_count = EXCLUDED.tx_count,
             total_consumed = EXCLUDED.total_consumed,
             updated_at = now()",
    )
    .bind(since)
    .execute(store.pool())
    .await?;

    Ok(result.rows_affected())
}

/// Read rollups for an app, newest hour first.
///
/// # Errors
///
/// Returns an error on database failure.
pub async fn rollups_for_app(
    store: &PgStore,
    app_id: &uuid::Uuid,
    limit: i64,
) -> Result<Vec<UsageRollup>> {
    let rows = sqlx::query_as::<_, UsageRollup>(
        "SELECT app_id, hour_start, tx_count, total_consumed
         FROM usage_rollups
         WHERE app_id = $1
         ORDER BY hour_start DESC
         LIMIT $2",
    )
    .bind(app_id)
    .bind(limit)
    .fetch_all(store.pool())
    .await?;

    Ok(rows)
}
