//! Background reconciliation jobs.
//!
//! Four independent loops: balance-cache sync, stale-pending expiry, hourly
//! consumption rollup, and the balance-change relay. Each runs in its own
//! task, sleeps its interval between passes, and backs off to a shorter
//! retry interval on error — a failure in one loop never stops the others,
//! and none of them share mutable state with the request path beyond the
//! store and the cache.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;

use dust_coord::{CoordStore, EventBus};
use dust_store::{analytics, balances, transactions, PgStore};

use crate::config::ServiceConfig;

/// Pending transactions older than this are marked failed.
const PENDING_MAX_AGE: Duration = Duration::from_secs(3600);

/// Rollup passes re-aggregate this far back, so a pass that lands just
/// after an hour boundary still finalizes the previous hour.
const ROLLUP_LOOKBACK: Duration = Duration::from_secs(2 * 3600);

/// Spawn all reconciler loops. The returned handles are held by `main` for
/// the life of the process.
pub fn spawn_all(
    store: Arc<PgStore>,
    coord: Arc<dyn CoordStore>,
    events: &EventBus,
    config: &ServiceConfig,
) -> Vec<JoinHandle<()>> {
    vec![
        spawn_cache_sync(
            Arc::clone(&store),
            Arc::clone(&coord),
            config.cache_sync_interval,
            config.balance_cache_ttl,
            config.job_error_backoff,
        ),
        spawn_pending_expiry(
            Arc::clone(&store),
            config.pending_expiry_interval,
            config.job_error_backoff,
        ),
        spawn_rollup(store, config.rollup_interval, config.job_error_backoff),
        spawn_relay(events.clone()),
    ]
}

/// Periodically rewrite cached balances from the durable store, bounding
/// cache staleness for hot users.
fn spawn_cache_sync(
    store: Arc<PgStore>,
    coord: Arc<dyn CoordStore>,
    interval: Duration,
    cache_ttl: Duration,
    backoff: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match cache_sync_pass(&store, &coord, cache_ttl).await {
                Ok(synced) => {
                    if synced > 0 {
                        tracing::debug!(synced, "Balance cache sync pass complete");
                    }
                    tokio::time::sleep(interval).await;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Balance cache sync failed, backing off");
                    tokio::time::sleep(backoff).await;
                }
            }
        }
    })
}

async fn cache_sync_pass(
    store: &PgStore,
    coord: &Arc<dyn CoordStore>,
    cache_ttl: Duration,
) -> Result<usize, Box<dyn std::error::Error + Send + Sync>> {
    let users = coord.cached_balance_users().await?;
    let mut synced = 0;

    for user_id in users {
        match balances::get(store, &user_id).await? {
            Some(balance) => {
                coord.set_cached_balance(&balance, cache_ttl).await?;
                synced += 1;
            }
            None => coord.invalidate_balance(&user_id).await?,
        }
    }

    Ok(synced)
}

/// Mark pending transactions older than an hour as failed.
fn spawn_pending_expiry(
    store: Arc<PgStore>,
    interval: Duration,
    backoff: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let cutoff = Utc::now()
                - chrono::Duration::from_std(PENDING_MAX_AGE).unwrap_or(chrono::Duration::hours(1));

            match transactions::expire_stale_pending(&store, cutoff).await {
                Ok(expired) => {
                    if expired > 0 {
                        tracing::info!(expired, "Expired stale pending transactions");
                    }
                    tokio::time::sleep(interval).await;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Pending expiry failed, backing off");
                    tokio::time::sleep(backoff).await;
                }
            }
        }
    })
}

/// Aggregate completed consumption into per-app, per-hour rollups.
fn spawn_rollup(store: Arc<PgStore>, interval: Duration, backoff: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let since = Utc::now()
                - chrono::Duration::from_std(ROLLUP_LOOKBACK).unwrap_or(chrono::Duration::hours(2));

            match analytics::rollup_consumption(&store, since).await {
                Ok(rows) => {
                    tracing::debug!(rows, "Consumption rollup pass complete");
                    tokio::time::sleep(interval).await;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Consumption rollup failed, backing off");
                    tokio::time::sleep(backoff).await;
                }
            }
        }
    })
}

/// Forward balance-change events to the logs. Websocket and notification
/// fan-out live in the platform layer; this relay is what they subscribe
/// through.
fn spawn_relay(events: EventBus) -> JoinHandle<()> {
    let mut rx = events.subscribe();

    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    tracing::info!(
                        user_id = %event.user_id,
                        delta = %event.delta,
                        balance = %event.balance,
                        transaction_id = %event.transaction_id,
                        tx_type = %event.tx_type,
                        "Balance changed"
                    );
                }
                Err(RecvError::Lagged(missed)) => {
                    tracing::warn!(missed, "Balance relay lagged; events dropped");
                }
                Err(RecvError::Closed) => {
                    tracing::debug!("Balance event channel closed; relay stopping");
                    break;
                }
            }
        }
    })
}
