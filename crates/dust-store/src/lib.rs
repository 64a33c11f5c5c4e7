//! Postgres storage layer for the DUST ledger.
//!
//! The durable store is the sole source of truth: one `balances` row per
//! user and an append-only `transactions` ledger, plus the grant-tracking
//! and analytics tables. Repositories follow a two-level shape:
//!
//! - pool-scoped reads take a [`PgStore`] (they tolerate cache-level
//!   staleness and run outside any lock), and
//! - tx-scoped mutations take a `sqlx::Transaction<'_, Postgres>` so the
//!   transaction processor decides what commits together.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod analytics;
pub mod balances;
pub mod error;
pub mod grants;
pub mod streaks;
pub mod transactions;

use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, Transaction};

pub use error::{Result, StoreError};

/// Statement-level timeout applied to every pooled connection. A stuck
/// mutation must fail well before the advisory lock's TTL runs out.
const STATEMENT_TIMEOUT: &str = "SET statement_timeout = '1500ms'";

/// Handle to the ledger's Postgres database.
///
/// Owns the connection pool; constructed once at process start and
/// dependency-injected everywhere (never ambient global state).
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Connect to Postgres and verify the connection.
    ///
    /// # Errors
    ///
    /// Returns an error if the database is unreachable.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .after_connect(|conn, _meta| {
                Box::pin(async move {
                    sqlx::query(STATEMENT_TIMEOUT).execute(conn).await?;
                    Ok(())
                })
            })
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }

    /// Create a store whose pool connects on first use.
    ///
    /// Used by the test harness so request-validation paths can be exercised
    /// without a live database.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL cannot be parsed.
    pub fn connect_lazy(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new().connect_lazy(database_url)?;
        Ok(Self { pool })
    }

    /// Wrap an existing pool.
    #[must_use]
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Run the embedded schema migrations.
    ///
    /// # Errors
    ///
    /// Returns an error if a migration fails to apply.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::Database(sqlx::Error::Migrate(Box::new(e))))?;
        Ok(())
    }

    /// Begin a database transaction for a read-modify-write critical section.
    ///
    /// # Errors
    ///
    /// Returns an error if a connection cannot be acquired.
    pub async fn begin(&self) -> Result<Transaction<'static, Postgres>> {
        Ok(self.pool.begin().await?)
    }

    /// The underlying pool, for pool-scoped repository reads.
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}
