//! Collaborator clients: app validity and action pricing.
//!
//! Both are plain HTTP lookups with short in-memory caches. App validation
//! failing is a hard failure for consume (crediting an unapproved app is
//! worse than a 502); missing pricing data merely degrades to trusting the
//! caller-supplied amount.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use serde::Deserialize;
use tokio::sync::RwLock;

use dust_core::{AppId, LedgerError};

/// How long app-status and pricing lookups are cached.
const LOOKUP_CACHE_DURATION: Duration = Duration::from_secs(300);

/// Timeout for collaborator requests.
const LOOKUP_TIMEOUT: Duration = Duration::from_secs(5);

/// App validity as reported by the app directory.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct AppStatus {
    /// The app exists and is known to the platform.
    pub is_valid: bool,
    /// The app is approved and allowed to transact.
    pub is_active: bool,
}

/// Client for the app-directory validity lookup.
pub struct AppDirectoryClient {
    client: reqwest::Client,
    base_url: String,
    cache: RwLock<HashMap<AppId, (AppStatus, Instant)>>,
}

impl AppDirectoryClient {
    /// Create a client for the given base URL.
    #[must_use]
    pub fn new(base_url: &str) -> Self {
        let client = reqwest::Client::builder()
            .timeout(LOOKUP_TIMEOUT)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Look up an app's validity, serving from cache when fresh.
    ///
    /// # Errors
    ///
    /// `LedgerError::Upstream` when the directory cannot be reached or
    /// returns an unexpected status.
    pub async fn check(&self, app_id: &AppId) -> Result<AppStatus, LedgerError> {
        {
            let cache = self.cache.read().await;
            if let Some((status, at)) = cache.get(app_id) {
                if at.elapsed() < LOOKUP_CACHE_DURATION {
                    return Ok(*status);
                }
            }
        }

        let url = format!("{}/v1/apps/{app_id}/status", self.base_url);
        let response = self.client.get(&url).send().await.map_err(|e| {
            tracing::error!(app_id = %app_id, error = %e, "App directory unreachable");
            LedgerError::Upstream("app validation unavailable".into())
        })?;

        let status = match response.status() {
            s if s.is_success() => response.json::<AppStatus>().await.map_err(|e| {
                tracing::error!(app_id = %app_id, error = %e, "Bad app directory response");
                LedgerError::Upstream("app validation returned malformed data".into())
            })?,
            s if s == reqwest::StatusCode::NOT_FOUND => AppStatus {
                is_valid: false,
                is_active: false,
            },
            s => {
                tracing::error!(app_id = %app_id, status = %s, "App directory error");
                return Err(LedgerError::Upstream("app validation unavailable".into()));
            }
        };

        self.cache
            .write()
            .await
            .insert(*app_id, (status, Instant::now()));

        Ok(status)
    }

    /// Fail unless the app is both known and active.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown app, `Forbidden` for an inactive one,
    /// `Upstream` when the lookup itself failed.
    pub async fn require_active(&self, app_id: &AppId) -> Result<(), LedgerError> {
        let status = self.check(app_id).await?;
        if !status.is_valid {
            return Err(LedgerError::NotFound(format!("app: {app_id}")));
        }
        if !status.is_active {
            return Err(LedgerError::Forbidden(format!(
                "app {app_id} is not active"
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct PriceResponse {
    amount: i64,
}

/// Client for the optional action-pricing lookup.
pub struct PricingClient {
    client: reqwest::Client,
    base_url: String,
    cache: RwLock<HashMap<String, (Option<i64>, Instant)>>,
}

impl PricingClient {
    /// Create a client for the given base URL.
    #[must_use]
    pub fn new(base_url: &str) -> Self {
        let client = reqwest::Client::builder()
            .timeout(LOOKUP_TIMEOUT)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// The expected DUST cost for an action, `None` when the pricing
    /// service has no entry (the ledger then trusts the caller's amount).
    ///
    /// # Errors
    ///
    /// `LedgerError::Upstream` when the pricing service cannot be reached.
    pub async fn price(&self, action: &str) -> Result<Option<i64>, LedgerError> {
        {
            let cache = self.cache.read().await;
            if let Some((price, at)) = cache.get(action) {
                if at.elapsed() < LOOKUP_CACHE_DURATION {
                    return Ok(*price);
                }
            }
        }

        let url = format!("{}/v1/pricing/{action}", self.base_url);
        let response = self.client.get(&url).send().await.map_err(|e| {
            tracing::error!(action = %action, error = %e, "Pricing service unreachable");
            LedgerError::Upstream("action pricing unavailable".into())
        })?;

        let price = match response.status() {
            s if s.is_success() => {
                let body = response.json::<PriceResponse>().await.map_err(|e| {
                    tracing::error!(action = %action, error = %e, "Bad pricing response");
                    LedgerError::Upstream("action pricing returned malformed data".into())
                })?;
                Some(body.amount)
            }
            s if s == reqwest::StatusCode::NOT_FOUND => None,
            s => {
                tracing::error!(action = %action, status = %s, "Pricing service error");
                return Err(LedgerError::Upstream("action pricing unavailable".into()));
            }
        };

        self.cache
            .write()
            .await
            .insert(action.to_string(), (price, Instant::now()));

        Ok(price)
    }
}
