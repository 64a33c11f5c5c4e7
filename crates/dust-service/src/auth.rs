//! Authentication extractors.
//!
//! Three caller identities reach the ledger:
//! - `AuthUser` — end users, via a JWT validated against the identity
//!   provider's JWKS
//! - `ServiceAuth` — platform services, via the shared API key
//! - `AdminAuth` — privileged operators, via the admin key (audit-logged)
//!
//! `Caller` combines the first two for endpoints a user may hit for their own
//! data and a service may hit for anyone's.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use tokio::sync::RwLock;

use dust_core::UserId;

use crate::error::ApiError;
use crate::state::AppState;

/// How long to cache JWKS keys before refreshing.
const JWKS_CACHE_DURATION: Duration = Duration::from_secs(3600);

/// Timeout for JWKS fetch requests.
const JWKS_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// An authenticated end user.
#[derive(Debug, Clone)]
pub struct AuthUser {
    /// The user ID from the JWT `sub` claim.
    pub user_id: UserId,
}

impl AuthUser {
    /// Reject callers targeting a user other than themselves.
    ///
    /// # Errors
    ///
    /// `LedgerError::Forbidden` on mismatch.
    pub fn authorize(&self, target: &UserId) -> Result<(), ApiError> {
        if &self.user_id == target {
            Ok(())
        } else {
            Err(ApiError::Ledger(dust_core::LedgerError::Forbidden(
                "callers may only access their own balance".into(),
            )))
        }
    }
}

#[axum::async_trait]
impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts).ok_or(ApiError::Unauthorized)?;

        // Test tokens are only honored when the test-auth feature is
        // compiled in; production builds never take this branch.
        #[cfg(feature = "test-auth")]
        if let Some(user_id_str) = token.strip_prefix("test-token:") {
            let user_id = user_id_str
                .parse::<UserId>()
                .map_err(|_| ApiError::Unauthorized)?;
            return Ok(AuthUser { user_id });
        }

        let claims = state.auth_keys.validate(token, state).await?;
        let user_id = claims
            .sub
            .parse::<UserId>()
            .map_err(|_| ApiError::Unauthorized)?;

        Ok(AuthUser { user_id })
    }
}

/// A platform service authenticated by the shared API key.
#[derive(Debug, Clone)]
pub struct ServiceAuth {
    /// The service name, for structured logs.
    pub service_name: String,
}

#[axum::async_trait]
impl FromRequestParts<Arc<AppState>> for ServiceAuth {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        service_from_parts(parts, state).ok_or(ApiError::Unauthorized)
    }
}

/// An operator authenticated by the admin key.
#[derive(Debug, Clone)]
pub struct AdminAuth {
    /// Admin identifier recorded in grant/refund metadata for audit.
    pub admin_id: String,
}

#[axum::async_trait]
impl FromRequestParts<Arc<AppState>> for AdminAuth {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let admin_key = header(parts, "x-admin-key").ok_or(ApiError::Unauthorized)?;
        let expected = state
            .config
            .admin_api_key
            .as_deref()
            .ok_or(ApiError::Unauthorized)?;

        if admin_key != expected {
            return Err(ApiError::Unauthorized);
        }

        let admin_id = header(parts, "x-admin-id").unwrap_or("admin").to_string();
        tracing::info!(admin_id = %admin_id, "Admin authenticated");

        Ok(AdminAuth { admin_id })
    }
}

/// Either an end user or a platform service.
#[derive(Debug, Clone)]
pub enum Caller {
    /// An end user; may only touch their own data.
    User(AuthUser),
    /// A platform service; may act for any user.
    Service(ServiceAuth),
}

impl Caller {
    /// Reject user callers targeting someone else; services pass.
    ///
    /// # Errors
    ///
    /// `LedgerError::Forbidden` when a user targets another user.
    pub fn authorize(&self, target: &UserId) -> Result<(), ApiError> {
        match self {
            Self::User(user) => user.authorize(target),
            Self::Service(_) => Ok(()),
        }
    }
}

#[axum::async_trait]
impl FromRequestParts<Arc<AppState>> for Caller {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        if let Some(service) = service_from_parts(parts, state) {
            return Ok(Self::Service(service));
        }
        AuthUser::from_request_parts(parts, state)
            .await
            .map(Self::User)
    }
}

fn service_from_parts(parts: &Parts, state: &AppState) -> Option<ServiceAuth> {
    let api_key = header(parts, "x-api-key")?;
    let expected = state.config.service_api_key.as_deref()?;
    if api_key != expected {
        return None;
    }
    let service_name = header(parts, "x-service-name").unwrap_or("unknown").to_string();
    Some(ServiceAuth { service_name })
}

fn header<'a>(parts: &'a Parts, name: &str) -> Option<&'a str> {
    parts.headers.get(name).and_then(|v| v.to_str().ok())
}

fn bearer_token(parts: &Parts) -> Option<&str> {
    header(parts, "authorization")?.strip_prefix("Bearer ")
}

// ============================================================================
// JWKS client
// ============================================================================

/// JWT claims we validate.
#[derive(Debug, Clone, Deserialize)]
pub struct JwtClaims {
    /// Subject (user ID).
    pub sub: String,
    /// Expiration time.
    pub exp: i64,
}

#[derive(Debug, Deserialize)]
struct Jwks {
    keys: Vec<Jwk>,
}

#[derive(Debug, Deserialize)]
struct Jwk {
    kty: String,
    kid: Option<String>,
    n: Option<String>,
    e: Option<String>,
}

struct KeyCache {
    keys: HashMap<String, DecodingKey>,
    default_key: Option<DecodingKey>,
    last_updated: Option<Instant>,
}

/// JWKS fetcher and key cache, owned by `AppState` rather than ambient
/// global state.
pub struct AuthKeys {
    client: reqwest::Client,
    cache: RwLock<KeyCache>,
}

impl AuthKeys {
    /// Create an empty cache; keys are fetched on first validation.
    #[must_use]
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(JWKS_FETCH_TIMEOUT)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            client,
            cache: RwLock::new(KeyCache {
                keys: HashMap::new(),
                default_key: None,
                last_updated: None,
            }),
        }
    }

    /// Validate a JWT against the cached (or freshly fetched) JWKS.
    pub(crate) async fn validate(
        &self,
        token: &str,
        state: &AppState,
    ) -> Result<JwtClaims, ApiError> {
        let kid = decode_header(token)
            .map_err(|e| {
                tracing::debug!(error = %e, "Failed to decode JWT header");
                ApiError::Unauthorized
            })?
            .kid;

        let decoding_key = self.decoding_key(kid.as_deref(), state).await?;

        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_audience(&[&state.config.auth_audience]);
        validation.set_issuer(&[&state.config.auth_base_url]);

        let token_data = decode::<JwtClaims>(token, &decoding_key, &validation).map_err(|e| {
            tracing::debug!(error = %e, "JWT validation failed");
            ApiError::Unauthorized
        })?;

        Ok(token_data.claims)
    }

    async fn decoding_key(
        &self,
        kid: Option<&str>,
        state: &AppState,
    ) -> Result<DecodingKey, ApiError> {
        {
            let cache = self.cache.read().await;
            let fresh = cache
                .last_updated
                .is_some_and(|at| at.elapsed() < JWKS_CACHE_DURATION);
            if fresh {
                if let Some(kid) = kid {
                    if let Some(key) = cache.keys.get(kid) {
                        return Ok(key.clone());
                    }
                } else if let Some(key) = &cache.default_key {
                    return Ok(key.clone());
                }
            }
        }

        let jwks = self.fetch_jwks(state).await?;

        let mut cache = self.cache.write().await;
        cache.keys.clear();
        cache.default_key = None;
        cache.last_updated = Some(Instant::now());

        for jwk in &jwks.keys {
            if let Some(decoding_key) = jwk_to_decoding_key(jwk) {
                if let Some(key_kid) = &jwk.kid {
                    cache.keys.insert(key_kid.clone(), decoding_key.clone());
                }
                if cache.default_key.is_none() {
                    cache.default_key = Some(decoding_key);
                }
            }
        }

        match kid {
            Some(kid) => cache.keys.get(kid).cloned().ok_or(ApiError::Unauthorized),
            None => cache.default_key.clone().ok_or(ApiError::Unauthorized),
        }
    }

    async fn fetch_jwks(&self, state: &AppState) -> Result<Jwks, ApiError> {
        let jwks_url = format!("{}/.well-known/jwks.json", state.config.auth_base_url);
        tracing::debug!(url = %jwks_url, "Fetching JWKS");

        let response = self.client.get(&jwks_url).send().await.map_err(|e| {
            tracing::error!(error = %e, url = %jwks_url, "Failed to fetch JWKS");
            ApiError::Ledger(dust_core::LedgerError::Upstream(
                "failed to fetch authentication keys".into(),
            ))
        })?;

        if !response.status().is_success() {
            tracing::error!(status = %response.status(), url = %jwks_url, "JWKS fetch failed");
            return Err(ApiError::Ledger(dust_core::LedgerError::Upstream(
                "failed to fetch authentication keys".into(),
            )));
        }

        response.json().await.map_err(|e| {
            tracing::error!(error = %e, "Failed to parse JWKS response");
            ApiError::Ledger(dust_core::LedgerError::Upstream(
                "failed to parse authentication keys".into(),
            ))
        })
    }
}

impl Default for AuthKeys {
    fn default() -> Self {
        Self::new()
    }
}

fn jwk_to_decoding_key(jwk: &Jwk) -> Option<DecodingKey> {
    if jwk.kty != "RSA" {
        tracing::debug!(kty = %jwk.kty, "Skipping non-RSA JWK");
        return None;
    }
    DecodingKey::from_rsa_components(jwk.n.as_ref()?, jwk.e.as_ref()?).ok()
}
