//! Service configuration.

use std::time::Duration;

/// Service configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Address to listen on (default: "0.0.0.0:8080").
    pub listen_addr: String,

    /// Postgres connection URL.
    pub database_url: String,

    /// Maximum database connections in the pool.
    pub database_max_connections: u32,

    /// JWT validation base URL, used to fetch JWKS.
    pub auth_base_url: String,

    /// Expected JWT audience (default: "dust-ledger").
    pub auth_audience: String,

    /// Service API key for service-to-service auth.
    pub service_api_key: Option<String>,

    /// Admin API key for privileged endpoints.
    pub admin_api_key: Option<String>,

    /// App-directory base URL for app validity lookups.
    pub app_directory_url: String,

    /// Pricing service base URL (optional; absence trusts caller amounts).
    pub pricing_url: Option<String>,

    /// CORS allowed origins.
    pub cors_origins: Vec<String>,

    /// Maximum request body size in bytes.
    pub max_body_bytes: usize,

    /// Request timeout in seconds.
    pub request_timeout_seconds: u64,

    /// Per-user lock TTL.
    pub lock_ttl: Duration,

    /// Balance cache TTL.
    pub balance_cache_ttl: Duration,

    /// Idempotency record retention.
    pub idempotency_ttl: Duration,

    /// Interval between balance-cache sync passes.
    pub cache_sync_interval: Duration,

    /// Interval between stale-pending expiry passes.
    pub pending_expiry_interval: Duration,

    /// Interval between analytics rollup passes.
    pub rollup_interval: Duration,

    /// Retry interval after a background-job failure.
    pub job_error_backoff: Duration,
}

impl ServiceConfig {
    /// Load configuration from environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            listen_addr: std::env::var("LISTEN_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".into()),
            database_url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| "postgres://localhost/dust".into()),
            database_max_connections: env_parse("DATABASE_MAX_CONNECTIONS", 10),
            auth_base_url: std::env::var("AUTH_BASE_URL")
                .unwrap_or_else(|_| "https://id.dust.dev".into()),
            auth_audience: std::env::var("AUTH_AUDIENCE").unwrap_or_else(|_| "dust-ledger".into()),
            service_api_key: std::env::var("SERVICE_API_KEY").ok(),
            admin_api_key: std::env::var("ADMIN_API_KEY").ok(),
            app_directory_url: std::env::var("APP_DIRECTORY_URL")
                .unwrap_or_else(|_| "http://localhost:8081".into()),
            pricing_url: std::env::var("PRICING_URL").ok(),
            cors_origins: std::env::var("CORS_ORIGINS")
                .unwrap_or_else(|_| "*".into())
                .split(',')
                .map(|s| s.trim().to_string())
                .collect(),
            max_body_bytes: env_parse("MAX_BODY_BYTES", 1024 * 1024),
            request_timeout_seconds: env_parse("REQUEST_TIMEOUT_SECONDS", 30),
            lock_ttl: Duration::from_millis(env_parse("LOCK_TTL_MS", 2000)),
            balance_cache_ttl: Duration::from_secs(env_parse("BALANCE_CACHE_TTL_SECONDS", 30)),
            idempotency_ttl: Duration::from_secs(env_parse(
                "IDEMPOTENCY_TTL_SECONDS",
                24 * 60 * 60,
            )),
            cache_sync_interval: Duration::from_secs(env_parse("CACHE_SYNC_INTERVAL_SECONDS", 60)),
            pending_expiry_interval: Duration::from_secs(env_parse(
                "PENDING_EXPIRY_INTERVAL_SECONDS",
                300,
            )),
            rollup_interval: Duration::from_secs(env_parse("ROLLUP_INTERVAL_SECONDS", 3600)),
            job_error_backoff: Duration::from_secs(env_parse("JOB_ERROR_BACKOFF_SECONDS", 10)),
        }
    }
}

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8080".into(),
            database_url: "postgres://localhost/dust".into(),
            database_max_connections: 10,
            auth_base_url: "https://id.dust.dev".into(),
            auth_audience: "dust-ledger".into(),
            service_api_key: None,
            admin_api_key: None,
            app_directory_url: "http://localhost:8081".into(),
            pricing_url: None,
            cors_origins: vec!["*".into()],
            max_body_bytes: 1024 * 1024,
            request_timeout_seconds: 30,
            lock_ttl: Duration::from_secs(2),
            balance_cache_ttl: Duration::from_secs(30),
            idempotency_ttl: Duration::from_secs(24 * 60 * 60),
            cache_sync_interval: Duration::from_secs(60),
            pending_expiry_interval: Duration::from_secs(300),
            rollup_interval: Duration::from_secs(3600),
            job_error_backoff: Duration::from_secs(10),
        }
    }
}
