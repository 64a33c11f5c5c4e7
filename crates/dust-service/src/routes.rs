//! Router configuration.

use std::sync::Arc;
use std::time::Duration;

use axum::routing::{get, post};
use axum::Router;
use tower::limit::ConcurrencyLimitLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::handlers::{admin, balance, grants, health, transactions};
use crate::state::AppState;

/// Maximum concurrent requests for balance-mutating endpoints.
const MUTATION_MAX_CONCURRENT_REQUESTS: usize = 100;

/// Maximum concurrent requests for the remaining API endpoints.
const API_MAX_CONCURRENT_REQUESTS: usize = 50;

/// Create the service router with all routes and middleware.
///
/// # Routes
///
/// ## Public
/// - `GET /health` - Health check
///
/// ## Balances & history (user JWT or service key)
/// - `GET /v1/balance/{user_id}`
/// - `GET /v1/transactions/{user_id}` - Paginated history with filters
///
/// ## Mutations (user JWT or service key; concurrency-limited)
/// - `POST /v1/transactions/consume`
/// - `POST /v1/transactions/purchase` (service key)
/// - `POST /v1/transactions/purchase/in-app` (user JWT)
///
/// ## App grant flows (service key)
/// - `POST /v1/grants/app-initial`
/// - `POST /v1/grants/daily-bonus`
/// - `POST /v1/grants/referral-reward`
/// - `POST /v1/grants/promotional`
///
/// ## Admin (admin key)
/// - `POST /v1/admin/grant`, `/v1/admin/refund`,
///   `/v1/admin/bulk-grant`, `/v1/admin/adjust-balance`
pub fn create_router(state: AppState) -> Router {
    let cors = build_cors_layer(&state.config.cors_origins);
    let max_body_bytes = state.config.max_body_bytes;
    let request_timeout = Duration::from_secs(state.config.request_timeout_seconds);

    let state = Arc::new(state);

    // Mutations get their own, higher concurrency limit: they are the
    // hot path for app traffic but still need overload protection.
    let mutation_routes = Router::new()
        .route("/transactions/consume", post(transactions::consume))
        .route("/transactions/purchase", post(transactions::purchase))
        .route(
            "/transactions/purchase/in-app",
            post(transactions::purchase_in_app),
        )
        .route("/grants/app-initial", post(grants::app_initial))
        .route("/grants/daily-bonus", post(grants::daily_bonus))
        .route("/grants/referral-reward", post(grants::referral_reward))
        .route("/grants/promotional", post(grants::promotional))
        .layer(ConcurrencyLimitLayer::new(MUTATION_MAX_CONCURRENT_REQUESTS));

    let api_routes = Router::new()
        .route("/balance/:user_id", get(balance::get_balance))
        .route("/transactions/:user_id", get(transactions::list_transactions))
        .route("/admin/grant", post(admin::grant))
        .route("/admin/refund", post(admin::refund))
        .route("/admin/bulk-grant", post(admin::bulk_grant))
        .route("/admin/adjust-balance", post(admin::adjust_balance))
        .merge(mutation_routes)
        .layer(ConcurrencyLimitLayer::new(API_MAX_CONCURRENT_REQUESTS));

    Router::new()
        .route("/health", get(health::health))
        .nest("/v1", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(RequestBodyLimitLayer::new(max_body_bytes))
        .layer(TimeoutLayer::new(request_timeout))
        .with_state(state)
}

/// Build the CORS layer from configured origins.
fn build_cors_layer(origins: &[String]) -> CorsLayer {
    if origins.iter().any(|o| o == "*") {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let origins: Vec<_> = origins.iter().filter_map(|o| o.parse().ok()).collect();

        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    }
}
