//! App-initiated credit flows: initial grant, daily streak bonus, referral
//! and promotional credits. All are service-authenticated and layered on
//! the processor's grant path.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::Deserialize;

use dust_core::{AppId, GrantKind, UserId};

use crate::auth::ServiceAuth;
use crate::error::ApiError;
use crate::handlers::ReceiptResponse;
use crate::ledger::GrantArgs;
use crate::state::AppState;

fn parse_ids(user_id: &str, app_id: &str) -> Result<(UserId, AppId), ApiError> {
    let user_id = user_id
        .parse()
        .map_err(|_| ApiError::BadRequest("Invalid user ID".into()))?;
    let app_id = app_id
        .parse()
        .map_err(|_| ApiError::BadRequest("Invalid app ID".into()))?;
    Ok((user_id, app_id))
}

/// One-time initial grant request.
#[derive(Debug, Deserialize)]
pub struct InitialGrantRequest {
    /// The receiving user.
    pub user_id: String,
    /// The granting app.
    pub app_id: String,
    /// DUST to credit, at most 100.
    pub amount: i64,
    /// Idempotency key for safe retries.
    pub idempotency_key: Option<String>,
}

/// Issue the one-time welcome grant for a (user, app) pair.
pub async fn app_initial(
    State(state): State<Arc<AppState>>,
    auth: ServiceAuth,
    Json(body): Json<InitialGrantRequest>,
) -> Result<Json<ReceiptResponse>, ApiError> {
    let (user_id, app_id) = parse_ids(&body.user_id, &body.app_id)?;
    state.apps.require_active(&app_id).await?;

    tracing::debug!(
        service = %auth.service_name,
        user_id = %user_id,
        app_id = %app_id,
        "Initial grant requested"
    );

    let receipt = state
        .ledger
        .grant_initial(user_id, app_id, body.amount, body.idempotency_key)
        .await?;

    Ok(Json(ReceiptResponse::from(&receipt)))
}

/// Daily streak bonus request.
#[derive(Debug, Deserialize)]
pub struct DailyBonusRequest {
    /// The receiving user.
    pub user_id: String,
    /// The granting app.
    pub app_id: String,
    /// DUST to credit, at most 25.
    pub amount: i64,
    /// The reward day the client believes it is claiming, 1..=5.
    pub streak_days: u32,
    /// Idempotency key for safe retries.
    pub idempotency_key: Option<String>,
}

/// Claim today's login-streak bonus.
pub async fn daily_bonus(
    State(state): State<Arc<AppState>>,
    _auth: ServiceAuth,
    Json(body): Json<DailyBonusRequest>,
) -> Result<Json<ReceiptResponse>, ApiError> {
    let (user_id, app_id) = parse_ids(&body.user_id, &body.app_id)?;
    state.apps.require_active(&app_id).await?;

    let receipt = state
        .ledger
        .grant_streak(
            user_id,
            app_id,
            body.amount,
            body.streak_days,
            body.idempotency_key,
        )
        .await?;

    Ok(Json(ReceiptResponse::from(&receipt)))
}

/// Referral reward request.
#[derive(Debug, Deserialize)]
pub struct ReferralRequest {
    /// The referring user receiving the reward.
    pub user_id: String,
    /// The app the referral happened in.
    pub app_id: String,
    /// DUST to credit.
    pub amount: i64,
    /// The referred user, recorded for audit.
    pub referred_user_id: Option<String>,
    /// Idempotency key for safe retries.
    pub idempotency_key: Option<String>,
}

/// Credit a referral reward.
pub async fn referral_reward(
    State(state): State<Arc<AppState>>,
    _auth: ServiceAuth,
    Json(body): Json<ReferralRequest>,
) -> Result<Json<ReceiptResponse>, ApiError> {
    let (user_id, app_id) = parse_ids(&body.user_id, &body.app_id)?;
    state.apps.require_active(&app_id).await?;

    let receipt = state
        .ledger
        .grant(GrantArgs {
            user_id,
            amount: body.amount,
            description: format!("Referral reward of {} DUST", body.amount),
            app_id: Some(app_id),
            idempotency_key: body.idempotency_key,
            metadata: serde_json::json!({
                "grant_kind": GrantKind::Referral.as_str(),
                "referred_user_id": body.referred_user_id,
            }),
        })
        .await?;

    Ok(Json(ReceiptResponse::from(&receipt)))
}

/// Promotional credit request.
#[derive(Debug, Deserialize)]
pub struct PromotionalRequest {
    /// The receiving user.
    pub user_id: String,
    /// The app running the promotion.
    pub app_id: String,
    /// DUST to credit.
    pub amount: i64,
    /// Campaign identifier, recorded for audit.
    pub campaign: Option<String>,
    /// Idempotency key for safe retries.
    pub idempotency_key: Option<String>,
}

/// Credit a promotional grant.
pub async fn promotional(
    State(state): State<Arc<AppState>>,
    _auth: ServiceAuth,
    Json(body): Json<PromotionalRequest>,
) -> Result<Json<ReceiptResponse>, ApiError> {
    let (user_id, app_id) = parse_ids(&body.user_id, &body.app_id)?;
    state.apps.require_active(&app_id).await?;

    let receipt = state
        .ledger
        .grant(GrantArgs {
            user_id,
            amount: body.amount,
            description: format!("Promotional grant of {} DUST", body.amount),
            app_id: Some(app_id),
            idempotency_key: body.idempotency_key,
            metadata: serde_json::json!({
                "grant_kind": GrantKind::Promotional.as_str(),
                "campaign": body.campaign,
            }),
        })
        .await?;

    Ok(Json(ReceiptResponse::from(&receipt)))
}
