//! Consume, purchase, and history handlers.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use dust_core::{AppId, LedgerError, TransactionType, UserId};
use dust_store::transactions;

use crate::auth::{AuthUser, Caller, ServiceAuth};
use crate::error::ApiError;
use crate::handlers::{ReceiptResponse, TransactionResponse};
use crate::ledger::ConsumeArgs;
use crate::state::AppState;

/// Consume request.
#[derive(Debug, Deserialize)]
pub struct ConsumeRequest {
    /// The paying user.
    pub user_id: String,
    /// DUST to deduct, strictly positive.
    pub amount: i64,
    /// The consuming app.
    pub app_id: String,
    /// The named action, checked against the pricing table when available.
    pub action: Option<String>,
    /// Idempotency key for safe retries.
    pub idempotency_key: Option<String>,
    /// Opaque metadata.
    #[serde(default)]
    pub metadata: serde_json::Value,
}

/// Deduct DUST for app usage.
pub async fn consume(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Json(body): Json<ConsumeRequest>,
) -> Result<Json<ReceiptResponse>, ApiError> {
    let user_id: UserId = body
        .user_id
        .parse()
        .map_err(|_| ApiError::BadRequest("Invalid user ID".into()))?;
    let app_id: AppId = body
        .app_id
        .parse()
        .map_err(|_| ApiError::BadRequest("Invalid app ID".into()))?;
    caller.authorize(&user_id)?;

    if body.amount <= 0 {
        return Err(ApiError::Ledger(LedgerError::Validation(
            "amount must be positive".into(),
        )));
    }

    // App validity is a hard requirement for consume; a lookup failure is a
    // failure of the request, never a silent pass.
    state.apps.require_active(&app_id).await?;

    if let (Some(action), Some(pricing)) = (body.action.as_deref(), state.pricing.as_ref()) {
        if let Some(expected) = pricing.price(action).await? {
            if expected != body.amount {
                return Err(ApiError::Ledger(LedgerError::Validation(format!(
                    "amount {} does not match the {expected} DUST price of action {action}",
                    body.amount
                ))));
            }
        }
    }

    let action = body.action.as_deref().unwrap_or("usage");
    let mut metadata = match body.metadata {
        serde_json::Value::Object(map) => map,
        serde_json::Value::Null => serde_json::Map::new(),
        _ => {
            return Err(ApiError::Ledger(LedgerError::Validation(
                "metadata must be an object".into(),
            )))
        }
    };
    metadata.insert("action".into(), serde_json::Value::from(action));

    let receipt = state
        .ledger
        .consume(ConsumeArgs {
            user_id,
            amount: body.amount,
            app_id,
            description: format!("{action} ({} DUST)", body.amount),
            idempotency_key: body.idempotency_key,
            metadata: serde_json::Value::Object(metadata),
        })
        .await?;

    Ok(Json(ReceiptResponse::from(&receipt)))
}

/// Privileged purchase request: the payment was validated elsewhere.
#[derive(Debug, Deserialize)]
pub struct PurchaseRequest {
    /// The purchasing user.
    pub user_id: String,
    /// DUST to credit.
    pub amount: i64,
    /// The external payment identifier.
    pub payment_id: String,
    /// Verified payment amount in minor currency units.
    pub payment_amount: i64,
    /// Idempotency key for safe retries.
    pub idempotency_key: Option<String>,
}

/// Record the DUST effect of a validated payment (service-to-service).
pub async fn purchase(
    State(state): State<Arc<AppState>>,
    auth: ServiceAuth,
    Json(body): Json<PurchaseRequest>,
) -> Result<Json<ReceiptResponse>, ApiError> {
    let user_id: UserId = body
        .user_id
        .parse()
        .map_err(|_| ApiError::BadRequest("Invalid user ID".into()))?;

    tracing::info!(
        service = %auth.service_name,
        user_id = %user_id,
        amount = %body.amount,
        payment_id = %body.payment_id,
        "Recording purchase"
    );

    let receipt = state
        .ledger
        .purchase(
            user_id,
            body.amount,
            &body.payment_id,
            body.payment_amount,
            body.idempotency_key,
        )
        .await?;

    Ok(Json(ReceiptResponse::from(&receipt)))
}

/// In-app purchase request carrying the receipt-verification result.
#[derive(Debug, Deserialize)]
pub struct InAppPurchaseRequest {
    /// DUST to credit.
    pub amount: i64,
    /// Store transaction / receipt identifier.
    pub payment_id: String,
    /// Amount the receipt-verification service attested, in minor units.
    pub verified_amount: i64,
    /// Idempotency key for safe retries.
    pub idempotency_key: Option<String>,
}

/// Record a receipt-verified consumer purchase for the calling user.
pub async fn purchase_in_app(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Json(body): Json<InAppPurchaseRequest>,
) -> Result<Json<ReceiptResponse>, ApiError> {
    let receipt = state
        .ledger
        .purchase(
            auth.user_id,
            body.amount,
            &body.payment_id,
            body.verified_amount,
            body.idempotency_key,
        )
        .await?;

    Ok(Json(ReceiptResponse::from(&receipt)))
}

/// Transaction history query parameters.
#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    /// Maximum number of transactions to return (default: 50, max: 100).
    #[serde(default = "default_limit")]
    pub limit: i64,
    /// Offset for pagination.
    #[serde(default)]
    pub offset: i64,
    /// Optional type filter.
    #[serde(rename = "type")]
    pub tx_type: Option<String>,
    /// Optional app filter.
    pub app_id: Option<String>,
}

fn default_limit() -> i64 {
    50
}

/// Transaction history response.
#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    /// Transactions, newest first.
    pub transactions: Vec<TransactionResponse>,
    /// Whether more pages exist.
    pub has_more: bool,
}

/// Paginated transaction history for a user.
pub async fn list_transactions(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(user_id): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<HistoryResponse>, ApiError> {
    let user_id: UserId = user_id
        .parse()
        .map_err(|_| ApiError::BadRequest("Invalid user ID".into()))?;
    caller.authorize(&user_id)?;

    let tx_type = query
        .tx_type
        .as_deref()
        .map(str::parse::<TransactionType>)
        .transpose()
        .map_err(ApiError::Ledger)?;
    let app_id = query
        .app_id
        .as_deref()
        .map(str::parse::<AppId>)
        .transpose()
        .map_err(|_| ApiError::BadRequest("Invalid app ID".into()))?;

    // Fetch one extra row to detect further pages.
    let limit = query.limit.clamp(1, 100);
    let offset = query.offset.max(0);
    let mut rows = transactions::list_for_user(
        &state.store,
        &user_id,
        limit + 1,
        offset,
        tx_type,
        app_id.as_ref(),
    )
    .await?;

    let has_more = rows.len() > usize::try_from(limit).unwrap_or(usize::MAX);
    rows.truncate(usize::try_from(limit).unwrap_or(usize::MAX));

    Ok(Json(HistoryResponse {
        transactions: rows.iter().map(TransactionResponse::from).collect(),
        has_more,
    }))
}
