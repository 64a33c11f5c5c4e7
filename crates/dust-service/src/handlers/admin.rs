//! Admin handlers: manual grants, refunds, bulk grants, and balance
//! adjustments. All require the admin key; the admin id is recorded in
//! transaction metadata for audit.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use dust_core::{TransactionId, UserId};

use crate::auth::AdminAuth;
use crate::error::ApiError;
use crate::handlers::ReceiptResponse;
use crate::ledger::GrantArgs;
use crate::state::AppState;

/// Admin grant request.
#[derive(Debug, Deserialize)]
pub struct AdminGrantRequest {
    /// The receiving user.
    pub user_id: String,
    /// DUST to credit.
    pub amount: i64,
    /// Reason recorded on the ledger row.
    pub reason: String,
    /// Idempotency key for safe retries.
    pub idempotency_key: Option<String>,
}

/// Credit DUST manually.
pub async fn grant(
    State(state): State<Arc<AppState>>,
    auth: AdminAuth,
    Json(body): Json<AdminGrantRequest>,
) -> Result<Json<ReceiptResponse>, ApiError> {
    let user_id: UserId = body
        .user_id
        .parse()
        .map_err(|_| ApiError::BadRequest("Invalid user ID".into()))?;

    let receipt = state
        .ledger
        .grant(GrantArgs {
            user_id,
            amount: body.amount,
            description: body.reason.clone(),
            app_id: None,
            idempotency_key: body.idempotency_key,
            metadata: serde_json::json!({ "admin_id": auth.admin_id }),
        })
        .await?;

    tracing::info!(
        admin_id = %auth.admin_id,
        user_id = %user_id,
        amount = %body.amount,
        reason = %body.reason,
        "Admin grant issued"
    );

    Ok(Json(ReceiptResponse::from(&receipt)))
}

/// Admin refund request.
#[derive(Debug, Deserialize)]
pub struct AdminRefundRequest {
    /// The consume transaction to refund.
    pub transaction_id: String,
    /// Reason recorded on the refund row.
    pub reason: String,
}

/// Refund a completed consume.
pub async fn refund(
    State(state): State<Arc<AppState>>,
    auth: AdminAuth,
    Json(body): Json<AdminRefundRequest>,
) -> Result<Json<ReceiptResponse>, ApiError> {
    let transaction_id: TransactionId = body
        .transaction_id
        .parse()
        .map_err(|_| ApiError::BadRequest("Invalid transaction ID".into()))?;

    let receipt = state
        .ledger
        .refund(&transaction_id, body.reason, Some(auth.admin_id.clone()))
        .await?;

    tracing::info!(
        admin_id = %auth.admin_id,
        transaction_id = %transaction_id,
        refund_id = %receipt.transaction.id,
        "Refund issued"
    );

    Ok(Json(ReceiptResponse::from(&receipt)))
}

/// One entry in a bulk grant.
#[derive(Debug, Deserialize)]
pub struct BulkGrantEntry {
    /// The receiving user.
    pub user_id: String,
    /// DUST to credit.
    pub amount: i64,
}

/// Bulk grant request.
#[derive(Debug, Deserialize)]
pub struct BulkGrantRequest {
    /// Users to credit.
    pub grants: Vec<BulkGrantEntry>,
    /// Shared reason recorded on every ledger row.
    pub reason: String,
}

/// Per-user result of a bulk grant.
#[derive(Debug, Serialize)]
pub struct BulkGrantResult {
    /// The target user.
    pub user_id: String,
    /// Whether the grant committed.
    pub success: bool,
    /// Error message, if it failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// The created transaction, if it committed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<String>,
}

/// Bulk grant response.
#[derive(Debug, Serialize)]
pub struct BulkGrantResponse {
    /// Per-user results, in request order.
    pub results: Vec<BulkGrantResult>,
    /// Count of committed grants.
    pub processed: usize,
    /// Count of failed grants.
    pub failed: usize,
}

/// Credit many users in one request. Each grant commits independently; a
/// failure for one user never rolls back the others.
pub async fn bulk_grant(
    State(state): State<Arc<AppState>>,
    auth: AdminAuth,
    Json(body): Json<BulkGrantRequest>,
) -> Result<Json<BulkGrantResponse>, ApiError> {
    let mut results = Vec::with_capacity(body.grants.len());
    let mut processed = 0;
    let mut failed = 0;

    for entry in body.grants {
        let outcome = grant_one(&state, &auth, &entry, &body.reason).await;
        match outcome {
            Ok(transaction_id) => {
                processed += 1;
                results.push(BulkGrantResult {
                    user_id: entry.user_id,
                    success: true,
                    error: None,
                    transaction_id: Some(transaction_id),
                });
            }
            Err(e) => {
                failed += 1;
                results.push(BulkGrantResult {
                    user_id: entry.user_id,
                    success: false,
                    error: Some(e.to_string()),
                    transaction_id: None,
                });
            }
        }
    }

    tracing::info!(
        admin_id = %auth.admin_id,
        processed,
        failed,
        "Bulk grant complete"
    );

    Ok(Json(BulkGrantResponse {
        results,
        processed,
        failed,
    }))
}

async fn grant_one(
    state: &AppState,
    auth: &AdminAuth,
    entry: &BulkGrantEntry,
    reason: &str,
) -> Result<String, ApiError> {
    let user_id: UserId = entry
        .user_id
        .parse()
        .map_err(|_| ApiError::BadRequest("Invalid user ID".into()))?;

    let receipt = state
        .ledger
        .grant(GrantArgs {
            user_id,
            amount: entry.amount,
            description: reason.to_string(),
            app_id: None,
            idempotency_key: None,
            metadata: serde_json::json!({ "admin_id": auth.admin_id, "bulk": true }),
        })
        .await?;

    Ok(receipt.transaction.id.to_string())
}

/// Balance adjustment request.
#[derive(Debug, Deserialize)]
pub struct AdjustBalanceRequest {
    /// The target user.
    pub user_id: String,
    /// Signed DUST delta; negative deltas may not cross zero.
    pub delta: i64,
    /// Reason recorded on the ledger row.
    pub reason: String,
}

/// Apply a signed manual correction to a balance.
pub async fn adjust_balance(
    State(state): State<Arc<AppState>>,
    auth: AdminAuth,
    Json(body): Json<AdjustBalanceRequest>,
) -> Result<Json<ReceiptResponse>, ApiError> {
    let user_id: UserId = body
        .user_id
        .parse()
        .map_err(|_| ApiError::BadRequest("Invalid user ID".into()))?;

    let receipt = state
        .ledger
        .adjust(user_id, body.delta, body.reason, auth.admin_id.clone())
        .await?;

    tracing::info!(
        admin_id = %auth.admin_id,
        user_id = %user_id,
        delta = %body.delta,
        balance_after = %receipt.balance_after,
        "Balance adjusted"
    );

    Ok(Json(ReceiptResponse::from(&receipt)))
}
