//! Balance read handler.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Serialize;

use dust_core::UserId;

use crate::auth::Caller;
use crate::error::ApiError;
use crate::state::AppState;

/// Balance response.
#[derive(Debug, Serialize)]
pub struct BalanceResponse {
    /// The balance owner.
    pub user_id: String,
    /// Current balance in DUST.
    pub balance: i64,
    /// Sum of pending (unsettled) transaction amounts.
    pub pending_balance: i64,
    /// When the balance last changed.
    pub last_updated: DateTime<Utc>,
}

/// Get a user's current balance. Reads bypass the lock and prefer the
/// cache, falling back to the durable store on a miss.
pub async fn get_balance(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(user_id): Path<String>,
) -> Result<Json<BalanceResponse>, ApiError> {
    let user_id: UserId = user_id
        .parse()
        .map_err(|_| ApiError::BadRequest("Invalid user ID".into()))?;
    caller.authorize(&user_id)?;

    let (balance, pending) = state.ledger.balance(&user_id).await?;

    Ok(Json(BalanceResponse {
        user_id: user_id.to_string(),
        balance: balance.amount,
        pending_balance: pending,
        last_updated: balance.updated_at,
    }))
}
