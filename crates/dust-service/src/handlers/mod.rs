//! HTTP request handlers.

pub mod admin;
pub mod balance;
pub mod grants;
pub mod health;
pub mod transactions;

use chrono::{DateTime, Utc};
use serde::Serialize;

use dust_core::Transaction;

use crate::ledger::Receipt;

/// A ledger transaction as returned by the API.
#[derive(Debug, Serialize)]
pub struct TransactionResponse {
    /// Transaction ID (ULID).
    pub id: String,
    /// The affected user.
    pub user_id: String,
    /// Signed amount in DUST.
    pub amount: i64,
    /// Transaction type.
    #[serde(rename = "type")]
    pub tx_type: String,
    /// Lifecycle status.
    pub status: String,
    /// Description.
    pub description: String,
    /// The consuming/granting app, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub app_id: Option<String>,
    /// Opaque metadata.
    pub metadata: serde_json::Value,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

impl From<&Transaction> for TransactionResponse {
    fn from(tx: &Transaction) -> Self {
        Self {
            id: tx.id.to_string(),
            user_id: tx.user_id.to_string(),
            amount: tx.amount,
            tx_type: tx.tx_type.as_str().to_string(),
            status: tx.status.as_str().to_string(),
            description: tx.description.clone(),
            app_id: tx.app_id.map(|id| id.to_string()),
            metadata: tx.metadata.clone(),
            created_at: tx.created_at,
        }
    }
}

/// A committed operation with its before/after balances.
#[derive(Debug, Serialize)]
pub struct ReceiptResponse {
    /// The ledger entry.
    pub transaction: TransactionResponse,
    /// Balance before the operation.
    pub balance_before: i64,
    /// Balance after the operation.
    pub balance_after: i64,
}

impl From<&Receipt> for ReceiptResponse {
    fn from(receipt: &Receipt) -> Self {
        Self {
            transaction: TransactionResponse::from(&receipt.transaction),
            balance_before: receipt.balance_before,
            balance_after: receipt.balance_after,
        }
    }
}
