//! Health check handler.

use axum::Json;

/// Health check response.
pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "service": "dust-ledger",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
