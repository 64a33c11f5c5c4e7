//! API error types and responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use dust_core::LedgerError;

/// API error type.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Missing or invalid credentials.
    #[error("unauthorized")]
    Unauthorized,

    /// A typed ledger error with a stable code.
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    /// Malformed request outside the ledger taxonomy (bad path id, bad body).
    #[error("bad request: {0}")]
    BadRequest(String),
}

/// JSON error response body.
#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    code: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<serde_json::Value>,
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Ledger(err) => match err {
                LedgerError::Validation(_)
                | LedgerError::InsufficientBalance { .. }
                | LedgerError::InvalidRefundTarget(_) => StatusCode::BAD_REQUEST,
                LedgerError::NotFound(_) => StatusCode::NOT_FOUND,
                LedgerError::Forbidden(_) => StatusCode::FORBIDDEN,
                LedgerError::Conflict(_) | LedgerError::AlreadyRefunded { .. } => {
                    StatusCode::CONFLICT
                }
                LedgerError::Upstream(_) => StatusCode::BAD_GATEWAY,
                LedgerError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();

        let (code, message, details) = match &self {
            Self::Unauthorized => ("unauthorized".to_string(), self.to_string(), None),
            Self::BadRequest(msg) => ("bad_request".to_string(), msg.clone(), None),
            Self::Ledger(err) => {
                let details = match err {
                    LedgerError::InsufficientBalance { balance, required } => {
                        Some(serde_json::json!({
                            "balance": balance,
                            "required": required
                        }))
                    }
                    _ => None,
                };
                // Internal messages stay in the logs, not the response body.
                let message = if matches!(err, LedgerError::Storage(_)) {
                    tracing::error!(error = %err, "Internal server error");
                    "An internal error occurred".to_string()
                } else {
                    err.to_string()
                };
                (err.code().to_string(), message, details)
            }
        };

        let body = ErrorResponse {
            error: ErrorBody {
                code,
                message,
                details,
            },
        };

        (status, Json(body)).into_response()
    }
}

impl From<dust_store::StoreError> for ApiError {
    fn from(err: dust_store::StoreError) -> Self {
        Self::Ledger(err.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insufficient_balance_is_400() {
        let err = ApiError::Ledger(LedgerError::InsufficientBalance {
            balance: 10,
            required: 15,
        });
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn lock_conflict_is_409() {
        let err = ApiError::Ledger(LedgerError::Conflict("lock".into()));
        assert_eq!(err.status(), StatusCode::CONFLICT);
    }

    #[test]
    fn upstream_is_502() {
        let err = ApiError::Ledger(LedgerError::Upstream("pricing".into()));
        assert_eq!(err.status(), StatusCode::BAD_GATEWAY);
    }
}
