//! API error types and responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use tap_earn_core::LedgerError;

/// API error type.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Unauthorized - missing or invalid credentials.
    #[error("unauthorized")]
    Unauthorized,

    /// Bad request - invalid input.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// A ledger rejection or failure.
    #[error(transparent)]
    Ledger(#[from] LedgerError),
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

type ErrorParts = (StatusCode, &'static str, String, Option<serde_json::Value>);

fn ledger_error_parts(err: &LedgerError) -> ErrorParts {
    let message = err.to_string();
    match err {
        LedgerError::EnergyExhausted => {
            (StatusCode::TOO_MANY_REQUESTS, "energy_exhausted", message, None)
        }
        LedgerError::PackageCapReached { earned, cap } => (
            StatusCode::CONFLICT,
            "package_cap_reached",
            message,
            Some(serde_json::json!({ "earned": earned, "cap": cap })),
        ),
        LedgerError::UnknownPackage { package_id } => (
            StatusCode::NOT_FOUND,
            "unknown_package",
            message,
            Some(serde_json::json!({ "package_id": package_id })),
        ),
        LedgerError::PaymentProofReused => {
            (StatusCode::CONFLICT, "payment_proof_reused", message, None)
        }
        LedgerError::BelowMinimum { amount, minimum } => (
            StatusCode::BAD_REQUEST,
            "below_minimum",
            message,
            Some(serde_json::json!({ "amount": amount, "minimum": minimum })),
        ),
        LedgerError::OnCooldown { until } => (
            StatusCode::CONFLICT,
            "on_cooldown",
            message,
            Some(serde_json::json!({ "until": until })),
        ),
        LedgerError::InsufficientBalance { balance, required } => (
            StatusCode::PAYMENT_REQUIRED,
            "insufficient_balance",
            message,
            Some(serde_json::json!({ "balance": balance, "required": required })),
        ),
        LedgerError::WithdrawalAlreadyPending { withdrawal_id } => (
            StatusCode::CONFLICT,
            "withdrawal_already_pending",
            message,
            Some(serde_json::json!({ "withdrawal_id": withdrawal_id })),
        ),
        LedgerError::AccountNotFound { .. } => {
            (StatusCode::NOT_FOUND, "account_not_found", message, None)
        }
        LedgerError::WithdrawalNotFound { .. } => {
            (StatusCode::NOT_FOUND, "withdrawal_not_found", message, None)
        }
        LedgerError::WithdrawalAlreadySettled { status, .. } => (
            StatusCode::CONFLICT,
            "withdrawal_already_settled",
            message,
            Some(serde_json::json!({ "status": status })),
        ),
        LedgerError::InvalidRequest(msg) => {
            (StatusCode::BAD_REQUEST, "invalid_request", msg.clone(), None)
        }
        LedgerError::InvalidId(_) => (StatusCode::BAD_REQUEST, "invalid_id", message, None),
        LedgerError::PersistenceConflict => {
            tracing::warn!("Persistence conflict after retries");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                "persistence_conflict",
                "The request conflicted with a concurrent update, retry it".to_string(),
                None,
            )
        }
        LedgerError::Storage(msg) => {
            tracing::error!(error = %msg, "Storage error");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                "An internal error occurred".to_string(),
                None,
            )
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message, details) = match &self {
            Self::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "unauthorized",
                self.to_string(),
                None,
            ),
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg.clone(), None),
            Self::Ledger(err) => {
                if !err.is_infrastructure() {
                    tracing::debug!(error = %err, "Request rejected");
                }
                ledger_error_parts(err)
            }
        };

        let body = ErrorResponse {
            error: ErrorBody {
                code: code.to_string(),
                message,
                details,
            },
        };

        (status, Json(body)).into_response()
    }
}

impl From<tap_earn_store::StoreError> for ApiError {
    fn from(err: tap_earn_store::StoreError) -> Self {
        Self::Ledger(err.into())
    }
}
