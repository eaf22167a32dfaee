//! Withdrawal handlers for account owners.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::Json;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use tap_earn_core::WithdrawalRequest;

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::handlers::PageQuery;
use crate::state::AppState;

/// Withdrawal request body.
#[derive(Debug, Deserialize)]
pub struct CreateWithdrawalRequest {
    /// Amount in TON.
    pub amount: Decimal,
    /// Destination wallet address.
    pub destination_address: String,
    /// Client-supplied key making the request idempotent.
    #[serde(default)]
    pub idempotency_key: Option<String>,
}

/// Withdrawal response.
#[derive(Debug, Serialize)]
pub struct WithdrawalResponse {
    /// Request id.
    pub id: String,
    /// Requesting account.
    pub account_id: i64,
    /// Amount in TON.
    pub amount: Decimal,
    /// Points reserved from the balance.
    pub required_balance: Decimal,
    /// Destination wallet address.
    pub destination_address: String,
    /// Current status.
    pub status: String,
    /// When the request was made.
    pub requested_at: String,
    /// When the request was settled.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processed_at: Option<String>,
    /// Payout transaction hash.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tx_hash: Option<String>,
    /// Failure or rejection reason.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl From<&WithdrawalRequest> for WithdrawalResponse {
    fn from(request: &WithdrawalRequest) -> Self {
        Self {
            id: request.id.to_string(),
            account_id: request.account_id.get(),
            amount: request.amount,
            required_balance: request.required_balance,
            destination_address: request.destination_address.clone(),
            status: request.status.as_str().to_string(),
            requested_at: request.requested_at.to_rfc3339(),
            processed_at: request.processed_at.map(|t| t.to_rfc3339()),
            tx_hash: request.tx_hash.clone(),
            error_message: request.error_message.clone(),
        }
    }
}

/// Withdrawal list response.
#[derive(Debug, Serialize)]
pub struct ListWithdrawalsResponse {
    /// Requests, newest first.
    pub withdrawals: Vec<WithdrawalResponse>,
}

/// Request a withdrawal for the caller.
pub async fn request_withdrawal(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Json(body): Json<CreateWithdrawalRequest>,
) -> Result<Json<WithdrawalResponse>, ApiError> {
    let request = state
        .ledger
        .request_withdrawal(
            auth.account_id,
            body.amount,
            &body.destination_address,
            body.idempotency_key.as_deref(),
        )
        .await?;
    Ok(Json(WithdrawalResponse::from(&request)))
}

/// List the caller's withdrawal history.
pub async fn list_my_withdrawals(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Query(query): Query<PageQuery>,
) -> Result<Json<ListWithdrawalsResponse>, ApiError> {
    let withdrawals = state
        .ledger
        .list_account_withdrawals(auth.account_id, query.limit, query.offset)
        .await?;

    Ok(Json(ListWithdrawalsResponse {
        withdrawals: withdrawals.iter().map(WithdrawalResponse::from).collect(),
    }))
}
