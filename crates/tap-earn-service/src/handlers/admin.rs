//! Admin handlers: the withdrawal queue and ledger stats.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;

use tap_earn_core::{LedgerError, WithdrawalId, WithdrawalOutcome, WithdrawalStatus};
use tap_earn_store::LedgerStats;

use crate::auth::AdminAuth;
use crate::error::ApiError;
use crate::handlers::withdrawals::{ListWithdrawalsResponse, WithdrawalResponse};
use crate::state::AppState;

/// Withdrawal queue query parameters.
#[derive(Debug, Deserialize)]
pub struct WithdrawalQueueQuery {
    /// Only requests in this status (`pending`, `completed`, `failed`, `rejected`).
    pub status: Option<String>,
    /// Maximum number of requests to return (default: 50, capped at 100).
    #[serde(default = "default_limit")]
    pub limit: usize,
    /// Offset for pagination (default: 0).
    #[serde(default)]
    pub offset: usize,
}

fn default_limit() -> usize {
    50
}

/// List withdrawal requests.
pub async fn list_withdrawals(
    State(state): State<Arc<AppState>>,
    _admin: AdminAuth,
    Query(query): Query<WithdrawalQueueQuery>,
) -> Result<Json<ListWithdrawalsResponse>, ApiError> {
    let status = query
        .status
        .as_deref()
        .map(|s| {
            WithdrawalStatus::parse(s)
                .ok_or_else(|| ApiError::BadRequest(format!("unknown withdrawal status: {s}")))
        })
        .transpose()?;

    let withdrawals = state
        .ledger
        .list_withdrawals(status, query.limit, query.offset)
        .await?;

    Ok(Json(ListWithdrawalsResponse {
        withdrawals: withdrawals.iter().map(WithdrawalResponse::from).collect(),
    }))
}

/// Settlement request.
#[derive(Debug, Deserialize)]
pub struct SettleWithdrawalRequest {
    /// `completed`, `failed` or `rejected`.
    pub outcome: WithdrawalOutcome,
    /// Payout transaction hash (completed payouts).
    #[serde(default)]
    pub tx_hash: Option<String>,
    /// Reason (failed or rejected payouts).
    #[serde(default)]
    pub error_message: Option<String>,
}

/// Settle a pending withdrawal.
pub async fn settle_withdrawal(
    State(state): State<Arc<AppState>>,
    admin: AdminAuth,
    Path(id): Path<String>,
    Json(body): Json<SettleWithdrawalRequest>,
) -> Result<Json<WithdrawalResponse>, ApiError> {
    let id: WithdrawalId = id.parse().map_err(LedgerError::from)?;

    tracing::info!(
        admin_id = %admin.admin_id,
        withdrawal_id = %id,
        outcome = ?body.outcome,
        "Settling withdrawal"
    );

    let request = state
        .ledger
        .settle_withdrawal(id, body.outcome, body.tx_hash, body.error_message)
        .await?;
    Ok(Json(WithdrawalResponse::from(&request)))
}

/// Aggregate ledger counters.
pub async fn stats(
    State(state): State<Arc<AppState>>,
    _admin: AdminAuth,
) -> Result<Json<LedgerStats>, ApiError> {
    Ok(Json(state.ledger.stats().await?))
}
