//! Account handlers.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::Json;
use rust_decimal::Decimal;
use serde::Serialize;

use tap_earn_core::{AccountId, LedgerTransaction};

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::handlers::PageQuery;
use crate::ledger::AccountView;
use crate::state::AppState;

/// Get the caller's account, creating it on first contact.
///
/// When the Mini App was opened through a referral link, the `start_param`
/// carries the referrer id and the account is linked to it. Linking is a
/// no-op for accounts that already have a referrer.
pub async fn get_account(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> Result<Json<AccountView>, ApiError> {
    if let Some(referrer_id) = auth
        .start_param
        .as_deref()
        .and_then(|p| p.parse::<AccountId>().ok())
    {
        state
            .ledger
            .link_referral(auth.account_id, referrer_id)
            .await?;
    }

    let view = state
        .ledger
        .get_account(auth.account_id, Some(&auth.profile))
        .await?;
    Ok(Json(view))
}

/// Transaction response.
#[derive(Debug, Serialize)]
pub struct TransactionResponse {
    /// Transaction ID.
    pub id: String,
    /// Amount in points (positive = credit, negative = debit).
    pub amount: Decimal,
    /// Transaction type.
    pub transaction_type: String,
    /// Balance after this transaction.
    pub balance_after: Decimal,
    /// Description.
    pub description: String,
    /// Additional context.
    #[serde(skip_serializing_if = "serde_json::Value::is_null")]
    pub metadata: serde_json::Value,
    /// Timestamp.
    pub created_at: String,
}

impl From<&LedgerTransaction> for TransactionResponse {
    fn from(tx: &LedgerTransaction) -> Self {
        Self {
            id: tx.id.to_string(),
            amount: tx.amount,
            transaction_type: tx.transaction_type.as_str().to_string(),
            balance_after: tx.balance_after,
            description: tx.description.clone(),
            metadata: tx.metadata.clone(),
            created_at: tx.created_at.to_rfc3339(),
        }
    }
}

/// List transactions response.
#[derive(Debug, Serialize)]
pub struct ListTransactionsResponse {
    /// Transactions (newest first).
    pub transactions: Vec<TransactionResponse>,
    /// Whether there are more transactions.
    pub has_more: bool,
}

/// List the caller's transaction history.
pub async fn list_transactions(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Query(query): Query<PageQuery>,
) -> Result<Json<ListTransactionsResponse>, ApiError> {
    let page = state
        .ledger
        .list_transactions(auth.account_id, query.limit, query.offset)
        .await?;

    Ok(Json(ListTransactionsResponse {
        transactions: page.transactions.iter().map(TransactionResponse::from).collect(),
        has_more: page.has_more,
    }))
}
