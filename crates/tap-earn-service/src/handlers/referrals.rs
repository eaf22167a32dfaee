//! Referral handlers.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use tap_earn_core::AccountId;

use crate::auth::{AuthUser, ServiceAuth};
use crate::error::ApiError;
use crate::ledger::ReferralSummary;
use crate::state::AppState;

/// Referral link request, sent by the bot on `/start <referrer_id>`.
#[derive(Debug, Deserialize)]
pub struct LinkReferralRequest {
    /// The newly arrived account.
    pub account_id: AccountId,
    /// The account whose link was used.
    pub referrer_id: AccountId,
}

/// Referral link response.
#[derive(Debug, Serialize)]
pub struct LinkReferralResponse {
    /// Whether the link was created and the bonus credited.
    pub linked: bool,
}

/// Link a new account to its referrer.
pub async fn link_referral(
    State(state): State<Arc<AppState>>,
    service: ServiceAuth,
    Json(body): Json<LinkReferralRequest>,
) -> Result<Json<LinkReferralResponse>, ApiError> {
    tracing::debug!(
        service = %service.service_name,
        account_id = %body.account_id,
        referrer_id = %body.referrer_id,
        "Referral link requested"
    );

    let linked = state
        .ledger
        .link_referral(body.account_id, body.referrer_id)
        .await?;
    Ok(Json(LinkReferralResponse { linked }))
}

/// The caller's referral overview.
#[derive(Debug, Serialize)]
pub struct ReferralsResponse {
    /// Deep link inviting friends.
    pub referral_link: String,
    /// Points credited per referral.
    pub bonus_per_referral: Decimal,
    /// Accounts referred so far.
    pub referrals: Vec<ReferralSummary>,
}

/// List the caller's referrals.
pub async fn list_referrals(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> Result<Json<ReferralsResponse>, ApiError> {
    let referrals = state.ledger.list_referrals(auth.account_id).await?;

    Ok(Json(ReferralsResponse {
        referral_link: state.config.referral_link(auth.account_id),
        bonus_per_referral: state.ledger.config().referral_bonus,
        referrals,
    }))
}
