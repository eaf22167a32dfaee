//! Tap handler.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::ledger::TapResult;
use crate::state::AppState;

/// Apply one tap for the caller.
pub async fn tap(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> Result<Json<TapResult>, ApiError> {
    let result = state.ledger.tap(auth.account_id).await?;
    Ok(Json(result))
}
