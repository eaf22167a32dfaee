//! Price quote handler.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;

use crate::ledger::PriceQuote;
use crate::state::AppState;

/// Current TON price in US dollars and points.
pub async fn get_price(State(state): State<Arc<AppState>>) -> Json<PriceQuote> {
    Json(state.ledger.price_quote().await)
}
