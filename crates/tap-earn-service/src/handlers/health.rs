//! Health check handler.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use rust_decimal::Decimal;
use serde::Serialize;

use crate::state::AppState;

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// `ok`, or `degraded` when the store is unreachable.
    pub status: &'static str,
    /// Service name.
    pub service: &'static str,
    /// Service version.
    pub version: &'static str,
    /// Whether the store answered a ping.
    pub store_ready: bool,
    /// TON/USD quote the ledger is using right now.
    pub ton_usd: Decimal,
    /// Packages on sale.
    pub packages: usize,
}

/// Report store readiness and the active TON quote.
///
/// Answers 503 while the store is unreachable.
pub async fn health(State(state): State<Arc<AppState>>) -> (StatusCode, Json<HealthResponse>) {
    let store_ready = match state.ledger.store().ping().await {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(error = %e, "Store ping failed");
            false
        }
    };
    let quote = state.ledger.price_quote().await;

    let status = if store_ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(HealthResponse {
            status: if store_ready { "ok" } else { "degraded" },
            service: "tap-earn",
            version: env!("CARGO_PKG_VERSION"),
            store_ready,
            ton_usd: quote.ton_usd,
            packages: state.ledger.catalog().len(),
        }),
    )
}
