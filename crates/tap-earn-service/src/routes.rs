//! Router configuration.
//!
//! This module sets up the Axum router with all routes and middleware.

use std::sync::Arc;
use std::time::Duration;

use axum::routing::{get, post};
use axum::Router;
use tower::limit::ConcurrencyLimitLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::handlers::{accounts, admin, health, packages, price, referrals, taps, withdrawals};
use crate::state::AppState;

// ============================================================================
// Concurrency Limiting Constants
// ============================================================================

/// Maximum concurrent requests for the tap endpoint.
/// Taps arrive in bursts from every open Mini App.
const TAP_MAX_CONCURRENT_REQUESTS: usize = 200;

/// Maximum concurrent requests for general API endpoints.
const API_MAX_CONCURRENT_REQUESTS: usize = 50;

/// Create the service router with all routes and middleware.
///
/// # Routes
///
/// ## Public
/// - `GET /health` - Health check
/// - `GET /v1/packages` - Package catalog with TON prices
/// - `GET /v1/price` - Current TON quote
///
/// ## Mini App (Telegram init data auth)
/// - `GET /v1/accounts/me` - Get (or create) the caller's account
/// - `GET /v1/accounts/me/transactions` - List transaction history
/// - `POST /v1/taps` - Tap once
/// - `POST /v1/packages/purchase` - Activate a paid package
/// - `GET /v1/referrals/me` - Referral link and referred accounts
/// - `POST /v1/withdrawals` - Request a TON withdrawal
/// - `GET /v1/withdrawals/me` - Withdrawal history
///
/// ## Bot (Service API Key auth)
/// - `POST /v1/referrals` - Link a referral
///
/// ## Admin (Admin API Key auth)
/// - `GET /v1/admin/withdrawals` - Withdrawal queue
/// - `POST /v1/admin/withdrawals/:id/settle` - Settle a withdrawal
/// - `GET /v1/admin/stats` - Ledger counters
pub fn create_router(state: AppState) -> Router {
    // Extract config values before moving state
    let cors_origins = state.config.cors_origins.clone();
    let max_body_bytes = state.config.max_body_bytes;
    let request_timeout_seconds = state.config.request_timeout_seconds;

    let cors = build_cors_layer(&cors_origins);

    let state = Arc::new(state);

    let tap_routes = Router::new()
        .route("/", post(taps::tap))
        .layer(ConcurrencyLimitLayer::new(TAP_MAX_CONCURRENT_REQUESTS));

    let api_routes = Router::new()
        // Accounts
        .route("/accounts/me", get(accounts::get_account))
        .route("/accounts/me/transactions", get(accounts::list_transactions))
        // Packages
        .route("/packages", get(packages::list_packages))
        .route("/packages/purchase", post(packages::purchase_package))
        // Referrals
        .route("/referrals", post(referrals::link_referral))
        .route("/referrals/me", get(referrals::list_referrals))
        // Withdrawals
        .route("/withdrawals", post(withdrawals::request_withdrawal))
        .route("/withdrawals/me", get(withdrawals::list_my_withdrawals))
        // Price
        .route("/price", get(price::get_price))
        // Admin
        .route("/admin/withdrawals", get(admin::list_withdrawals))
        .route("/admin/withdrawals/:id/settle", post(admin::settle_withdrawal))
        .route("/admin/stats", get(admin::stats))
        .layer(ConcurrencyLimitLayer::new(API_MAX_CONCURRENT_REQUESTS))
        // Taps (with their own concurrency limit)
        .nest("/taps", tap_routes);

    Router::new()
        // Health (public, no rate limit)
        .route("/health", get(health::health))
        // API v1 routes (rate limited)
        .nest("/v1", api_routes)
        // Global middleware
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(RequestBodyLimitLayer::new(max_body_bytes))
        .layer(TimeoutLayer::new(Duration::from_secs(
            request_timeout_seconds,
        )))
        .with_state(state)
}

/// Build the CORS layer from configured origins.
fn build_cors_layer(origins: &[String]) -> CorsLayer {
    if origins.iter().any(|o| o == "*") {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let origins: Vec<_> = origins.iter().filter_map(|o| o.parse().ok()).collect();

        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    }
}
