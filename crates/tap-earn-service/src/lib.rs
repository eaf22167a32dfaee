//! Tap-Earn HTTP API Service.
//!
//! This crate provides the HTTP API for the tap-earn ledger, including:
//!
//! - Accounts, taps and transaction history
//! - Package catalog and purchases
//! - Referral linking
//! - TON withdrawals and their admin settlement queue
//! - The TON price oracle
//!
//! # Authentication
//!
//! The service supports three authentication methods:
//!
//! 1. **Telegram init data** - For Mini App requests (`Authorization: tma <initData>`)
//! 2. **Service API keys** - For the bot process (`X-API-Key`)
//! 3. **Admin API keys** - For settlement and stats (`X-Admin-Key`)

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
// Allow some pedantic lints that are noisy for Axum handler functions
#![allow(clippy::missing_errors_doc)] // Axum handlers all return Result
#![allow(clippy::unused_async)] // Handlers stay async for a uniform router

pub mod auth;
pub mod config;
pub mod crypto;
pub mod error;
pub mod handlers;
pub mod ledger;
pub mod oracle;
pub mod routes;
pub mod state;

pub use config::ServiceConfig;
pub use error::ApiError;
pub use ledger::{
    AccountView, Ledger, PackageQuote, PriceQuote, PurchaseResult, ReferralSummary, TapResult,
    TransactionPage,
};
pub use oracle::{CoinGeckoOracle, FixedPriceOracle, OracleError, PriceOracle};
pub use routes::create_router;
pub use state::AppState;
