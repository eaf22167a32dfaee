//! API handlers.

pub mod accounts;
pub mod admin;
pub mod health;
pub mod packages;
pub mod price;
pub mod referrals;
pub mod taps;
pub mod withdrawals;

use serde::Deserialize;

/// Pagination query parameters.
#[derive(Debug, Deserialize)]
pub struct PageQuery {
    /// Maximum number of items to return (default: 50, capped at 100).
    #[serde(default = "default_limit")]
    pub limit: usize,
    /// Offset for pagination (default: 0).
    #[serde(default)]
    pub offset: usize,
}

fn default_limit() -> usize {
    50
}
