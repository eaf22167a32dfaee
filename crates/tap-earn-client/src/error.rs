//! Client error types.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

/// Errors that can occur when using the tap-earn client.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Server returned an error response.
    #[error("API error: {code} - {message}")]
    Api {
        /// Error code.
        code: String,
        /// Error message.
        message: String,
        /// HTTP status code.
        status: u16,
    },

    /// The caller's credentials were missing or rejected.
    #[error("unauthorized")]
    Unauthorized,

    /// No energy left for today.
    #[error("energy exhausted")]
    EnergyExhausted,

    /// The active package has paid out its maximum.
    #[error("package earnings cap reached")]
    PackageCapReached,

    /// The payment proof was already used for another purchase.
    #[error("payment proof already used")]
    PaymentProofReused,

    /// Balance too low for the requested withdrawal.
    #[error("insufficient balance: balance={balance}, required={required}")]
    InsufficientBalance {
        /// Current balance in points.
        balance: Decimal,
        /// Points the withdrawal would reserve.
        required: Decimal,
    },

    /// A withdrawal was made too recently.
    #[error("withdrawals on cooldown")]
    OnCooldown {
        /// When the next withdrawal is allowed, if the server said.
        until: Option<DateTime<Utc>>,
    },

    /// Another withdrawal is still awaiting settlement.
    #[error("withdrawal already pending")]
    WithdrawalAlreadyPending,

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid configuration.
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl ClientError {
    /// Whether the server refused the request for a business reason
    /// (as opposed to transport, auth or server failures).
    #[must_use]
    pub fn is_rejection(&self) -> bool {
        match self {
            Self::EnergyExhausted
            | Self::PackageCapReached
            | Self::PaymentProofReused
            | Self::InsufficientBalance { .. }
            | Self::OnCooldown { .. }
            | Self::WithdrawalAlreadyPending => true,
            Self::Api { status, .. } => (400..500).contains(status) && *status != 401,
            _ => false,
        }
    }
}
