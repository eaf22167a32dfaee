//! Error types for tap-earn ledger operations.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::ids::{AccountId, IdError, PackageId, WithdrawalId};
use crate::withdrawal::WithdrawalStatus;

/// Result type for ledger operations.
pub type Result<T> = std::result::Result<T, LedgerError>;

/// Errors that can occur in ledger operations.
///
/// Everything except [`LedgerError::PersistenceConflict`] and
/// [`LedgerError::Storage`] is a business rejection: the operation did not
/// commit and the caller can show the message to the user.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LedgerError {
    /// No energy left for today.
    #[error("no energy left: taps refill at the next UTC day")]
    EnergyExhausted,

    /// The active package has paid out its maximum earnings.
    #[error("package earnings limit reached: earned={earned}, cap={cap}")]
    PackageCapReached {
        /// Earnings accrued under the active package.
        earned: Decimal,
        /// The package cap.
        cap: Decimal,
    },

    /// The package id is not in the catalog.
    #[error("unknown package: {package_id}")]
    UnknownPackage {
        /// The requested package id.
        package_id: String,
    },

    /// The payment proof was already used to buy a package on another account.
    #[error("payment proof already used by another account")]
    PaymentProofReused,

    /// Withdrawal amount is below the configured minimum.
    #[error("withdrawal amount {amount} is below the minimum of {minimum}")]
    BelowMinimum {
        /// Requested amount.
        amount: Decimal,
        /// Configured minimum.
        minimum: Decimal,
    },

    /// The account is still in its withdrawal cooldown.
    #[error("withdrawals are on cooldown until {until}")]
    OnCooldown {
        /// When the cooldown ends.
        until: DateTime<Utc>,
    },

    /// Balance too low for the withdrawal.
    #[error("insufficient balance: balance={balance}, required={required}")]
    InsufficientBalance {
        /// Current balance in points.
        balance: Decimal,
        /// Points required.
        required: Decimal,
    },

    /// The account already has a pending withdrawal.
    #[error("withdrawal {withdrawal_id} is still pending")]
    WithdrawalAlreadyPending {
        /// The pending request.
        withdrawal_id: WithdrawalId,
    },

    /// Account not found.
    #[error("account not found: {account_id}")]
    AccountNotFound {
        /// The account id that was not found.
        account_id: AccountId,
    },

    /// Withdrawal request not found.
    #[error("withdrawal not found: {withdrawal_id}")]
    WithdrawalNotFound {
        /// The withdrawal id that was not found.
        withdrawal_id: WithdrawalId,
    },

    /// The withdrawal already reached a terminal state.
    #[error("withdrawal {withdrawal_id} already settled as {status}")]
    WithdrawalAlreadySettled {
        /// The withdrawal id.
        withdrawal_id: WithdrawalId,
        /// Its terminal status.
        status: WithdrawalStatus,
    },

    /// Malformed request input.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Invalid identifier.
    #[error("invalid identifier: {0}")]
    InvalidId(#[from] IdError),

    /// A concurrent writer won; retry the whole operation from a fresh read.
    #[error("persistence conflict, retry the operation")]
    PersistenceConflict,

    /// Storage unreachable or failing.
    #[error("storage error: {0}")]
    Storage(String),
}

impl LedgerError {
    /// Create an unknown-package error.
    #[must_use]
    pub fn unknown_package(package_id: &PackageId) -> Self {
        Self::UnknownPackage {
            package_id: package_id.to_string(),
        }
    }

    /// Whether this error is an infrastructure failure rather than a rejection.
    #[must_use]
    pub const fn is_infrastructure(&self) -> bool {
        matches!(self, Self::PersistenceConflict | Self::Storage(_))
    }
}
