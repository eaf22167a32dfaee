//! Core types and ledger rules for tap-earn.
//!
//! This crate provides the foundational types used throughout the tap-earn backend:
//!
//! - **Identifiers**: `AccountId`, `TransactionId`, `WithdrawalId`, `PackageId`
//! - **Accounts**: `Account`, `AccountProfile`
//! - **Packages**: `Package`, `PackageCatalog`, `PackagePurchase`
//! - **Transactions**: `LedgerTransaction`, `TransactionType`
//! - **Withdrawals**: `WithdrawalRequest`, `WithdrawalStatus`, `WithdrawalOutcome`
//! - **Configuration**: `LedgerConfig`
//!
//! # Points
//!
//! Balances are kept in **points** as exact decimals.
//!
//! - 1000 points = $1 (see [`DEFAULT_POINTS_PER_USD`])
//! - A tap credits the account's `tap_value` (0.05 points without a package)
//! - Withdrawals are quoted in TON and converted to points with the live price
//!
//! Every rule that decides whether a tap, purchase, referral or withdrawal is
//! allowed lives on [`Account`] as a pure function of its state and `now`.
//! Storage backends call these rules while holding the account lock.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod account;
pub mod config;
pub mod error;
pub mod ids;
pub mod package;
pub mod transaction;
pub mod withdrawal;

pub use account::{Account, AccountProfile, TapReceipt};
pub use config::{
    LedgerConfig, DEFAULT_BASE_TAP_VALUE, DEFAULT_MAX_ENERGY, DEFAULT_MIN_WITHDRAWAL,
    DEFAULT_POINTS_PER_USD, DEFAULT_REFERRAL_BONUS, DEFAULT_WITHDRAWAL_COOLDOWN_DAYS,
};
pub use error::{LedgerError, Result};
pub use ids::{AccountId, IdError, PackageId, TransactionId, WithdrawalId};
pub use package::{Package, PackageCatalog, PackagePurchase};
pub use transaction::{LedgerTransaction, TransactionType};
pub use withdrawal::{WithdrawalDraft, WithdrawalOutcome, WithdrawalRequest, WithdrawalStatus};
