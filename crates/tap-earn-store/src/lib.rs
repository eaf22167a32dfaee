//! Storage layer for tap-earn.
//!
//! This crate persists accounts, ledger transactions, withdrawal requests and
//! package purchases. Two backends implement [`Store`]:
//!
//! - [`MemoryStore`]: in-process maps with one lock per account (tests, local runs)
//! - [`PgStore`]: `PostgreSQL` via `sqlx`, one database transaction per operation
//!   with `SELECT ... FOR UPDATE` row locks (feature `postgres`)
//!
//! # Atomicity
//!
//! Every ledger operation is a compound method on [`Store`]. The backend locks
//! the affected account rows, calls the pure rule on [`tap_earn_core::Account`],
//! then persists the account, the transaction record and any side rows as one
//! unit. A rejected rule persists nothing.
//!
//! # Example
//!
//! ```no_run
//! use chrono::Utc;
//! use tap_earn_core::{AccountId, LedgerConfig};
//! use tap_earn_store::{MemoryStore, Store};
//!
//! # async fn run() -> tap_earn_store::Result<()> {
//! let store = MemoryStore::new();
//! let config = LedgerConfig::default();
//!
//! let receipt = store.tap(AccountId::new(42), &config, Utc::now()).await?;
//! println!("balance: {}", receipt.account.balance);
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod memory;
#[cfg(feature = "postgres")]
pub mod postgres;
pub mod schema;

pub use error::{Result, StoreError};
pub use memory::MemoryStore;
#[cfg(feature = "postgres")]
pub use postgres::PgStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use tap_earn_core::{
    Account, AccountId, AccountProfile, LedgerConfig, LedgerTransaction, Package,
    PackagePurchase, TapReceipt, WithdrawalDraft, WithdrawalId, WithdrawalOutcome,
    WithdrawalRequest, WithdrawalStatus,
};

/// Result of a package activation.
#[derive(Debug, Clone, PartialEq)]
pub struct PackageActivation {
    /// The account after activation (unchanged on replay).
    pub account: Account,

    /// The purchase record for the payment proof.
    pub purchase: PackagePurchase,

    /// Whether the proof had already been used by this account.
    pub replayed: bool,
}

/// Aggregate counters for the admin dashboard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LedgerStats {
    /// Number of accounts.
    pub total_accounts: i64,

    /// Accounts created in the last 24 hours.
    pub new_accounts_24h: i64,

    /// Sum of all balances in points.
    pub total_balance: Decimal,

    /// Sum of all lifetime tap counts.
    pub total_taps: i64,

    /// Withdrawal requests awaiting settlement.
    pub pending_withdrawals: i64,
}

/// The storage trait defining all ledger persistence.
///
/// Compound operations are linearizable per account. Business rejections are
/// returned as [`StoreError::Ledger`]; a lost race on the database surfaces as
/// [`StoreError::Conflict`] and the whole operation can be retried.
#[async_trait]
pub trait Store: Send + Sync {
    // =========================================================================
    // Account Operations
    // =========================================================================

    /// Get an account by id without creating it.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn get_account(&self, id: AccountId) -> Result<Option<Account>>;

    /// Get an account, creating it with defaults on first contact.
    ///
    /// Touches `last_seen_at`, refreshes profile fields when given and applies
    /// a due energy reset.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn get_or_create_account(
        &self,
        id: AccountId,
        profile: Option<&AccountProfile>,
        config: &LedgerConfig,
        now: DateTime<Utc>,
    ) -> Result<Account>;

    /// Insert or overwrite an account record.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn put_account(&self, account: &Account) -> Result<()>;

    /// List the accounts referred by `id`, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn list_referrals(&self, id: AccountId) -> Result<Vec<Account>>;

    // =========================================================================
    // Transaction Operations
    // =========================================================================

    /// List transactions for an account, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn list_transactions_by_account(
        &self,
        id: AccountId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<LedgerTransaction>>;

    // =========================================================================
    // Withdrawal Operations
    // =========================================================================

    /// Get a withdrawal request by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn get_withdrawal(&self, id: WithdrawalId) -> Result<Option<WithdrawalRequest>>;

    /// Find an account's withdrawal by its idempotency key.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn find_withdrawal_by_key(
        &self,
        account_id: AccountId,
        idempotency_key: &str,
    ) -> Result<Option<WithdrawalRequest>>;

    /// List withdrawal requests, newest first, optionally filtered by status.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn list_withdrawals(
        &self,
        status: Option<WithdrawalStatus>,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<WithdrawalRequest>>;

    /// List an account's withdrawal requests, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn list_account_withdrawals(
        &self,
        account_id: AccountId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<WithdrawalRequest>>;

    // =========================================================================
    // Compound Operations
    // =========================================================================

    /// Apply one tap and record the `tap` transaction atomically.
    ///
    /// # Errors
    ///
    /// - `LedgerError::EnergyExhausted` if no energy is left today.
    /// - `LedgerError::PackageCapReached` if the package cap is reached.
    async fn tap(
        &self,
        id: AccountId,
        config: &LedgerConfig,
        now: DateTime<Utc>,
    ) -> Result<TapReceipt>;

    /// Activate a package paid for with `payment_proof`.
    ///
    /// Replaying a proof on the same account returns the original purchase
    /// with `replayed = true` and changes nothing.
    ///
    /// # Errors
    ///
    /// - `LedgerError::PaymentProofReused` if another account used the proof.
    /// - `LedgerError::InvalidRequest` if the proof is blank.
    async fn activate_package(
        &self,
        id: AccountId,
        package: &Package,
        payment_proof: &str,
        config: &LedgerConfig,
        now: DateTime<Utc>,
    ) -> Result<PackageActivation>;

    /// Link `new_id` to `referrer_id` and credit the referral bonus.
    ///
    /// Returns `false` without changes if the accounts are the same, the new
    /// account already has a referrer, or the referrer does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn link_referral(
        &self,
        new_id: AccountId,
        referrer_id: AccountId,
        config: &LedgerConfig,
        now: DateTime<Utc>,
    ) -> Result<bool>;

    /// Reserve the balance for a withdrawal and insert the pending request.
    ///
    /// A draft whose idempotency key matches an existing request of the
    /// account returns that request unchanged.
    ///
    /// # Errors
    ///
    /// - `LedgerError::AccountNotFound` if the account does not exist.
    /// - `LedgerError::WithdrawalAlreadyPending`, `LedgerError::OnCooldown`
    ///   or `LedgerError::InsufficientBalance` from the account rules.
    async fn create_withdrawal(
        &self,
        account_id: AccountId,
        draft: WithdrawalDraft,
        config: &LedgerConfig,
        now: DateTime<Utc>,
    ) -> Result<WithdrawalRequest>;

    /// Move a pending withdrawal to its terminal state, refunding on failure
    /// or rejection.
    ///
    /// # Errors
    ///
    /// - `LedgerError::WithdrawalNotFound` if the request does not exist.
    /// - `LedgerError::WithdrawalAlreadySettled` if it is already terminal.
    async fn settle_withdrawal(
        &self,
        id: WithdrawalId,
        outcome: WithdrawalOutcome,
        tx_hash: Option<String>,
        error_message: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<WithdrawalRequest>;

    // =========================================================================
    // Reporting
    // =========================================================================

    /// Aggregate counters as of `now`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn stats(&self, now: DateTime<Utc>) -> Result<LedgerStats>;

    /// Check that the backend can serve requests.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend is unreachable.
    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}
