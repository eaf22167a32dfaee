//! Database schema definitions.
//!
//! Table names and column lists shared by the `PostgreSQL` queries. The tables
//! themselves are created by the migrations in `migrations/`.

/// Table names.
pub mod tables {
    /// One row per account, keyed by the external user id.
    pub const ACCOUNTS: &str = "accounts";

    /// Append-only ledger transactions, keyed by ULID.
    pub const TRANSACTIONS: &str = "ledger_transactions";

    /// Withdrawal requests, keyed by UUID.
    pub const WITHDRAWALS: &str = "withdrawals";

    /// Package purchases, keyed by payment proof.
    pub const PACKAGE_PURCHASES: &str = "package_purchases";
}

/// Columns of the `accounts` table, in insert order.
pub const ACCOUNT_COLUMNS: &str = "id, username, first_name, balance, energy, max_energy, \
     total_taps, tap_value, active_package, package_earnings, max_package_earnings, \
     unlimited_taps, referrer_id, referral_count, withdrawal_cooldown_until, \
     pending_withdrawal, last_energy_reset_at, created_at, last_seen_at, updated_at";

/// Columns of the `ledger_transactions` table, in insert order.
pub const TRANSACTION_COLUMNS: &str =
    "id, account_id, transaction_type, amount, balance_after, description, metadata, created_at";

/// Columns of the `withdrawals` table, in insert order.
pub const WITHDRAWAL_COLUMNS: &str = "id, account_id, amount, required_balance, \
     destination_address, status, idempotency_key, requested_at, processed_at, tx_hash, \
     error_message";

/// Columns of the `package_purchases` table, in insert order.
pub const PURCHASE_COLUMNS: &str =
    "payment_proof, account_id, package_id, price, transaction_id, created_at";

/// Returns all table names, in dependency order.
#[must_use]
pub fn all_tables() -> Vec<&'static str> {
    vec![
        tables::ACCOUNTS,
        tables::TRANSACTIONS,
        tables::WITHDRAWALS,
        tables::PACKAGE_PURCHASES,
    ]
}
