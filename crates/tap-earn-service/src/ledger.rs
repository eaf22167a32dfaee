//! The tap-earn ledger service.
//!
//! [`Ledger`] ties the account store, the package catalog and the price
//! oracle together. It validates request input, converts withdrawal amounts
//! with the live TON price and retries store operations that lost a race.
//!
//! Every mutating call reads `now` afresh on each attempt, so a retried
//! operation is evaluated against the state it actually commits on.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use tap_earn_core::{
    Account, AccountId, AccountProfile, LedgerConfig, LedgerError, LedgerTransaction, Package,
    PackageCatalog, PackageId, TransactionId, WithdrawalDraft, WithdrawalId, WithdrawalOutcome,
    WithdrawalRequest, WithdrawalStatus,
};
use tap_earn_store::{LedgerStats, Store, StoreError};

use crate::oracle::PriceOracle;

// ============================================================================
// Retry Constants
// ============================================================================

/// Maximum attempts for an operation that hit a persistence conflict.
const CONFLICT_MAX_RETRIES: u32 = 3;

/// Initial backoff between attempts (doubles with each attempt).
const CONFLICT_INITIAL_BACKOFF_MS: u64 = 25;

/// Maximum backoff between attempts.
const CONFLICT_MAX_BACKOFF_MS: u64 = 500;

/// Maximum page size for list operations.
pub const MAX_PAGE_SIZE: usize = 100;

/// Decimal places kept in derived TON and USD values.
const DISPLAY_SCALE: u32 = 9;

// ============================================================================
// Views
// ============================================================================

/// An account as shown to its owner.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AccountView {
    /// The account id.
    pub id: AccountId,
    /// Telegram username.
    pub username: Option<String>,
    /// Telegram first name.
    pub first_name: Option<String>,
    /// Balance in points.
    pub balance: Decimal,
    /// Balance in US dollars.
    pub balance_usd: Decimal,
    /// Balance in TON at the current price.
    pub balance_ton: Decimal,
    /// Energy left today.
    pub energy: i32,
    /// Energy restored by the daily reset.
    pub max_energy: i32,
    /// Whether taps consume energy.
    pub unlimited_taps: bool,
    /// Points per tap.
    pub tap_value: Decimal,
    /// Lifetime tap count.
    pub total_taps: i64,
    /// Active package.
    pub active_package: Option<PackageId>,
    /// Points earned under the active package.
    pub package_earnings: Decimal,
    /// Earnings cap of the active package (zero or negative = no cap).
    pub max_package_earnings: Decimal,
    /// Who referred this account.
    pub referrer_id: Option<AccountId>,
    /// Accounts referred by this account.
    pub referral_count: i64,
    /// Whether a withdrawal can be requested now.
    pub can_withdraw: bool,
    /// End of the withdrawal cooldown.
    pub cooldown_until: Option<DateTime<Utc>>,
    /// The pending withdrawal.
    pub pending_withdrawal: Option<WithdrawalId>,
    /// When the account was created.
    pub created_at: DateTime<Utc>,
}

impl AccountView {
    /// Build a view of `account` priced at `ton_usd`.
    #[must_use]
    pub fn new(account: &Account, config: &LedgerConfig, ton_usd: Decimal, now: DateTime<Utc>) -> Self {
        let balance_usd = config.points_to_usd(account.balance);
        let balance_ton = if ton_usd > Decimal::ZERO {
            (balance_usd / ton_usd).round_dp(DISPLAY_SCALE)
        } else {
            Decimal::ZERO
        };

        Self {
            id: account.id,
            username: account.username.clone(),
            first_name: account.first_name.clone(),
            balance: account.balance,
            balance_usd: balance_usd.round_dp(DISPLAY_SCALE),
            balance_ton,
            energy: account.energy,
            max_energy: account.max_energy,
            unlimited_taps: account.unlimited_taps,
            tap_value: account.tap_value,
            total_taps: account.total_taps,
            active_package: account.active_package.clone(),
            package_earnings: account.package_earnings,
            max_package_earnings: account.max_package_earnings,
            referrer_id: account.referrer_id,
            referral_count: account.referral_count,
            can_withdraw: account.pending_withdrawal.is_none() && !account.cooldown_active(now),
            cooldown_until: account.withdrawal_cooldown_until,
            pending_withdrawal: account.pending_withdrawal,
            created_at: account.created_at,
        }
    }
}

/// Result of a tap.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TapResult {
    /// Balance after the tap.
    pub new_balance: Decimal,
    /// Energy left, `None` when taps are unlimited.
    pub energy_remaining: Option<i32>,
    /// Points credited.
    pub tap_value: Decimal,
    /// Earnings under the active package.
    pub package_earnings: Decimal,
    /// Cap of the active package.
    pub max_package_earnings: Decimal,
    /// The `tap` transaction.
    pub transaction_id: TransactionId,
}

/// A catalog entry with its current TON price.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PackageQuote {
    /// The package.
    #[serde(flatten)]
    pub package: Package,
    /// Price in TON, absent without a usable quote.
    pub price_in_ton: Option<Decimal>,
}

/// Result of a package purchase.
#[derive(Debug, Clone, PartialEq)]
pub struct PurchaseResult {
    /// The account after activation.
    pub account: Account,
    /// The package bought.
    pub package: Package,
    /// The `package_purchase` transaction.
    pub transaction_id: TransactionId,
    /// Whether the payment proof had already been applied.
    pub replayed: bool,
}

/// An account referred by another.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReferralSummary {
    /// The referred account.
    pub account_id: AccountId,
    /// Username, first name or "Anonymous".
    pub display_name: String,
    /// Its balance in points.
    pub balance: Decimal,
    /// When it joined.
    pub joined_at: DateTime<Utc>,
}

impl From<&Account> for ReferralSummary {
    fn from(account: &Account) -> Self {
        Self {
            account_id: account.id,
            display_name: account.display_name().to_string(),
            balance: account.balance,
            joined_at: account.created_at,
        }
    }
}

/// A page of transactions.
#[derive(Debug, Clone, PartialEq)]
pub struct TransactionPage {
    /// Transactions, newest first.
    pub transactions: Vec<LedgerTransaction>,
    /// Whether more transactions follow.
    pub has_more: bool,
}

/// The current TON quote.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PriceQuote {
    /// One TON in US dollars.
    pub ton_usd: Decimal,
    /// One TON in points.
    pub ton_points: Decimal,
    /// Points per US dollar.
    pub points_per_usd: Decimal,
}

// ============================================================================
// Ledger
// ============================================================================

/// The ledger service.
pub struct Ledger {
    store: Arc<dyn Store>,
    oracle: Arc<dyn PriceOracle>,
    catalog: PackageCatalog,
    config: LedgerConfig,
}

impl Ledger {
    /// Create a ledger over a store and a price oracle.
    #[must_use]
    pub fn new(
        store: Arc<dyn Store>,
        oracle: Arc<dyn PriceOracle>,
        catalog: PackageCatalog,
        config: LedgerConfig,
    ) -> Self {
        Self {
            store,
            oracle,
            catalog,
            config,
        }
    }

    /// The ledger constants.
    #[must_use]
    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    /// The package catalog.
    #[must_use]
    pub fn catalog(&self) -> &PackageCatalog {
        &self.catalog
    }

    /// The underlying store.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    /// Run a store operation, retrying persistence conflicts with exponential
    /// backoff. Each attempt gets a fresh `now`.
    async fn with_retry<T, F, Fut>(&self, operation: &'static str, mut op: F) -> Result<T, LedgerError>
    where
        F: FnMut(DateTime<Utc>) -> Fut,
        Fut: Future<Output = Result<T, StoreError>>,
    {
        let mut attempt = 0;
        let mut backoff_ms = CONFLICT_INITIAL_BACKOFF_MS;

        loop {
            match op(Utc::now()).await {
                Ok(value) => return Ok(value),
                Err(StoreError::Conflict) => {
                    attempt += 1;

                    if attempt >= CONFLICT_MAX_RETRIES {
                        tracing::warn!(
                            operation,
                            attempt = %attempt,
                            "Persistence conflict persisted after max retries"
                        );
                        return Err(LedgerError::PersistenceConflict);
                    }

                    tracing::debug!(
                        operation,
                        attempt = %attempt,
                        backoff_ms = %backoff_ms,
                        "Persistence conflict, retrying"
                    );

                    tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                    backoff_ms = (backoff_ms * 2).min(CONFLICT_MAX_BACKOFF_MS);
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    // =========================================================================
    // Accounts
    // =========================================================================

    /// Get the caller's account, creating it on first contact.
    pub async fn get_account(
        &self,
        id: AccountId,
        profile: Option<&AccountProfile>,
    ) -> Result<AccountView, LedgerError> {
        let account = self.open_account(id, profile).await?;
        let ton_usd = self.oracle.ton_usd_price().await;
        Ok(AccountView::new(&account, &self.config, ton_usd, Utc::now()))
    }

    /// Get or create the raw account record.
    pub async fn open_account(
        &self,
        id: AccountId,
        profile: Option<&AccountProfile>,
    ) -> Result<Account, LedgerError> {
        let store = &self.store;
        let config = &self.config;
        self.with_retry("open_account", move |now| {
            store.get_or_create_account(id, profile, config, now)
        })
        .await
    }

    /// List an account's transactions, newest first.
    pub async fn list_transactions(
        &self,
        id: AccountId,
        limit: usize,
        offset: usize,
    ) -> Result<TransactionPage, LedgerError> {
        let limit = limit.min(MAX_PAGE_SIZE);
        let mut transactions = self
            .store
            .list_transactions_by_account(id, limit + 1, offset)
            .await?;

        let has_more = transactions.len() > limit;
        transactions.truncate(limit);
        Ok(TransactionPage {
            transactions,
            has_more,
        })
    }

    // =========================================================================
    // Taps
    // =========================================================================

    /// Apply one tap.
    ///
    /// # Errors
    ///
    /// - `LedgerError::EnergyExhausted` if no energy is left today.
    /// - `LedgerError::PackageCapReached` if the package cap is reached.
    pub async fn tap(&self, id: AccountId) -> Result<TapResult, LedgerError> {
        let store = &self.store;
        let config = &self.config;
        let receipt = self
            .with_retry("tap", move |now| store.tap(id, config, now))
            .await?;

        let account = receipt.account;
        Ok(TapResult {
            new_balance: account.balance,
            energy_remaining: account.energy_remaining(),
            tap_value: receipt.transaction.amount,
            package_earnings: account.package_earnings,
            max_package_earnings: account.max_package_earnings,
            transaction_id: receipt.transaction.id,
        })
    }

    // =========================================================================
    // Packages
    // =========================================================================

    /// The catalog priced in TON at the current quote.
    pub async fn list_packages(&self) -> Vec<PackageQuote> {
        let ton_usd = self.oracle.ton_usd_price().await;
        self.catalog
            .iter()
            .map(|package| PackageQuote {
                package: package.clone(),
                price_in_ton: package.price_in_ton(ton_usd),
            })
            .collect()
    }

    /// Activate a package paid for with `payment_proof`.
    ///
    /// # Errors
    ///
    /// - `LedgerError::UnknownPackage` if the package is not in the catalog.
    /// - `LedgerError::PaymentProofReused` if another account used the proof.
    /// - `LedgerError::InvalidRequest` if the proof is blank.
    pub async fn purchase_package(
        &self,
        id: AccountId,
        package_id: &PackageId,
        payment_proof: &str,
    ) -> Result<PurchaseResult, LedgerError> {
        let package = self.catalog.require(package_id)?;
        let payment_proof = payment_proof.trim();

        let store = &self.store;
        let config = &self.config;
        let activation = self
            .with_retry("purchase_package", move |now| {
                store.activate_package(id, package, payment_proof, config, now)
            })
            .await?;

        if activation.replayed {
            tracing::debug!(account_id = %id, package_id = %package.id, "Package purchase replayed");
        } else {
            tracing::info!(
                account_id = %id,
                package_id = %package.id,
                price = %package.price,
                "Package activated"
            );
        }

        Ok(PurchaseResult {
            account: activation.account,
            package: package.clone(),
            transaction_id: activation.purchase.transaction_id,
            replayed: activation.replayed,
        })
    }

    // =========================================================================
    // Referrals
    // =========================================================================

    /// Link `new_id` to `referrer_id`, crediting the referral bonus.
    ///
    /// Returns `false` if the link is not allowed or already exists.
    pub async fn link_referral(
        &self,
        new_id: AccountId,
        referrer_id: AccountId,
    ) -> Result<bool, LedgerError> {
        let store = &self.store;
        let config = &self.config;
        let linked = self
            .with_retry("link_referral", move |now| {
                store.link_referral(new_id, referrer_id, config, now)
            })
            .await?;

        if linked {
            tracing::info!(
                account_id = %new_id,
                referrer_id = %referrer_id,
                bonus = %self.config.referral_bonus,
                "Referral linked"
            );
        } else {
            tracing::debug!(account_id = %new_id, referrer_id = %referrer_id, "Referral not linked");
        }
        Ok(linked)
    }

    /// Accounts referred by `id`, oldest first.
    pub async fn list_referrals(&self, id: AccountId) -> Result<Vec<ReferralSummary>, LedgerError> {
        let referrals = self.store.list_referrals(id).await?;
        Ok(referrals.iter().map(ReferralSummary::from).collect())
    }

    // =========================================================================
    // Withdrawals
    // =========================================================================

    /// Request a withdrawal of `amount` TON to `destination_address`.
    ///
    /// A request carrying an idempotency key already used by the account
    /// returns the original request unchanged.
    ///
    /// # Errors
    ///
    /// - `LedgerError::BelowMinimum` if `amount` is under the minimum.
    /// - `LedgerError::InvalidRequest` if the address is blank.
    /// - `LedgerError::WithdrawalAlreadyPending`, `LedgerError::OnCooldown`
    ///   or `LedgerError::InsufficientBalance` from the account rules.
    /// - `LedgerError::AccountNotFound` if the account does not exist.
    pub async fn request_withdrawal(
        &self,
        id: AccountId,
        amount: Decimal,
        destination_address: &str,
        idempotency_key: Option<&str>,
    ) -> Result<WithdrawalRequest, LedgerError> {
        if amount < self.config.min_withdrawal {
            return Err(LedgerError::BelowMinimum {
                amount,
                minimum: self.config.min_withdrawal,
            });
        }

        let destination_address = destination_address.trim();
        if destination_address.is_empty() {
            return Err(LedgerError::InvalidRequest(
                "destination address is required".into(),
            ));
        }

        let idempotency_key = idempotency_key.map(str::trim).filter(|k| !k.is_empty());
        if let Some(key) = idempotency_key {
            if let Some(existing) = self.store.find_withdrawal_by_key(id, key).await? {
                tracing::debug!(account_id = %id, withdrawal_id = %existing.id, "Withdrawal replayed");
                return Ok(existing);
            }
        }

        let price = self.oracle.current_price().await;
        let required_balance = amount.checked_mul(price).ok_or_else(|| {
            LedgerError::InvalidRequest("withdrawal amount is too large".into())
        })?;
        let draft = WithdrawalDraft {
            amount,
            required_balance,
            destination_address: destination_address.to_string(),
            idempotency_key: idempotency_key.map(str::to_string),
        };

        let store = &self.store;
        let config = &self.config;
        let request = self
            .with_retry("request_withdrawal", move |now| {
                store.create_withdrawal(id, draft.clone(), config, now)
            })
            .await?;

        tracing::info!(
            account_id = %id,
            withdrawal_id = %request.id,
            amount = %request.amount,
            required_balance = %request.required_balance,
            "Withdrawal requested"
        );
        Ok(request)
    }

    /// Settle a pending withdrawal.
    ///
    /// # Errors
    ///
    /// - `LedgerError::WithdrawalNotFound` if the request does not exist.
    /// - `LedgerError::WithdrawalAlreadySettled` if it is already terminal.
    pub async fn settle_withdrawal(
        &self,
        id: WithdrawalId,
        outcome: WithdrawalOutcome,
        tx_hash: Option<String>,
        error_message: Option<String>,
    ) -> Result<WithdrawalRequest, LedgerError> {
        let store = &self.store;
        let request = self
            .with_retry("settle_withdrawal", move |now| {
                store.settle_withdrawal(id, outcome, tx_hash.clone(), error_message.clone(), now)
            })
            .await?;

        tracing::info!(
            withdrawal_id = %id,
            account_id = %request.account_id,
            status = %request.status,
            refunded = outcome.refunds(),
            "Withdrawal settled"
        );
        Ok(request)
    }

    /// List withdrawal requests, newest first.
    pub async fn list_withdrawals(
        &self,
        status: Option<WithdrawalStatus>,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<WithdrawalRequest>, LedgerError> {
        Ok(self
            .store
            .list_withdrawals(status, limit.min(MAX_PAGE_SIZE), offset)
            .await?)
    }

    /// List an account's withdrawal requests, newest first.
    pub async fn list_account_withdrawals(
        &self,
        id: AccountId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<WithdrawalRequest>, LedgerError> {
        Ok(self
            .store
            .list_account_withdrawals(id, limit.min(MAX_PAGE_SIZE), offset)
            .await?)
    }

    // =========================================================================
    // Reporting
    // =========================================================================

    /// Aggregate counters.
    pub async fn stats(&self) -> Result<LedgerStats, LedgerError> {
        Ok(self.store.stats(Utc::now()).await?)
    }

    /// The current TON quote.
    pub async fn price_quote(&self) -> PriceQuote {
        let ton_usd = self.oracle.ton_usd_price().await;
        let points_per_usd = self.oracle.points_per_usd();
        PriceQuote {
            ton_usd,
            ton_points: ton_usd * points_per_usd,
            points_per_usd,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    use async_trait::async_trait;
    use rust_decimal_macros::dec;
    use tap_earn_core::TapReceipt;
    use tap_earn_store::{MemoryStore, PackageActivation};

    use crate::oracle::FixedPriceOracle;

    fn ledger_over(store: Arc<dyn Store>) -> Ledger {
        Ledger::new(
            store,
            Arc::new(FixedPriceOracle::new(dec!(3.31), dec!(1000))),
            PackageCatalog::default(),
            LedgerConfig::default(),
        )
    }

    fn ledger() -> (Arc<MemoryStore>, Ledger) {
        let store = Arc::new(MemoryStore::new());
        let ledger = ledger_over(store.clone());
        (store, ledger)
    }

    async fn fund(ledger: &Ledger, id: i64, balance: Decimal) -> AccountId {
        let id = AccountId::new(id);
        let mut account = ledger.open_account(id, None).await.unwrap();
        account.balance = balance;
        ledger.store().put_account(&account).await.unwrap();
        id
    }

    #[tokio::test]
    async fn get_account_creates_and_values_balance() {
        let (_, ledger) = ledger();
        let id = fund(&ledger, 1, dec!(3310)).await;

        let profile = AccountProfile {
            username: Some("ana".into()),
            first_name: None,
        };
        let view = ledger.get_account(id, Some(&profile)).await.unwrap();
        assert_eq!(view.username.as_deref(), Some("ana"));
        assert_eq!(view.balance_usd, dec!(3.31));
        assert_eq!(view.balance_ton, dec!(1));
        assert_eq!(view.energy, 1000);
        assert!(view.can_withdraw);
    }

    #[tokio::test]
    async fn tap_reports_balance_and_energy() {
        let (_, ledger) = ledger();
        let result = ledger.tap(AccountId::new(2)).await.unwrap();
        assert_eq!(result.new_balance, dec!(0.05));
        assert_eq!(result.tap_value, dec!(0.05));
        assert_eq!(result.energy_remaining, Some(999));
    }

    #[tokio::test]
    async fn energy_runs_out_after_max_taps() {
        let (_, ledger) = ledger();
        let id = AccountId::new(3);
        for _ in 0..1000 {
            ledger.tap(id).await.unwrap();
        }
        assert_eq!(ledger.tap(id).await.unwrap_err(), LedgerError::EnergyExhausted);

        let view = ledger.get_account(id, None).await.unwrap();
        assert_eq!(view.balance, dec!(50));
        assert_eq!(view.total_taps, 1000);
    }

    #[tokio::test]
    async fn list_packages_prices_in_ton() {
        let (_, ledger) = ledger();
        let quotes = ledger.list_packages().await;
        assert_eq!(quotes.len(), 6);
        let starter = &quotes[0];
        assert_eq!(starter.package.id.as_str(), "starter");
        assert_eq!(starter.price_in_ton, Some((dec!(5) / dec!(3.31)).round_dp(9)));
    }

    #[tokio::test]
    async fn purchase_unknown_package() {
        let (_, ledger) = ledger();
        let err = ledger
            .purchase_package(AccountId::new(4), &"platinum".parse().unwrap(), "proof-1")
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::UnknownPackage { .. }));
    }

    #[tokio::test]
    async fn purchase_applies_package_once_per_proof() {
        let (_, ledger) = ledger();
        let id = AccountId::new(5);
        let starter: PackageId = "starter".parse().unwrap();

        let first = ledger.purchase_package(id, &starter, "proof-5").await.unwrap();
        assert!(!first.replayed);
        assert_eq!(first.account.tap_value, dec!(0.2));

        ledger.tap(id).await.unwrap();
        let replay = ledger.purchase_package(id, &starter, " proof-5 ").await.unwrap();
        assert!(replay.replayed);
        assert_eq!(replay.transaction_id, first.transaction_id);
        assert_eq!(replay.account.package_earnings, dec!(0.2));

        let other = ledger
            .purchase_package(AccountId::new(6), &starter, "proof-5")
            .await
            .unwrap_err();
        assert_eq!(other, LedgerError::PaymentProofReused);
    }

    #[tokio::test]
    async fn referral_links_once_and_lists() {
        let (_, ledger) = ledger();
        let referrer = fund(&ledger, 10, Decimal::ZERO).await;
        let new = AccountId::new(11);

        assert!(ledger.link_referral(new, referrer).await.unwrap());
        assert!(!ledger.link_referral(new, referrer).await.unwrap());
        assert!(!ledger.link_referral(referrer, referrer).await.unwrap());

        let view = ledger.get_account(referrer, None).await.unwrap();
        assert_eq!(view.balance, dec!(100));
        assert_eq!(view.referral_count, 1);

        let referrals = ledger.list_referrals(referrer).await.unwrap();
        assert_eq!(referrals.len(), 1);
        assert_eq!(referrals[0].account_id, new);
        assert_eq!(referrals[0].display_name, "Anonymous");
    }

    #[tokio::test]
    async fn withdrawal_round_trip() {
        let (_, ledger) = ledger();
        let id = fund(&ledger, 20, dec!(100)).await;

        let request = ledger
            .request_withdrawal(id, dec!(0.01), "UQ-dest", None)
            .await
            .unwrap();
        assert_eq!(request.required_balance, dec!(33.1));
        assert_eq!(request.status, WithdrawalStatus::Pending);

        let view = ledger.get_account(id, None).await.unwrap();
        assert_eq!(view.balance, dec!(66.9));
        assert!(!view.can_withdraw);
        assert_eq!(view.pending_withdrawal, Some(request.id));

        let second = ledger
            .request_withdrawal(id, dec!(0.01), "UQ-dest", None)
            .await
            .unwrap_err();
        assert!(matches!(second, LedgerError::WithdrawalAlreadyPending { .. }));

        let settled = ledger
            .settle_withdrawal(request.id, WithdrawalOutcome::Rejected, None, Some("bad address".into()))
            .await
            .unwrap();
        assert_eq!(settled.status, WithdrawalStatus::Rejected);

        let view = ledger.get_account(id, None).await.unwrap();
        assert_eq!(view.balance, dec!(100));
        assert_eq!(view.pending_withdrawal, None);

        // The cooldown started by the request survives the refund.
        let err = ledger
            .request_withdrawal(id, dec!(0.01), "UQ-dest", None)
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::OnCooldown { .. }));
    }

    #[tokio::test]
    async fn withdrawal_validates_input() {
        let (_, ledger) = ledger();
        let id = fund(&ledger, 21, dec!(100)).await;

        let err = ledger
            .request_withdrawal(id, dec!(0.009), "UQ-dest", None)
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::BelowMinimum { .. }));

        let err = ledger
            .request_withdrawal(id, dec!(0.01), "   ", None)
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::InvalidRequest(_)));

        let err = ledger
            .request_withdrawal(id, dec!(1), "UQ-dest", None)
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientBalance { .. }));
    }

    #[tokio::test]
    async fn oversized_withdrawal_is_rejected_without_overflow() {
        let (_, ledger) = ledger();
        let id = fund(&ledger, 23, dec!(100)).await;

        let err = ledger
            .request_withdrawal(id, Decimal::MAX, "UQ-dest", None)
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::InvalidRequest(_)));

        let view = ledger.get_account(id, None).await.unwrap();
        assert_eq!(view.balance, dec!(100));
        assert!(view.pending_withdrawal.is_none());
    }

    #[tokio::test]
    async fn withdrawal_idempotency_key_replays() {
        let (_, ledger) = ledger();
        let id = fund(&ledger, 22, dec!(100)).await;

        let first = ledger
            .request_withdrawal(id, dec!(0.01), "UQ-dest", Some("key-1"))
            .await
            .unwrap();
        let again = ledger
            .request_withdrawal(id, dec!(0.01), "UQ-dest", Some("key-1"))
            .await
            .unwrap();
        assert_eq!(first.id, again.id);

        let view = ledger.get_account(id, None).await.unwrap();
        assert_eq!(view.balance, dec!(66.9));
    }

    #[tokio::test]
    async fn transactions_page_has_more() {
        let (_, ledger) = ledger();
        let id = AccountId::new(30);
        for _ in 0..3 {
            ledger.tap(id).await.unwrap();
        }

        let page = ledger.list_transactions(id, 2, 0).await.unwrap();
        assert_eq!(page.transactions.len(), 2);
        assert!(page.has_more);

        let rest = ledger.list_transactions(id, 2, 2).await.unwrap();
        assert_eq!(rest.transactions.len(), 1);
        assert!(!rest.has_more);
    }

    #[tokio::test]
    async fn price_quote_in_points() {
        let (_, ledger) = ledger();
        let quote = ledger.price_quote().await;
        assert_eq!(quote.ton_usd, dec!(3.31));
        assert_eq!(quote.ton_points, dec!(3310));
    }

    // ========================================================================
    // Conflict retry
    // ========================================================================

    /// Fails the first `failures` taps with a conflict, then delegates.
    struct ConflictingStore {
        inner: MemoryStore,
        failures: AtomicU32,
    }

    impl ConflictingStore {
        fn new(failures: u32) -> Self {
            Self {
                inner: MemoryStore::new(),
                failures: AtomicU32::new(failures),
            }
        }
    }

    #[async_trait]
    impl Store for ConflictingStore {
        async fn get_account(&self, id: AccountId) -> tap_earn_store::Result<Option<Account>> {
            self.inner.get_account(id).await
        }

        async fn get_or_create_account(
            &self,
            id: AccountId,
            profile: Option<&AccountProfile>,
            config: &LedgerConfig,
            now: DateTime<Utc>,
        ) -> tap_earn_store::Result<Account> {
            self.inner.get_or_create_account(id, profile, config, now).await
        }

        async fn put_account(&self, account: &Account) -> tap_earn_store::Result<()> {
            self.inner.put_account(account).await
        }

        async fn list_referrals(&self, id: AccountId) -> tap_earn_store::Result<Vec<Account>> {
            self.inner.list_referrals(id).await
        }

        async fn list_transactions_by_account(
            &self,
            id: AccountId,
            limit: usize,
            offset: usize,
        ) -> tap_earn_store::Result<Vec<LedgerTransaction>> {
            self.inner.list_transactions_by_account(id, limit, offset).await
        }

        async fn get_withdrawal(
            &self,
            id: WithdrawalId,
        ) -> tap_earn_store::Result<Option<WithdrawalRequest>> {
            self.inner.get_withdrawal(id).await
        }

        async fn find_withdrawal_by_key(
            &self,
            account_id: AccountId,
            idempotency_key: &str,
        ) -> tap_earn_store::Result<Option<WithdrawalRequest>> {
            self.inner.find_withdrawal_by_key(account_id, idempotency_key).await
        }

        async fn list_withdrawals(
            &self,
            status: Option<WithdrawalStatus>,
            limit: usize,
            offset: usize,
        ) -> tap_earn_store::Result<Vec<WithdrawalRequest>> {
            self.inner.list_withdrawals(status, limit, offset).await
        }

        async fn list_account_withdrawals(
            &self,
            account_id: AccountId,
            limit: usize,
            offset: usize,
        ) -> tap_earn_store::Result<Vec<WithdrawalRequest>> {
            self.inner.list_account_withdrawals(account_id, limit, offset).await
        }

        async fn tap(
            &self,
            id: AccountId,
            config: &LedgerConfig,
            now: DateTime<Utc>,
        ) -> tap_earn_store::Result<TapReceipt> {
            let remaining = self.failures.load(Ordering::SeqCst);
            if remaining > 0 {
                self.failures.store(remaining - 1, Ordering::SeqCst);
                return Err(StoreError::Conflict);
            }
            self.inner.tap(id, config, now).await
        }

        async fn activate_package(
            &self,
            id: AccountId,
            package: &Package,
            payment_proof: &str,
            config: &LedgerConfig,
            now: DateTime<Utc>,
        ) -> tap_earn_store::Result<PackageActivation> {
            self.inner
                .activate_package(id, package, payment_proof, config, now)
                .await
        }

        async fn link_referral(
            &self,
            new_id: AccountId,
            referrer_id: AccountId,
            config: &LedgerConfig,
            now: DateTime<Utc>,
        ) -> tap_earn_store::Result<bool> {
            self.inner.link_referral(new_id, referrer_id, config, now).await
        }

        async fn create_withdrawal(
            &self,
            account_id: AccountId,
            draft: WithdrawalDraft,
            config: &LedgerConfig,
            now: DateTime<Utc>,
        ) -> tap_earn_store::Result<WithdrawalRequest> {
            self.inner.create_withdrawal(account_id, draft, config, now).await
        }

        async fn settle_withdrawal(
            &self,
            id: WithdrawalId,
            outcome: WithdrawalOutcome,
            tx_hash: Option<String>,
            error_message: Option<String>,
            now: DateTime<Utc>,
        ) -> tap_earn_store::Result<WithdrawalRequest> {
            self.inner
                .settle_withdrawal(id, outcome, tx_hash, error_message, now)
                .await
        }

        async fn stats(&self, now: DateTime<Utc>) -> tap_earn_store::Result<LedgerStats> {
            self.inner.stats(now).await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn conflicts_are_retried() {
        let ledger = ledger_over(Arc::new(ConflictingStore::new(2)));
        let result = ledger.tap(AccountId::new(40)).await.unwrap();
        assert_eq!(result.new_balance, dec!(0.05));
    }

    #[tokio::test(start_paused = true)]
    async fn persistent_conflict_surfaces() {
        let ledger = ledger_over(Arc::new(ConflictingStore::new(10)));
        let err = ledger.tap(AccountId::new(41)).await.unwrap_err();
        assert_eq!(err, LedgerError::PersistenceConflict);
        assert!(err.is_infrastructure());
    }
}
