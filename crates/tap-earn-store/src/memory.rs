//! In-memory storage implementation.
//!
//! This module provides the `MemoryStore` implementation of the `Store` trait.
//! Each account sits behind its own `tokio::sync::Mutex`; compound operations
//! hold the account lock for the whole read-modify-write. Two-account
//! operations lock in ascending id order. Side maps are always locked after
//! the account lock, never before.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use tokio::sync::{Mutex, RwLock};

use tap_earn_core::{
    Account, AccountId, AccountProfile, LedgerConfig, LedgerError, LedgerTransaction, Package,
    PackagePurchase, TapReceipt, WithdrawalDraft, WithdrawalId, WithdrawalOutcome,
    WithdrawalRequest, WithdrawalStatus,
};

use crate::error::{Result, StoreError};
use crate::{LedgerStats, PackageActivation, Store};

type AccountHandle = Arc<Mutex<Account>>;

/// In-memory storage implementation.
#[derive(Default)]
pub struct MemoryStore {
    accounts: RwLock<HashMap<AccountId, AccountHandle>>,
    transactions: Mutex<Vec<LedgerTransaction>>,
    withdrawals: RwLock<Vec<WithdrawalRequest>>,
    purchases: Mutex<HashMap<String, PackagePurchase>>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    async fn handle(&self, id: AccountId) -> Option<AccountHandle> {
        self.accounts.read().await.get(&id).cloned()
    }

    async fn handle_or_create(
        &self,
        id: AccountId,
        config: &LedgerConfig,
        now: DateTime<Utc>,
    ) -> AccountHandle {
        if let Some(handle) = self.handle(id).await {
            return handle;
        }

        let mut accounts = self.accounts.write().await;
        let handle = accounts.entry(id).or_insert_with(|| {
            tracing::info!(account_id = %id, "account created");
            Arc::new(Mutex::new(Account::new(id, config, now)))
        });
        Arc::clone(handle)
    }

    async fn snapshot(&self) -> Vec<Account> {
        let handles: Vec<_> = self.accounts.read().await.values().cloned().collect();
        let mut accounts = Vec::with_capacity(handles.len());
        for handle in handles {
            accounts.push(handle.lock().await.clone());
        }
        accounts
    }

    async fn append(&self, transaction: LedgerTransaction) {
        self.transactions.lock().await.push(transaction);
    }
}

fn page<T>(items: impl Iterator<Item = T>, limit: usize, offset: usize) -> Vec<T> {
    items.skip(offset).take(limit).collect()
}

#[async_trait]
impl Store for MemoryStore {
    // =========================================================================
    // Account Operations
    // =========================================================================

    async fn get_account(&self, id: AccountId) -> Result<Option<Account>> {
        match self.handle(id).await {
            Some(handle) => Ok(Some(handle.lock().await.clone())),
            None => Ok(None),
        }
    }

    async fn get_or_create_account(
        &self,
        id: AccountId,
        profile: Option<&AccountProfile>,
        config: &LedgerConfig,
        now: DateTime<Utc>,
    ) -> Result<Account> {
        let handle = self.handle_or_create(id, config, now).await;
        let mut account = handle.lock().await;
        account.touch(profile, now);
        account.apply_energy_reset_if_due(now);
        Ok(account.clone())
    }

    async fn put_account(&self, account: &Account) -> Result<()> {
        let mut accounts = self.accounts.write().await;
        match accounts.get(&account.id) {
            Some(handle) => *handle.lock().await = account.clone(),
            None => {
                accounts.insert(account.id, Arc::new(Mutex::new(account.clone())));
            }
        }
        Ok(())
    }

    async fn list_referrals(&self, id: AccountId) -> Result<Vec<Account>> {
        let mut referrals: Vec<_> = self
            .snapshot()
            .await
            .into_iter()
            .filter(|account| account.referrer_id == Some(id))
            .collect();
        referrals.sort_by_key(|account| account.created_at);
        Ok(referrals)
    }

    // =========================================================================
    // Transaction Operations
    // =========================================================================

    async fn list_transactions_by_account(
        &self,
        id: AccountId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<LedgerTransaction>> {
        let transactions = self.transactions.lock().await;
        Ok(page(
            transactions.iter().rev().filter(|tx| tx.account_id == id).cloned(),
            limit,
            offset,
        ))
    }

    // =========================================================================
    // Withdrawal Operations
    // =========================================================================

    async fn get_withdrawal(&self, id: WithdrawalId) -> Result<Option<WithdrawalRequest>> {
        let withdrawals = self.withdrawals.read().await;
        Ok(withdrawals.iter().find(|w| w.id == id).cloned())
    }

    async fn find_withdrawal_by_key(
        &self,
        account_id: AccountId,
        idempotency_key: &str,
    ) -> Result<Option<WithdrawalRequest>> {
        let withdrawals = self.withdrawals.read().await;
        Ok(withdrawals
            .iter()
            .find(|w| {
                w.account_id == account_id && w.idempotency_key.as_deref() == Some(idempotency_key)
            })
            .cloned())
    }

    async fn list_withdrawals(
        &self,
        status: Option<WithdrawalStatus>,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<WithdrawalRequest>> {
        let withdrawals = self.withdrawals.read().await;
        Ok(page(
            withdrawals
                .iter()
                .rev()
                .filter(|w| status.map_or(true, |s| w.status == s))
                .cloned(),
            limit,
            offset,
        ))
    }

    async fn list_account_withdrawals(
        &self,
        account_id: AccountId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<WithdrawalRequest>> {
        let withdrawals = self.withdrawals.read().await;
        Ok(page(
            withdrawals
                .iter()
                .rev()
                .filter(|w| w.account_id == account_id)
                .cloned(),
            limit,
            offset,
        ))
    }

    // =========================================================================
    // Compound Operations
    // =========================================================================

    async fn tap(
        &self,
        id: AccountId,
        config: &LedgerConfig,
        now: DateTime<Utc>,
    ) -> Result<TapReceipt> {
        let handle = self.handle_or_create(id, config, now).await;
        let mut guard = handle.lock().await;

        let mut account = guard.clone();
        let transaction = account.tap(now)?;

        *guard = account.clone();
        self.append(transaction.clone()).await;

        Ok(TapReceipt {
            account,
            transaction,
        })
    }

    async fn activate_package(
        &self,
        id: AccountId,
        package: &Package,
        payment_proof: &str,
        config: &LedgerConfig,
        now: DateTime<Utc>,
    ) -> Result<PackageActivation> {
        if payment_proof.trim().is_empty() {
            return Err(LedgerError::InvalidRequest("payment proof is required".into()).into());
        }

        let handle = self.handle_or_create(id, config, now).await;
        let mut guard = handle.lock().await;
        let mut purchases = self.purchases.lock().await;

        if let Some(existing) = purchases.get(payment_proof) {
            if existing.account_id != id {
                return Err(LedgerError::PaymentProofReused.into());
            }
            return Ok(PackageActivation {
                account: guard.clone(),
                purchase: existing.clone(),
                replayed: true,
            });
        }

        let mut account = guard.clone();
        let transaction = account.activate_package(package, payment_proof, now);
        let purchase = PackagePurchase::new(package, payment_proof, &transaction);

        purchases.insert(purchase.payment_proof.clone(), purchase.clone());
        drop(purchases);
        *guard = account.clone();
        self.append(transaction).await;

        Ok(PackageActivation {
            account,
            purchase,
            replayed: false,
        })
    }

    async fn link_referral(
        &self,
        new_id: AccountId,
        referrer_id: AccountId,
        config: &LedgerConfig,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        if new_id == referrer_id {
            return Ok(false);
        }
        let Some(referrer_handle) = self.handle(referrer_id).await else {
            return Ok(false);
        };
        let new_handle = self.handle_or_create(new_id, config, now).await;

        // Lock in ascending id order.
        let (mut new_account, mut referrer) = if new_id < referrer_id {
            let new_account = new_handle.lock().await;
            let referrer = referrer_handle.lock().await;
            (new_account, referrer)
        } else {
            let referrer = referrer_handle.lock().await;
            let new_account = new_handle.lock().await;
            (new_account, referrer)
        };

        if !new_account.accept_referrer(referrer_id, now) {
            return Ok(false);
        }
        let transaction = referrer.credit_referral_bonus(new_id, config.referral_bonus, now);
        self.append(transaction).await;

        Ok(true)
    }

    async fn create_withdrawal(
        &self,
        account_id: AccountId,
        draft: WithdrawalDraft,
        config: &LedgerConfig,
        now: DateTime<Utc>,
    ) -> Result<WithdrawalRequest> {
        let handle = self
            .handle(account_id)
            .await
            .ok_or(LedgerError::AccountNotFound { account_id })?;
        let mut guard = handle.lock().await;
        let mut withdrawals = self.withdrawals.write().await;

        if let Some(key) = draft.idempotency_key.as_deref() {
            let existing = withdrawals
                .iter()
                .find(|w| w.account_id == account_id && w.idempotency_key.as_deref() == Some(key));
            if let Some(existing) = existing {
                return Ok(existing.clone());
            }
        }

        let mut account = guard.clone();
        let (request, transaction) =
            account.reserve_withdrawal(draft, config.withdrawal_cooldown(), now)?;

        withdrawals.push(request.clone());
        drop(withdrawals);
        *guard = account;
        self.append(transaction).await;

        Ok(request)
    }

    async fn settle_withdrawal(
        &self,
        id: WithdrawalId,
        outcome: WithdrawalOutcome,
        tx_hash: Option<String>,
        error_message: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<WithdrawalRequest> {
        let account_id = self
            .get_withdrawal(id)
            .await?
            .map(|w| w.account_id)
            .ok_or(LedgerError::WithdrawalNotFound { withdrawal_id: id })?;
        let handle = self
            .handle(account_id)
            .await
            .ok_or_else(|| StoreError::not_found("account", account_id))?;

        let mut guard = handle.lock().await;
        let mut withdrawals = self.withdrawals.write().await;
        let stored = withdrawals
            .iter_mut()
            .find(|w| w.id == id)
            .ok_or(LedgerError::WithdrawalNotFound { withdrawal_id: id })?;

        let mut request = stored.clone();
        request.settle(outcome, tx_hash, error_message, now)?;

        let mut account = guard.clone();
        let refund = account.release_withdrawal(&request, outcome, now);

        *stored = request.clone();
        drop(withdrawals);
        *guard = account;
        if let Some(refund) = refund {
            self.append(refund).await;
        }

        Ok(request)
    }

    // =========================================================================
    // Reporting
    // =========================================================================

    async fn stats(&self, now: DateTime<Utc>) -> Result<LedgerStats> {
        let accounts = self.snapshot().await;
        let since = now - Duration::hours(24);
        let pending = self
            .withdrawals
            .read()
            .await
            .iter()
            .filter(|w| w.status == WithdrawalStatus::Pending)
            .count();

        Ok(LedgerStats {
            total_accounts: i64::try_from(accounts.len()).unwrap_or(i64::MAX),
            new_accounts_24h: i64::try_from(accounts.iter().filter(|a| a.created_at >= since).count())
                .unwrap_or(i64::MAX),
            total_balance: accounts.iter().map(|a| a.balance).sum::<Decimal>(),
            total_taps: accounts.iter().map(|a| a.total_taps).sum(),
            pending_withdrawals: i64::try_from(pending).unwrap_or(i64::MAX),
        })
    }
}
