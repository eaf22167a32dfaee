//! Account types and the per-account ledger rules.
//!
//! Storage backends load an [`Account`], call one of the rule methods below
//! while holding the account's lock, and persist the mutated account together
//! with the transaction the rule returns. When a rule fails the backend
//! persists nothing.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{LedgerError, Result};
use crate::ids::{AccountId, PackageId, WithdrawalId};
use crate::package::Package;
use crate::transaction::LedgerTransaction;
use crate::withdrawal::{WithdrawalDraft, WithdrawalOutcome, WithdrawalRequest};
use crate::LedgerConfig;

/// Profile fields supplied by the identity provider on each contact.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountProfile {
    /// Telegram username.
    pub username: Option<String>,

    /// Telegram first name.
    pub first_name: Option<String>,
}

/// A tap-earn account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    /// The external user id.
    pub id: AccountId,

    /// Telegram username, if known.
    pub username: Option<String>,

    /// Telegram first name, if known.
    pub first_name: Option<String>,

    /// Spendable points. Never negative.
    pub balance: Decimal,

    /// Taps left today.
    pub energy: i32,

    /// Energy restored by the daily reset.
    pub max_energy: i32,

    /// Lifetime tap count.
    pub total_taps: i64,

    /// Points credited per tap.
    pub tap_value: Decimal,

    /// Active package, if any.
    pub active_package: Option<PackageId>,

    /// Points earned under the active package.
    pub package_earnings: Decimal,

    /// Earnings cap of the active package. Zero or negative means no cap.
    pub max_package_earnings: Decimal,

    /// Whether taps consume energy.
    pub unlimited_taps: bool,

    /// Who referred this account. Set at most once.
    pub referrer_id: Option<AccountId>,

    /// Number of accounts this account referred.
    pub referral_count: i64,

    /// Withdrawals are rejected until this instant.
    pub withdrawal_cooldown_until: Option<DateTime<Utc>>,

    /// The pending withdrawal, if one exists.
    pub pending_withdrawal: Option<WithdrawalId>,

    /// Last daily energy reset.
    pub last_energy_reset_at: DateTime<Utc>,

    /// When the account was created.
    pub created_at: DateTime<Utc>,

    /// Last contact from the user.
    pub last_seen_at: DateTime<Utc>,

    /// When the account was last updated.
    pub updated_at: DateTime<Utc>,
}

/// Result of a successful tap.
#[derive(Debug, Clone, PartialEq)]
pub struct TapReceipt {
    /// The account after the tap.
    pub account: Account,

    /// The `tap` transaction.
    pub transaction: LedgerTransaction,
}

impl Account {
    /// Create a new account with zero balance and full energy.
    #[must_use]
    pub fn new(id: AccountId, config: &LedgerConfig, now: DateTime<Utc>) -> Self {
        Self {
            id,
            username: None,
            first_name: None,
            balance: Decimal::ZERO,
            energy: config.max_energy,
            max_energy: config.max_energy,
            total_taps: 0,
            tap_value: config.base_tap_value,
            active_package: None,
            package_earnings: Decimal::ZERO,
            max_package_earnings: Decimal::ZERO,
            unlimited_taps: false,
            referrer_id: None,
            referral_count: 0,
            withdrawal_cooldown_until: None,
            pending_withdrawal: None,
            last_energy_reset_at: now,
            created_at: now,
            last_seen_at: now,
            updated_at: now,
        }
    }

    /// Record a contact from the user, refreshing profile fields when given.
    pub fn touch(&mut self, profile: Option<&AccountProfile>, now: DateTime<Utc>) {
        if let Some(profile) = profile {
            if profile.username.is_some() {
                self.username.clone_from(&profile.username);
            }
            if profile.first_name.is_some() {
                self.first_name.clone_from(&profile.first_name);
            }
        }
        self.last_seen_at = now;
    }

    /// Name to show in referral lists.
    #[must_use]
    pub fn display_name(&self) -> &str {
        self.username
            .as_deref()
            .or(self.first_name.as_deref())
            .unwrap_or("Anonymous")
    }

    // =========================================================================
    // Energy
    // =========================================================================

    /// Whether a new UTC day started since the last energy reset.
    #[must_use]
    pub fn energy_reset_due(&self, now: DateTime<Utc>) -> bool {
        now.date_naive() > self.last_energy_reset_at.date_naive()
    }

    /// Refill energy once per UTC calendar day.
    ///
    /// Returns `true` if a reset was applied. Accounts with unlimited taps only
    /// have their reset date advanced.
    pub fn apply_energy_reset_if_due(&mut self, now: DateTime<Utc>) -> bool {
        if !self.energy_reset_due(now) {
            return false;
        }
        if !self.unlimited_taps {
            self.energy = self.max_energy;
        }
        self.last_energy_reset_at = now;
        self.updated_at = now;
        true
    }

    /// Energy left today, `None` when taps are unlimited.
    #[must_use]
    pub const fn energy_remaining(&self) -> Option<i32> {
        if self.unlimited_taps {
            None
        } else {
            Some(self.energy)
        }
    }

    // =========================================================================
    // Taps
    // =========================================================================

    /// Whether the active package caps tap earnings.
    #[must_use]
    pub fn is_package_capped(&self) -> bool {
        self.active_package.is_some() && self.max_package_earnings > Decimal::ZERO
    }

    /// Apply a single tap.
    ///
    /// Applies a due energy reset first, then credits `tap_value`, or less on
    /// the tap that reaches the package cap.
    ///
    /// # Errors
    ///
    /// - `LedgerError::EnergyExhausted` if no energy is left today.
    /// - `LedgerError::PackageCapReached` if the active package has paid out
    ///   its cap.
    pub fn tap(&mut self, now: DateTime<Utc>) -> Result<LedgerTransaction> {
        self.apply_energy_reset_if_due(now);

        if !self.unlimited_taps && self.energy <= 0 {
            return Err(LedgerError::EnergyExhausted);
        }
        if self.is_package_capped() && self.package_earnings >= self.max_package_earnings {
            return Err(LedgerError::PackageCapReached {
                earned: self.package_earnings,
                cap: self.max_package_earnings,
            });
        }

        // The last capped tap pays only the remaining headroom.
        let credit = if self.is_package_capped() {
            self.tap_value
                .min(self.max_package_earnings - self.package_earnings)
        } else {
            self.tap_value
        };

        self.balance += credit;
        if self.active_package.is_some() {
            self.package_earnings += credit;
        }
        self.total_taps += 1;
        if !self.unlimited_taps {
            self.energy -= 1;
        }
        self.updated_at = now;

        Ok(LedgerTransaction::tap(self.id, credit, self.balance, now))
    }

    // =========================================================================
    // Packages
    // =========================================================================

    /// Activate a package, replacing any active one.
    ///
    /// Earnings under the previous package and its remaining headroom are
    /// discarded. The balance is untouched.
    pub fn activate_package(
        &mut self,
        package: &Package,
        payment_proof: &str,
        now: DateTime<Utc>,
    ) -> LedgerTransaction {
        self.active_package = Some(package.id.clone());
        self.tap_value = package.tap_value;
        self.max_package_earnings = package.max_earnings;
        self.package_earnings = Decimal::ZERO;
        self.unlimited_taps = package.unlimited_taps;
        self.updated_at = now;

        LedgerTransaction::package_purchase(self.id, package, payment_proof, self.balance, now)
    }

    // =========================================================================
    // Referrals
    // =========================================================================

    /// Whether this account can still be linked to `referrer`.
    #[must_use]
    pub fn can_be_referred_by(&self, referrer: AccountId) -> bool {
        self.referrer_id.is_none() && self.id != referrer
    }

    /// Link this account to its referrer. First write wins.
    ///
    /// Returns `false` without changes if the link is not allowed.
    pub fn accept_referrer(&mut self, referrer: AccountId, now: DateTime<Utc>) -> bool {
        if !self.can_be_referred_by(referrer) {
            return false;
        }
        self.referrer_id = Some(referrer);
        self.updated_at = now;
        true
    }

    /// Credit the referral bonus to this (referrer) account.
    pub fn credit_referral_bonus(
        &mut self,
        referred: AccountId,
        bonus: Decimal,
        now: DateTime<Utc>,
    ) -> LedgerTransaction {
        self.balance += bonus;
        self.referral_count += 1;
        self.updated_at = now;

        LedgerTransaction::referral_bonus(self.id, referred, bonus, self.balance, now)
    }

    // =========================================================================
    // Withdrawals
    // =========================================================================

    /// Whether the withdrawal cooldown is still running.
    #[must_use]
    pub fn cooldown_active(&self, now: DateTime<Utc>) -> bool {
        self.withdrawal_cooldown_until
            .is_some_and(|until| now < until)
    }

    /// Check whether a withdrawal reserving `required` points may proceed.
    ///
    /// # Errors
    ///
    /// - `LedgerError::WithdrawalAlreadyPending` if a request is pending.
    /// - `LedgerError::OnCooldown` if the cooldown is running.
    /// - `LedgerError::InsufficientBalance` if the balance is too low.
    pub fn check_withdrawal(&self, required: Decimal, now: DateTime<Utc>) -> Result<()> {
        if let Some(withdrawal_id) = self.pending_withdrawal {
            return Err(LedgerError::WithdrawalAlreadyPending { withdrawal_id });
        }
        if let Some(until) = self.withdrawal_cooldown_until.filter(|until| now < *until) {
            return Err(LedgerError::OnCooldown { until });
        }
        if required <= Decimal::ZERO {
            return Err(LedgerError::InvalidRequest(
                "withdrawal must reserve a positive balance".into(),
            ));
        }
        if self.balance < required {
            return Err(LedgerError::InsufficientBalance {
                balance: self.balance,
                required,
            });
        }
        Ok(())
    }

    /// Reserve the points for a withdrawal and start the cooldown.
    ///
    /// # Errors
    ///
    /// Same as [`Account::check_withdrawal`].
    pub fn reserve_withdrawal(
        &mut self,
        draft: WithdrawalDraft,
        cooldown: Duration,
        now: DateTime<Utc>,
    ) -> Result<(WithdrawalRequest, LedgerTransaction)> {
        self.check_withdrawal(draft.required_balance, now)?;

        let withdrawal_id = WithdrawalId::generate();
        let required = draft.required_balance;

        self.balance -= required;
        self.withdrawal_cooldown_until = Some(now + cooldown);
        self.pending_withdrawal = Some(withdrawal_id);
        self.updated_at = now;

        let request = WithdrawalRequest::pending(withdrawal_id, self.id, draft, now);
        let transaction =
            LedgerTransaction::withdrawal_request(self.id, withdrawal_id, required, self.balance, now);
        Ok((request, transaction))
    }

    /// Release a settled withdrawal, refunding the reservation on failure or
    /// rejection.
    ///
    /// Returns the `withdrawal_refund` transaction when points were returned.
    pub fn release_withdrawal(
        &mut self,
        request: &WithdrawalRequest,
        outcome: WithdrawalOutcome,
        now: DateTime<Utc>,
    ) -> Option<LedgerTransaction> {
        if self.pending_withdrawal == Some(request.id) {
            self.pending_withdrawal = None;
        }
        self.updated_at = now;

        if !outcome.refunds() {
            return None;
        }

        self.balance += request.required_balance;
        let reason = request
            .error_message
            .as_deref()
            .unwrap_or(outcome.status().as_str());
        Some(LedgerTransaction::withdrawal_refund(
            self.id,
            request.id,
            request.required_balance,
            self.balance,
            reason,
            now,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{PackageCatalog, TransactionType};
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn at(day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, day, hour, 0, 0).unwrap()
    }

    fn account() -> Account {
        Account::new(AccountId::new(100), &LedgerConfig::default(), at(1, 8))
    }

    fn package(id: &str) -> Package {
        PackageCatalog::default()
            .get(&id.parse().unwrap())
            .unwrap()
            .clone()
    }

    fn draft(required: Decimal) -> WithdrawalDraft {
        WithdrawalDraft {
            amount: dec!(0.01),
            required_balance: required,
            destination_address: "UQ-wallet".into(),
            idempotency_key: None,
        }
    }

    #[test]
    fn new_account_defaults() {
        let account = account();
        assert_eq!(account.balance, Decimal::ZERO);
        assert_eq!(account.energy, 1000);
        assert_eq!(account.tap_value, dec!(0.05));
        assert!(account.active_package.is_none());
        assert!(account.referrer_id.is_none());
    }

    #[test]
    fn energy_runs_out_after_max_energy_taps() {
        let mut account = account();
        let now = at(1, 9);
        for _ in 0..1000 {
            account.tap(now).unwrap();
        }
        assert_eq!(account.balance, dec!(50));
        assert_eq!(account.energy, 0);
        assert_eq!(account.total_taps, 1000);

        let before = account.clone();
        assert_eq!(account.tap(now).unwrap_err(), LedgerError::EnergyExhausted);
        assert_eq!(account, before);
    }

    #[test]
    fn energy_resets_once_per_utc_day() {
        let mut account = account();
        account.energy = 0;

        assert!(!account.apply_energy_reset_if_due(at(1, 23)));
        assert_eq!(account.energy, 0);

        assert!(account.apply_energy_reset_if_due(at(2, 0)));
        assert_eq!(account.energy, 1000);

        account.energy = 10;
        assert!(!account.apply_energy_reset_if_due(at(2, 18)));
        assert_eq!(account.energy, 10);
    }

    #[test]
    fn tap_applies_due_reset_first() {
        let mut account = account();
        account.energy = 0;
        let tx = account.tap(at(2, 7)).unwrap();
        assert_eq!(account.energy, 999);
        assert_eq!(tx.transaction_type, TransactionType::Tap);
        assert_eq!(tx.amount, dec!(0.05));
    }

    #[test]
    fn package_cap_stops_taps() {
        let mut account = account();
        account.activate_package(&package("starter"), "proof", at(1, 9));
        account.package_earnings = dec!(9999.8);

        account.tap(at(1, 10)).unwrap();
        assert_eq!(account.package_earnings, dec!(10000.0));

        let err = account.tap(at(1, 10)).unwrap_err();
        assert!(matches!(err, LedgerError::PackageCapReached { .. }));
    }

    #[test]
    fn starter_package_pays_out_exactly_its_cap() {
        let mut account = account();
        account.activate_package(&package("starter"), "proof", at(1, 9));

        let mut taps = 0;
        let err = loop {
            if account.energy == 0 {
                account.energy = account.max_energy;
            }
            match account.tap(at(1, 10)) {
                Ok(_) => taps += 1,
                Err(err) => break err,
            }
        };

        assert_eq!(taps, 50_000);
        assert!(matches!(err, LedgerError::PackageCapReached { .. }));
        assert_eq!(account.package_earnings, dec!(10000));
        assert_eq!(account.balance, dec!(10000));
    }

    #[test]
    fn last_capped_tap_credits_only_the_headroom() {
        let catalog = PackageCatalog::from_json(
            r#"[{"id":"odd","name":"Odd","price":"1","tap_value":"3","max_earnings":"10","unlimited_taps":true}]"#,
        )
        .unwrap();
        let odd = catalog.get(&"odd".parse().unwrap()).unwrap().clone();

        let mut account = account();
        account.activate_package(&odd, "proof", at(1, 9));

        let amounts: Vec<Decimal> = (0..4)
            .map(|_| account.tap(at(1, 10)).unwrap().amount)
            .collect();
        assert_eq!(amounts, vec![dec!(3), dec!(3), dec!(3), dec!(1)]);
        assert_eq!(account.package_earnings, dec!(10));
        assert_eq!(account.balance, dec!(10));

        let err = account.tap(at(1, 10)).unwrap_err();
        assert!(matches!(err, LedgerError::PackageCapReached { .. }));
        assert!(account.package_earnings <= account.max_package_earnings);
    }

    #[test]
    fn unlimited_package_never_consumes_energy() {
        let mut account = account();
        account.activate_package(&package("unlimited"), "proof", at(1, 9));
        account.energy = 0;

        for _ in 0..5 {
            account.tap(at(1, 10)).unwrap();
        }
        assert_eq!(account.energy, 0);
        assert_eq!(account.balance, dec!(5));
        assert_eq!(account.energy_remaining(), None);
    }

    #[test]
    fn activating_package_resets_earnings() {
        let mut account = account();
        account.balance = dec!(42);
        account.activate_package(&package("gold"), "p1", at(1, 9));
        account.package_earnings = dec!(500);

        let tx = account.activate_package(&package("silver"), "p2", at(1, 10));
        assert_eq!(account.package_earnings, Decimal::ZERO);
        assert_eq!(account.tap_value, dec!(0.5));
        assert_eq!(account.max_package_earnings, dec!(100000));
        assert_eq!(account.balance, dec!(42));
        assert_eq!(tx.amount, dec!(-50));
    }

    #[test]
    fn referrer_is_set_once() {
        let mut account = account();
        assert!(!account.accept_referrer(account.id, at(1, 9)));
        assert!(account.accept_referrer(AccountId::new(5), at(1, 9)));
        assert!(!account.accept_referrer(AccountId::new(6), at(1, 9)));
        assert_eq!(account.referrer_id, Some(AccountId::new(5)));
    }

    #[test]
    fn withdrawal_reserve_and_refund_are_symmetric() {
        let mut account = account();
        account.balance = dec!(100);
        let now = at(1, 9);

        let (request, tx) = account
            .reserve_withdrawal(draft(dec!(33.1)), Duration::days(59), now)
            .unwrap();
        assert_eq!(account.balance, dec!(66.9));
        assert_eq!(tx.amount, dec!(-33.1));
        assert_eq!(account.pending_withdrawal, Some(request.id));
        assert_eq!(account.withdrawal_cooldown_until, Some(now + Duration::days(59)));

        let refund = account
            .release_withdrawal(&request, WithdrawalOutcome::Rejected, now)
            .unwrap();
        assert_eq!(account.balance, dec!(100));
        assert_eq!(refund.amount, dec!(33.1));
        assert!(account.pending_withdrawal.is_none());
    }

    #[test]
    fn completed_withdrawal_keeps_debit() {
        let mut account = account();
        account.balance = dec!(100);
        let (request, _) = account
            .reserve_withdrawal(draft(dec!(40)), Duration::days(59), at(1, 9))
            .unwrap();
        assert!(account
            .release_withdrawal(&request, WithdrawalOutcome::Completed, at(1, 10))
            .is_none());
        assert_eq!(account.balance, dec!(60));
    }

    #[test]
    fn withdrawal_checks() {
        let mut account = account();
        account.balance = dec!(10);
        let now = at(1, 9);

        assert!(matches!(
            account.check_withdrawal(dec!(11), now),
            Err(LedgerError::InsufficientBalance { .. })
        ));

        account.withdrawal_cooldown_until = Some(at(3, 0));
        assert!(matches!(
            account.check_withdrawal(dec!(1), now),
            Err(LedgerError::OnCooldown { .. })
        ));
        assert!(account.check_withdrawal(dec!(1), at(3, 0)).is_ok());

        account.pending_withdrawal = Some(WithdrawalId::generate());
        assert!(matches!(
            account.check_withdrawal(dec!(1), at(3, 0)),
            Err(LedgerError::WithdrawalAlreadyPending { .. })
        ));
    }
}
