//! Ledger transaction types for tap-earn.
//!
//! Every balance-relevant event appends one immutable transaction record.
//! Transactions are an audit trail; balances are read from the account row.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{AccountId, Package, TransactionId, WithdrawalId};

/// An append-only audit record of a balance-relevant event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerTransaction {
    /// Unique transaction ID (ULID for time-ordering).
    pub id: TransactionId,

    /// The account the event belongs to.
    pub account_id: AccountId,

    /// Type of transaction.
    pub transaction_type: TransactionType,

    /// Signed amount in points. Positive = credit, negative = debit.
    pub amount: Decimal,

    /// Balance after this transaction (in points).
    pub balance_after: Decimal,

    /// Human-readable description.
    pub description: String,

    /// Additional context (package id, withdrawal id, referral source).
    pub metadata: serde_json::Value,

    /// When the transaction was created.
    pub created_at: DateTime<Utc>,
}

impl LedgerTransaction {
    fn new(
        account_id: AccountId,
        transaction_type: TransactionType,
        amount: Decimal,
        balance_after: Decimal,
        description: String,
        metadata: serde_json::Value,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: TransactionId::generate(),
            account_id,
            transaction_type,
            amount,
            balance_after,
            description,
            metadata,
            created_at,
        }
    }

    /// Create a tap credit.
    #[must_use]
    pub fn tap(
        account_id: AccountId,
        tap_value: Decimal,
        balance_after: Decimal,
        now: DateTime<Utc>,
    ) -> Self {
        Self::new(
            account_id,
            TransactionType::Tap,
            tap_value,
            balance_after,
            "Tap".to_string(),
            serde_json::Value::Null,
            now,
        )
    }

    /// Create a referral bonus credit on the referrer's account.
    #[must_use]
    pub fn referral_bonus(
        referrer_id: AccountId,
        referred_id: AccountId,
        bonus: Decimal,
        balance_after: Decimal,
        now: DateTime<Utc>,
    ) -> Self {
        Self::new(
            referrer_id,
            TransactionType::ReferralBonus,
            bonus,
            balance_after,
            format!("Referral bonus for inviting {referred_id}"),
            serde_json::json!({ "referred_id": referred_id }),
            now,
        )
    }

    /// Create a package purchase audit record.
    ///
    /// The amount is the negated package price for audit; the balance is
    /// untouched because packages are paid for outside the ledger.
    #[must_use]
    pub fn package_purchase(
        account_id: AccountId,
        package: &Package,
        payment_proof: &str,
        balance_after: Decimal,
        now: DateTime<Utc>,
    ) -> Self {
        Self::new(
            account_id,
            TransactionType::PackagePurchase,
            -package.price,
            balance_after,
            format!("{} package activated", package.name),
            serde_json::json!({
                "package_id": package.id,
                "payment_proof": payment_proof,
            }),
            now,
        )
    }

    /// Create a withdrawal reservation debit.
    #[must_use]
    pub fn withdrawal_request(
        account_id: AccountId,
        withdrawal_id: WithdrawalId,
        required_balance: Decimal,
        balance_after: Decimal,
        now: DateTime<Utc>,
    ) -> Self {
        Self::new(
            account_id,
            TransactionType::WithdrawalRequest,
            -required_balance.abs(), // Always negative for withdrawals
            balance_after,
            format!("Withdrawal {withdrawal_id} requested"),
            serde_json::json!({ "withdrawal_id": withdrawal_id }),
            now,
        )
    }

    /// Create a refund of a failed or rejected withdrawal.
    #[must_use]
    pub fn withdrawal_refund(
        account_id: AccountId,
        withdrawal_id: WithdrawalId,
        amount: Decimal,
        balance_after: Decimal,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Self {
        Self::new(
            account_id,
            TransactionType::WithdrawalRefund,
            amount,
            balance_after,
            format!("Withdrawal {withdrawal_id} refunded: {reason}"),
            serde_json::json!({ "withdrawal_id": withdrawal_id }),
            now,
        )
    }
}

/// Type of ledger transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    /// Points earned by tapping.
    Tap,

    /// Bonus for referring a new account.
    ReferralBonus,

    /// Package activation (audit only).
    PackagePurchase,

    /// Points reserved by a withdrawal request.
    WithdrawalRequest,

    /// Points returned after a failed or rejected withdrawal.
    WithdrawalRefund,
}

impl TransactionType {
    /// Storage and wire name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Tap => "tap",
            Self::ReferralBonus => "referral_bonus",
            Self::PackagePurchase => "package_purchase",
            Self::WithdrawalRequest => "withdrawal_request",
            Self::WithdrawalRefund => "withdrawal_refund",
        }
    }

    /// Parse a storage name.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "tap" => Some(Self::Tap),
            "referral_bonus" => Some(Self::ReferralBonus),
            "package_purchase" => Some(Self::PackagePurchase),
            "withdrawal_request" => Some(Self::WithdrawalRequest),
            "withdrawal_refund" => Some(Self::WithdrawalRefund),
            _ => None,
        }
    }

    /// Check if this transaction type adds points to the balance.
    #[must_use]
    pub const fn is_credit(&self) -> bool {
        matches!(
            self,
            Self::Tap | Self::ReferralBonus | Self::WithdrawalRefund
        )
    }

    /// Check if this transaction type removes points from the balance.
    #[must_use]
    pub const fn is_debit(&self) -> bool {
        matches!(self, Self::WithdrawalRequest)
    }
}
