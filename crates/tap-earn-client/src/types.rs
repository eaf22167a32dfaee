//! Request and response types for the tap-earn API.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use tap_earn_core::{AccountId, Package, PackageId, TransactionId, WithdrawalId, WithdrawalStatus};

// =============================================================================
// Accounts
// =============================================================================

/// An account as shown to its owner.
#[derive(Debug, Clone, Deserialize)]
pub struct AccountResponse {
    /// Telegram user id.
    pub id: AccountId,
    /// Telegram username.
    pub username: Option<String>,
    /// Telegram first name.
    pub first_name: Option<String>,
    /// Balance in points.
    pub balance: Decimal,
    /// Balance in US dollars.
    pub balance_usd: Decimal,
    /// Balance in TON at the current quote.
    pub balance_ton: Decimal,
    /// Energy left today.
    pub energy: i32,
    /// Daily energy allowance.
    pub max_energy: i32,
    /// Whether taps are free of energy.
    pub unlimited_taps: bool,
    /// Points per tap.
    pub tap_value: Decimal,
    /// Lifetime taps.
    pub total_taps: i64,
    /// Active package, if any.
    pub active_package: Option<PackageId>,
    /// Points earned under the active package.
    pub package_earnings: Decimal,
    /// Earnings cap of the active package.
    pub max_package_earnings: Decimal,
    /// Who referred this account.
    pub referrer_id: Option<AccountId>,
    /// Number of accounts referred.
    pub referral_count: i64,
    /// Whether a withdrawal can be requested now.
    pub can_withdraw: bool,
    /// End of the withdrawal cooldown.
    pub cooldown_until: Option<DateTime<Utc>>,
    /// Withdrawal awaiting settlement.
    pub pending_withdrawal: Option<WithdrawalId>,
    /// When the account was opened.
    pub created_at: DateTime<Utc>,
}

/// A ledger transaction.
#[derive(Debug, Clone, Deserialize)]
pub struct TransactionResponse {
    /// Transaction ID.
    pub id: TransactionId,
    /// Amount in points (positive = credit, negative = debit).
    pub amount: Decimal,
    /// Transaction type (`tap`, `referral_bonus`, ...).
    pub transaction_type: String,
    /// Balance after this transaction.
    pub balance_after: Decimal,
    /// Description.
    pub description: String,
    /// Additional context.
    #[serde(default)]
    pub metadata: serde_json::Value,
    /// Timestamp.
    pub created_at: DateTime<Utc>,
}

/// A page of transactions, newest first.
#[derive(Debug, Clone, Deserialize)]
pub struct ListTransactionsResponse {
    /// Transactions.
    pub transactions: Vec<TransactionResponse>,
    /// Whether older transactions exist.
    pub has_more: bool,
}

// =============================================================================
// Taps
// =============================================================================

/// Outcome of a tap.
#[derive(Debug, Clone, Deserialize)]
pub struct TapResponse {
    /// Balance after the tap.
    pub new_balance: Decimal,
    /// Energy left, `None` when taps are unlimited.
    pub energy_remaining: Option<i32>,
    /// Points credited.
    pub tap_value: Decimal,
    /// Points earned under the active package.
    pub package_earnings: Decimal,
    /// Earnings cap of the active package.
    pub max_package_earnings: Decimal,
    /// The ledger transaction recording the tap.
    pub transaction_id: TransactionId,
}

// =============================================================================
// Packages
// =============================================================================

/// A catalog package with its price in TON.
#[derive(Debug, Clone, Deserialize)]
pub struct PackageQuote {
    /// The package.
    #[serde(flatten)]
    pub package: Package,
    /// Price in TON, absent when no quote is available.
    pub price_in_ton: Option<Decimal>,
}

/// List packages response.
#[derive(Debug, Clone, Deserialize)]
pub struct ListPackagesResponse {
    /// Packages ordered by price.
    pub packages: Vec<PackageQuote>,
}

/// Package purchase request.
#[derive(Debug, Clone, Serialize)]
pub struct PurchaseRequest {
    /// Package to activate.
    pub package_id: PackageId,
    /// Proof of the TON payment (transaction hash or BOC).
    pub payment_proof: String,
}

/// Package purchase response.
#[derive(Debug, Clone, Deserialize)]
pub struct PurchaseResponse {
    /// The account after activation.
    pub account: AccountResponse,
    /// The activated package.
    pub package: Package,
    /// The purchase transaction.
    pub transaction_id: String,
    /// Whether this proof had already activated this package.
    pub replayed: bool,
}

// =============================================================================
// Referrals
// =============================================================================

/// Referral link request (service API key).
#[derive(Debug, Clone, Serialize)]
pub struct LinkReferralRequest {
    /// The invited account.
    pub account_id: AccountId,
    /// The inviting account.
    pub referrer_id: AccountId,
}

/// Referral link response.
#[derive(Debug, Clone, Deserialize)]
pub struct LinkReferralResponse {
    /// Whether a new link was recorded.
    pub linked: bool,
}

/// A referred account.
#[derive(Debug, Clone, Deserialize)]
pub struct ReferralSummary {
    /// The referred account.
    pub account_id: AccountId,
    /// Username or first name.
    pub display_name: String,
    /// Their balance in points.
    pub balance: Decimal,
    /// When they joined.
    pub joined_at: DateTime<Utc>,
}

/// The caller's referrals.
#[derive(Debug, Clone, Deserialize)]
pub struct ReferralsResponse {
    /// Deep link to share.
    pub referral_link: String,
    /// Points credited per referral.
    pub bonus_per_referral: Decimal,
    /// Referred accounts.
    pub referrals: Vec<ReferralSummary>,
}

// =============================================================================
// Withdrawals
// =============================================================================

/// Withdrawal request.
#[derive(Debug, Clone, Serialize)]
pub struct CreateWithdrawalRequest {
    /// Amount in TON.
    pub amount: Decimal,
    /// TON wallet address.
    pub destination_address: String,
    /// Key making retries of the same request safe.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<String>,
}

/// A withdrawal request.
#[derive(Debug, Clone, Deserialize)]
pub struct WithdrawalResponse {
    /// Withdrawal ID.
    pub id: WithdrawalId,
    /// Requesting account.
    pub account_id: AccountId,
    /// Amount in TON.
    pub amount: Decimal,
    /// Points reserved.
    pub required_balance: Decimal,
    /// TON wallet address.
    pub destination_address: String,
    /// Status.
    pub status: WithdrawalStatus,
    /// When it was requested.
    pub requested_at: DateTime<Utc>,
    /// When it was settled.
    #[serde(default)]
    pub processed_at: Option<DateTime<Utc>>,
    /// Payout transaction hash.
    #[serde(default)]
    pub tx_hash: Option<String>,
    /// Failure or rejection reason.
    #[serde(default)]
    pub error_message: Option<String>,
}

/// Withdrawal list response.
#[derive(Debug, Clone, Deserialize)]
pub struct ListWithdrawalsResponse {
    /// Withdrawals, newest first.
    pub withdrawals: Vec<WithdrawalResponse>,
}

// =============================================================================
// Misc
// =============================================================================

/// Current TON quote.
#[derive(Debug, Clone, Deserialize)]
pub struct PriceResponse {
    /// TON price in US dollars.
    pub ton_usd: Decimal,
    /// TON price in points.
    pub ton_points: Decimal,
    /// Points per US dollar.
    pub points_per_usd: Decimal,
}

/// Health check response.
#[derive(Debug, Clone, Deserialize)]
pub struct HealthResponse {
    /// `ok`, or `degraded` when the store is unreachable.
    pub status: String,
    /// Service name.
    pub service: String,
    /// Service version.
    pub version: String,
    /// Whether the store answered a ping.
    pub store_ready: bool,
    /// TON/USD quote in use.
    pub ton_usd: Decimal,
    /// Packages on sale.
    pub packages: usize,
}

/// API error response.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorResponse {
    /// Error details.
    pub error: ApiErrorBody,
}

/// API error body.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorBody {
    /// Error code.
    pub code: String,
    /// Error message.
    pub message: String,
    /// Additional details.
    pub details: Option<serde_json::Value>,
}
