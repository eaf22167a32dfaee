//! Ledger constants and tunables.

use chrono::Duration;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

// ============================================================================
// Constants
// ============================================================================

/// Points credited per tap without a package (0.05).
pub const DEFAULT_BASE_TAP_VALUE: Decimal = Decimal::from_parts(5, 0, 0, false, 2);

/// Daily energy budget (one energy per tap).
pub const DEFAULT_MAX_ENERGY: i32 = 1000;

/// Points credited to a referrer for each new referral.
pub const DEFAULT_REFERRAL_BONUS: Decimal = Decimal::from_parts(100, 0, 0, false, 0);

/// Minimum withdrawal in TON (0.01).
pub const DEFAULT_MIN_WITHDRAWAL: Decimal = Decimal::from_parts(1, 0, 0, false, 2);

/// Days an account must wait between withdrawal requests.
pub const DEFAULT_WITHDRAWAL_COOLDOWN_DAYS: i64 = 59;

/// Points that make up one US dollar.
pub const DEFAULT_POINTS_PER_USD: Decimal = Decimal::from_parts(1000, 0, 0, false, 0);

/// Tunable ledger parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// Per-tap credit for accounts without a package.
    pub base_tap_value: Decimal,

    /// Energy granted by the daily reset.
    pub max_energy: i32,

    /// Bonus credited to the referrer on a successful referral link.
    pub referral_bonus: Decimal,

    /// Minimum withdrawal amount in TON.
    pub min_withdrawal: Decimal,

    /// Cooldown between withdrawals, in days.
    pub withdrawal_cooldown_days: i64,

    /// Conversion between points and US dollars.
    pub points_per_usd: Decimal,
}

impl LedgerConfig {
    /// Cooldown applied after a withdrawal request.
    #[must_use]
    pub fn withdrawal_cooldown(&self) -> Duration {
        Duration::days(self.withdrawal_cooldown_days)
    }

    /// Convert a points balance to US dollars.
    #[must_use]
    pub fn points_to_usd(&self, points: Decimal) -> Decimal {
        if self.points_per_usd.is_zero() {
            return Decimal::ZERO;
        }
        points / self.points_per_usd
    }
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            base_tap_value: DEFAULT_BASE_TAP_VALUE,
            max_energy: DEFAULT_MAX_ENERGY,
            referral_bonus: DEFAULT_REFERRAL_BONUS,
            min_withdrawal: DEFAULT_MIN_WITHDRAWAL,
            withdrawal_cooldown_days: DEFAULT_WITHDRAWAL_COOLDOWN_DAYS,
            points_per_usd: DEFAULT_POINTS_PER_USD,
        }
    }
}
