//! Withdrawal requests and their lifecycle.
//!
//! A request starts `pending` and moves exactly once to `completed`,
//! `failed` or `rejected`. Nothing re-enters `pending`.

use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{LedgerError, Result};
use crate::ids::{AccountId, WithdrawalId};

/// Status of a withdrawal request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WithdrawalStatus {
    /// Funds reserved, waiting for settlement.
    Pending,

    /// Paid out on-chain.
    Completed,

    /// Payout attempted and failed; funds refunded.
    Failed,

    /// Rejected by an operator; funds refunded.
    Rejected,
}

impl WithdrawalStatus {
    /// Storage and wire name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Rejected => "rejected",
        }
    }

    /// Parse a storage name.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(Self::Pending),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }

    /// Whether the status is final.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl fmt::Display for WithdrawalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a pending withdrawal is settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WithdrawalOutcome {
    /// Payout sent.
    Completed,

    /// Payout failed.
    Failed,

    /// Operator rejected the request.
    Rejected,
}

impl WithdrawalOutcome {
    /// The terminal status this outcome leads to.
    #[must_use]
    pub const fn status(self) -> WithdrawalStatus {
        match self {
            Self::Completed => WithdrawalStatus::Completed,
            Self::Failed => WithdrawalStatus::Failed,
            Self::Rejected => WithdrawalStatus::Rejected,
        }
    }

    /// Whether the reserved points go back to the account.
    #[must_use]
    pub const fn refunds(self) -> bool {
        !matches!(self, Self::Completed)
    }
}

/// A validated withdrawal ready to be reserved against an account.
#[derive(Debug, Clone, PartialEq)]
pub struct WithdrawalDraft {
    /// Amount in TON.
    pub amount: Decimal,

    /// Points to reserve (`amount * price`).
    pub required_balance: Decimal,

    /// Destination wallet address.
    pub destination_address: String,

    /// Client-supplied key making creation idempotent.
    pub idempotency_key: Option<String>,
}

/// A withdrawal request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WithdrawalRequest {
    /// Request id.
    pub id: WithdrawalId,

    /// The requesting account.
    pub account_id: AccountId,

    /// Amount in TON.
    pub amount: Decimal,

    /// Points reserved from the balance.
    pub required_balance: Decimal,

    /// Destination wallet address.
    pub destination_address: String,

    /// Current status.
    pub status: WithdrawalStatus,

    /// Client-supplied idempotency key, if any.
    pub idempotency_key: Option<String>,

    /// When the request was made.
    pub requested_at: DateTime<Utc>,

    /// When the request reached a terminal state.
    pub processed_at: Option<DateTime<Utc>>,

    /// On-chain transaction hash for completed payouts.
    pub tx_hash: Option<String>,

    /// Reason for failure or rejection.
    pub error_message: Option<String>,
}

impl WithdrawalRequest {
    /// Create a pending request from a draft.
    #[must_use]
    pub fn pending(
        id: WithdrawalId,
        account_id: AccountId,
        draft: WithdrawalDraft,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            account_id,
            amount: draft.amount,
            required_balance: draft.required_balance,
            destination_address: draft.destination_address,
            status: WithdrawalStatus::Pending,
            idempotency_key: draft.idempotency_key,
            requested_at: now,
            processed_at: None,
            tx_hash: None,
            error_message: None,
        }
    }

    /// Move the request to its terminal state.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::WithdrawalAlreadySettled` if the request is not
    /// pending.
    pub fn settle(
        &mut self,
        outcome: WithdrawalOutcome,
        tx_hash: Option<String>,
        error_message: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<()> {
        if self.status.is_terminal() {
            return Err(LedgerError::WithdrawalAlreadySettled {
                withdrawal_id: self.id,
                status: self.status,
            });
        }

        self.status = outcome.status();
        self.processed_at = Some(now);
        match outcome {
            WithdrawalOutcome::Completed => self.tx_hash = tx_hash,
            WithdrawalOutcome::Failed | WithdrawalOutcome::Rejected => {
                self.error_message = error_message;
            }
        }
        Ok(())
    }
}
