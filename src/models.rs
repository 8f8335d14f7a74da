// src/models.rs
//
// Money fields are integers in minor currency units (cents).

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::LedgerError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum DeclarationStatus {
    Pending,
    Approved,
    Rejected,
    Paid,
}

impl DeclarationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeclarationStatus::Pending => "pending",
            DeclarationStatus::Approved => "approved",
            DeclarationStatus::Rejected => "rejected",
            DeclarationStatus::Paid => "paid",
        }
    }
}

impl fmt::Display for DeclarationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeclarationStatus {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(DeclarationStatus::Pending),
            "approved" => Ok(DeclarationStatus::Approved),
            "rejected" => Ok(DeclarationStatus::Rejected),
            "paid" => Ok(DeclarationStatus::Paid),
            other => Err(LedgerError::Internal(format!(
                "unknown declaration status {other:?}"
            ))),
        }
    }
}

/// A clipper's cumulative view report for one clip.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct Declaration {
    pub id: Uuid,
    pub clipper_id: Uuid,
    pub clip_url: String,
    pub declared_views: i64,
    /// Views already converted into earnings. Never decreases.
    pub paid_views: i64,
    pub earnings: i64,
    pub status: DeclarationStatus,
    pub verification_code: Option<String>,
    pub rejection_reason: Option<String>,
    pub payout_id: Option<String>,
    /// Set while a payout call is in flight or its outcome is unknown.
    pub payout_claimed_at: Option<DateTime<Utc>>,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum WithdrawalStatus {
    Pending,
    Completed,
    Failed,
}

impl WithdrawalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WithdrawalStatus::Pending => "pending",
            WithdrawalStatus::Completed => "completed",
            WithdrawalStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, WithdrawalStatus::Pending)
    }
}

impl fmt::Display for WithdrawalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WithdrawalStatus {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(WithdrawalStatus::Pending),
            "completed" => Ok(WithdrawalStatus::Completed),
            "failed" => Ok(WithdrawalStatus::Failed),
            other => Err(LedgerError::Internal(format!(
                "unknown withdrawal status {other:?}"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum PayoutMethod {
    BankTransfer,
    DebitCard,
}

impl PayoutMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PayoutMethod::BankTransfer => "bank_transfer",
            PayoutMethod::DebitCard => "debit_card",
        }
    }
}

impl FromStr for PayoutMethod {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "bank_transfer" => Ok(PayoutMethod::BankTransfer),
            "debit_card" => Ok(PayoutMethod::DebitCard),
            other => Err(LedgerError::Internal(format!(
                "unknown payout method {other:?}"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct Withdrawal {
    pub id: Uuid,
    pub user_id: Uuid,
    pub amount: i64,
    pub method: PayoutMethod,
    /// Connected payout account captured at request time.
    pub destination: String,
    pub status: WithdrawalStatus,
    pub payout_id: Option<String>,
    pub failure_reason: Option<String>,
    pub processing_since: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct Wallet {
    pub user_id: Uuid,
    pub balance: i64,
    pub updated_at: DateTime<Utc>,
}

/// The slice of the user profile the ledger touches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserProfile {
    pub id: Uuid,
    /// Mirror of the wallet balance, kept for the profile screens.
    pub balance: i64,
    pub payout_account_id: Option<String>,
}
