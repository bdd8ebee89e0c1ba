//! Transaction domain entity.
//! One monetary event tied 1:1 to a song submission.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::money::FeeSplit;
use super::{validate_currency, DomainError};

/// `pending -> succeeded | failed`, one-way.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Pending,
    Succeeded,
    Failed,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "succeeded" => Ok(Self::Succeeded),
            "failed" => Ok(Self::Failed),
            other => Err(DomainError::UnknownStatus {
                entity: "transaction",
                value: other.to_string(),
            }),
        }
    }
}

/// Domain entity representing a submission payment.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Transaction {
    pub id: Uuid,
    pub submission_id: Uuid,
    pub payment_method_id: String,
    /// Artist paying for the submission.
    pub payer_id: Uuid,
    /// Curator who owns the target playlist.
    pub payee_id: Uuid,
    pub amount_total: i64,
    pub currency: String,
    pub platform_fee: i64,
    pub creator_payout_amount: i64,
    pub status: TransactionStatus,
    pub provider_transaction_id: Option<String>,
    pub approval_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Transaction {
    pub fn pending(
        submission_id: Uuid,
        payment_method_id: String,
        payer_id: Uuid,
        payee_id: Uuid,
        split: FeeSplit,
        currency: String,
    ) -> Result<Self, DomainError> {
        split.check()?;
        validate_currency(&currency)?;

        let now = Utc::now();
        Ok(Self {
            id: Uuid::new_v4(),
            submission_id,
            payment_method_id,
            payer_id,
            payee_id,
            amount_total: split.amount_total,
            currency,
            platform_fee: split.platform_fee,
            creator_payout_amount: split.creator_payout,
            status: TransactionStatus::Pending,
            provider_transaction_id: None,
            approval_url: None,
            created_at: now,
            updated_at: now,
        })
    }

    /// Attaches the provider's payment id and checkout URL before the row is persisted.
    pub fn with_provider_payment(mut self, provider_id: String, approval_url: String) -> Self {
        self.provider_transaction_id = Some(provider_id);
        self.approval_url = Some(approval_url);
        self
    }

    /// Validates a status change without applying it.
    pub fn check_transition(&self, to: TransactionStatus) -> Result<(), DomainError> {
        match (self.status, to) {
            (TransactionStatus::Pending, TransactionStatus::Succeeded)
            | (TransactionStatus::Pending, TransactionStatus::Failed) => Ok(()),
            (from, to) => Err(DomainError::InvalidTransition {
                entity: "transaction",
                from: from.as_str(),
                to: to.as_str(),
            }),
        }
    }

    pub fn transition(&mut self, to: TransactionStatus) -> Result<(), DomainError> {
        self.check_transition(to)?;
        self.status = to;
        self.updated_at = Utc::now();
        Ok(())
    }
}
