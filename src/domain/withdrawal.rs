//! Withdrawal domain entity.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::{validate_currency, DomainError};

/// `pending -> processing -> {completed, failed}`; a pending withdrawal may
/// also fail directly when the provider rejects the payout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WithdrawalStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl WithdrawalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// In-flight withdrawals hold back part of the balance.
    pub fn is_in_flight(&self) -> bool {
        matches!(self, Self::Pending | Self::Processing)
    }
}

impl fmt::Display for WithdrawalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WithdrawalStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "processing" => Ok(Self::Processing),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(DomainError::UnknownStatus {
                entity: "withdrawal",
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Withdrawal {
    pub id: Uuid,
    pub user_id: Uuid,
    pub amount: i64,
    pub currency: String,
    pub status: WithdrawalStatus,
    pub requested_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
    pub payout_batch_id: Option<String>,
    pub provider_payload: Option<serde_json::Value>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Withdrawal {
    pub fn pending(user_id: Uuid, amount: i64, currency: String) -> Result<Self, DomainError> {
        if amount <= 0 {
            return Err(DomainError::InvalidAmount(format!(
                "withdrawal amount must be positive, got {} minor units",
                amount
            )));
        }
        validate_currency(&currency)?;

        let now = Utc::now();
        Ok(Self {
            id: Uuid::new_v4(),
            user_id,
            amount,
            currency,
            status: WithdrawalStatus::Pending,
            requested_at: now,
            processed_at: None,
            payout_batch_id: None,
            provider_payload: None,
            error_message: None,
            created_at: now,
            updated_at: now,
        })
    }

    fn transition(&mut self, to: WithdrawalStatus) -> Result<(), DomainError> {
        use WithdrawalStatus::*;
        match (self.status, to) {
            (Pending, Processing)
            | (Pending, Failed)
            | (Processing, Completed)
            | (Processing, Failed) => {
                self.status = to;
                self.updated_at = Utc::now();
                Ok(())
            }
            (from, to) => Err(DomainError::InvalidTransition {
                entity: "withdrawal",
                from: from.as_str(),
                to: to.as_str(),
            }),
        }
    }

    /// Provider accepted the payout batch.
    pub fn mark_processing(
        &mut self,
        batch_id: String,
        payload: serde_json::Value,
    ) -> Result<(), DomainError> {
        self.transition(WithdrawalStatus::Processing)?;
        self.payout_batch_id = Some(batch_id);
        self.provider_payload = Some(payload);
        Ok(())
    }

    /// Balance has been debited for an accepted payout.
    pub fn mark_completed(&mut self) -> Result<(), DomainError> {
        self.transition(WithdrawalStatus::Completed)?;
        self.processed_at = Some(self.updated_at);
        Ok(())
    }

    pub fn mark_failed(&mut self, message: impl Into<String>) -> Result<(), DomainError> {
        self.transition(WithdrawalStatus::Failed)?;
        self.processed_at = Some(self.updated_at);
        self.error_message = Some(message.into());
        Ok(())
    }
}
