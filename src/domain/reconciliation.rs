//! Residue left by a settlement step that could not be completed after an
//! external side effect already happened. Corrected out of band.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconciliationKind {
    /// Payment captured and marked succeeded, curator balance not credited.
    UncreditedTransaction,
    /// Payout accepted by the provider, curator balance not debited.
    UndebitedWithdrawal,
    /// Withdrawal row left behind the provider outcome. Its amount still
    /// counts as in flight until corrected.
    StaleWithdrawal,
}

impl ReconciliationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UncreditedTransaction => "uncredited_transaction",
            Self::UndebitedWithdrawal => "undebited_withdrawal",
            Self::StaleWithdrawal => "stale_withdrawal",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "uncredited_transaction" => Some(Self::UncreditedTransaction),
            "undebited_withdrawal" => Some(Self::UndebitedWithdrawal),
            "stale_withdrawal" => Some(Self::StaleWithdrawal),
            _ => None,
        }
    }
}

impl fmt::Display for ReconciliationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReconciliationRecord {
    pub id: Uuid,
    pub kind: ReconciliationKind,
    /// Transaction or withdrawal id, depending on `kind`.
    pub reference_id: Uuid,
    pub user_id: Uuid,
    /// Minor units involved in the unfinished step.
    pub amount: i64,
    pub reason: String,
    pub created_at: DateTime<Utc>,
}

impl ReconciliationRecord {
    pub fn new(
        kind: ReconciliationKind,
        reference_id: Uuid,
        user_id: Uuid,
        amount: i64,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            reference_id,
            user_id,
            amount,
            reason: reason.into(),
            created_at: Utc::now(),
        }
    }
}
