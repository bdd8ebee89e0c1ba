//! Storage and collaborator ports.
//! Services depend on these traits; `adapters` provides Postgres and in-memory
//! implementations.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::domain::{
    EarningsTotals, ReconciliationRecord, Submission, Transaction, TransactionStatus, Withdrawal,
};

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("database error: {0}")]
    Database(String),
}

impl From<sqlx::Error> for RepositoryError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::RowNotFound => RepositoryError::NotFound("row".to_string()),
            sqlx::Error::Database(ref db) if db.is_unique_violation() => {
                RepositoryError::Conflict(db.message().to_string())
            }
            other => RepositoryError::Database(other.to_string()),
        }
    }
}

pub type RepositoryResult<T> = Result<T, RepositoryError>;

#[async_trait]
pub trait TransactionRepository: Send + Sync {
    /// Fails with `Conflict` if the submission already has a transaction.
    async fn insert(&self, tx: &Transaction) -> RepositoryResult<Transaction>;

    async fn get_by_id(&self, id: Uuid) -> RepositoryResult<Transaction>;

    async fn find_by_submission(&self, submission_id: Uuid) -> RepositoryResult<Option<Transaction>>;

    async fn find_by_provider_id(&self, provider_id: &str) -> RepositoryResult<Option<Transaction>>;

    /// Moves a `pending` transaction to `status`. Returns `None` when the row
    /// is no longer pending, so a terminal state is written at most once.
    async fn finalize(
        &self,
        id: Uuid,
        status: TransactionStatus,
    ) -> RepositoryResult<Option<Transaction>>;

    /// Succeeded transactions paid to `payee_id`, updated at or after `since`.
    async fn earnings(
        &self,
        payee_id: Uuid,
        since: Option<DateTime<Utc>>,
    ) -> RepositoryResult<EarningsTotals>;
}

/// Stores that can settle a payment and credit the payee in one durable step.
#[async_trait]
pub trait PaymentSettlementStore: Send + Sync {
    /// Moves a `pending` transaction to `succeeded` and adds its
    /// `creator_payout_amount` to the payee balance, both or neither.
    /// Returns `None` when the row is no longer pending.
    async fn finalize_and_credit(&self, id: Uuid) -> RepositoryResult<Option<Transaction>>;
}

/// Outcome of an atomic "check available, then insert pending" step.
#[derive(Debug, Clone)]
pub enum Reservation {
    Reserved(Withdrawal),
    Insufficient { balance: i64, in_flight: i64 },
}

#[async_trait]
pub trait WithdrawalRepository: Send + Sync {
    /// Inserts `withdrawal` only if `balance - in_flight >= withdrawal.amount`,
    /// serialized per user so concurrent requests cannot both pass the check.
    async fn reserve(&self, withdrawal: &Withdrawal) -> RepositoryResult<Reservation>;

    async fn update(&self, withdrawal: &Withdrawal) -> RepositoryResult<Withdrawal>;

    async fn get_by_id(&self, id: Uuid) -> RepositoryResult<Withdrawal>;

    /// Newest first.
    async fn list_for_user(
        &self,
        user_id: Uuid,
        skip: i64,
        take: i64,
    ) -> RepositoryResult<Vec<Withdrawal>>;

    /// Sum of `pending` and `processing` withdrawal amounts.
    async fn in_flight_total(&self, user_id: Uuid) -> RepositoryResult<i64>;
}

/// The scalar balance stored on the user entity, in minor units.
#[async_trait]
pub trait BalanceRepository: Send + Sync {
    async fn balance(&self, user_id: Uuid) -> RepositoryResult<i64>;

    /// Returns the new balance.
    async fn increment(&self, user_id: Uuid, amount: i64) -> RepositoryResult<i64>;

    /// Conditional decrement: `None` when the result would be negative.
    async fn decrement_if_sufficient(
        &self,
        user_id: Uuid,
        amount: i64,
    ) -> RepositoryResult<Option<i64>>;
}

/// Song submission catalogue, owned outside the settlement core.
#[async_trait]
pub trait SubmissionDirectory: Send + Sync {
    async fn get_submission(&self, id: Uuid) -> RepositoryResult<Option<Submission>>;

    /// Paid submissions move to `pending`, ready for curator review.
    async fn mark_pending_review(&self, id: Uuid) -> RepositoryResult<()>;
}

/// Linked payment-provider accounts, owned by the OAuth linking flow.
#[async_trait]
pub trait PayoutAccountDirectory: Send + Sync {
    async fn payout_address(&self, user_id: Uuid) -> RepositoryResult<Option<String>>;
}

#[async_trait]
pub trait ReconciliationLog: Send + Sync {
    async fn record(&self, record: &ReconciliationRecord) -> RepositoryResult<()>;

    /// Newest first.
    async fn list(&self, limit: i64) -> RepositoryResult<Vec<ReconciliationRecord>>;
}
