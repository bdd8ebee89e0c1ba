use thiserror::Error;
use uuid::Uuid;

use crate::domain::DomainError;
use crate::gateway::GatewayError;
use crate::ports::RepositoryError;

#[derive(Debug, Error)]
pub enum SettlementError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    #[error("user {0} has not linked a payout account")]
    PayoutAccountMissing(Uuid),

    #[error("insufficient balance: requested {requested}, available {available}")]
    InsufficientBalance { requested: i64, available: i64 },

    #[error("transaction {0} has already been processed")]
    AlreadyProcessed(Uuid),

    #[error("{operation} failed: {source}")]
    Provider {
        operation: &'static str,
        source: GatewayError,
    },

    #[error("withdrawal {withdrawal_id} failed: {message}")]
    WithdrawalFailed { withdrawal_id: Uuid, message: String },

    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    #[error("repository error: {0}")]
    Repository(#[from] RepositoryError),
}

impl SettlementError {
    pub fn provider(operation: &'static str) -> impl FnOnce(GatewayError) -> Self {
        move |source| SettlementError::Provider { operation, source }
    }

    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        SettlementError::NotFound {
            entity,
            id: id.to_string(),
        }
    }
}

impl From<DomainError> for SettlementError {
    fn from(e: DomainError) -> Self {
        match e {
            DomainError::InvalidAmount(msg) => SettlementError::Validation(msg),
            other => SettlementError::InvariantViolation(other.to_string()),
        }
    }
}

pub type SettlementResult<T> = Result<T, SettlementError>;
