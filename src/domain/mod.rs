//! Settlement domain entities.
//! Framework-agnostic: no sqlx, axum or provider types leak in here.

pub mod earnings;
pub mod money;
pub mod reconciliation;
pub mod submission;
pub mod transaction;
pub mod withdrawal;

use thiserror::Error;

pub use earnings::{EarningsPeriod, EarningsStats, EarningsTotals};
pub use money::{FeeSplit, PLATFORM_FEE_PERCENT};
pub use reconciliation::{ReconciliationKind, ReconciliationRecord};
pub use submission::{PlaylistRef, SongRef, Submission};
pub use transaction::{Transaction, TransactionStatus};
pub use withdrawal::{Withdrawal, WithdrawalStatus};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    #[error("invalid {entity} status transition from {from} to {to}")]
    InvalidTransition {
        entity: &'static str,
        from: &'static str,
        to: &'static str,
    },

    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    #[error("unknown {entity} status: {value}")]
    UnknownStatus { entity: &'static str, value: String },
}

/// Currency codes are fixed-length ISO 4217 alphabetic codes.
pub fn validate_currency(currency: &str) -> Result<(), DomainError> {
    if currency.len() != 3 || !currency.chars().all(|c| c.is_ascii_uppercase()) {
        return Err(DomainError::InvariantViolation(format!(
            "currency must be a 3-letter ISO code, got {:?}",
            currency
        )));
    }
    Ok(())
}
