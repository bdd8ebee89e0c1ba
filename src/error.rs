use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

use crate::domain::money::format_minor_units;
use crate::ports::RepositoryError;
use crate::services::SettlementError;
use crate::validation::ValidationError;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("{0}")]
    Unprocessable(String),

    #[error("{0}")]
    ProviderUnavailable(String),

    #[error("{0}")]
    ProviderFailed(String),

    #[error("Internal server error")]
    Internal(String),
}

impl AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Unprocessable(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::ProviderUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::ProviderFailed(_) => StatusCode::BAD_GATEWAY,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if let AppError::Internal(detail) = &self {
            tracing::error!(error = %detail, "Request failed with internal error");
        }
        let body = Json(json!({
            "error": self.to_string(),
            "status": status.as_u16(),
        }));

        (status, body).into_response()
    }
}

impl From<ValidationError> for AppError {
    fn from(e: ValidationError) -> Self {
        AppError::Validation(e.to_string())
    }
}

impl From<SettlementError> for AppError {
    fn from(e: SettlementError) -> Self {
        match e {
            SettlementError::Validation(msg) => AppError::Validation(msg),
            SettlementError::NotFound { .. } => AppError::NotFound(e.to_string()),
            SettlementError::PayoutAccountMissing(_) => AppError::Unprocessable(
                "No payout account is linked. Connect a PayPal account to receive payouts"
                    .to_string(),
            ),
            SettlementError::InsufficientBalance {
                requested,
                available,
            } => AppError::Unprocessable(format!(
                "Insufficient balance: requested {}, available {}",
                format_minor_units(requested),
                format_minor_units(available)
            )),
            SettlementError::AlreadyProcessed(_) => AppError::Conflict(e.to_string()),
            SettlementError::Provider { ref source, .. } => {
                if source.is_transient() {
                    AppError::ProviderUnavailable(source.user_message().to_string())
                } else {
                    AppError::ProviderFailed(source.user_message().to_string())
                }
            }
            SettlementError::WithdrawalFailed { ref message, .. } => AppError::ProviderFailed(
                format!("Withdrawal failed: {}. Please contact support", message),
            ),
            SettlementError::Repository(RepositoryError::NotFound(what)) => {
                AppError::NotFound(what)
            }
            SettlementError::Repository(RepositoryError::Conflict(what)) => {
                AppError::Conflict(what)
            }
            SettlementError::InvariantViolation(_) | SettlementError::Repository(_) => {
                AppError::Internal(e.to_string())
            }
        }
    }
}
