use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::domain::money::from_minor_units;
use crate::domain::Withdrawal;
use crate::error::AppError;
use crate::middleware::auth::CurrentUser;
use crate::validation::{resolve_page, validate_withdrawal_amount};
use crate::AppState;

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateWithdrawalRequest {
    /// Major units, at most two decimal places.
    #[schema(value_type = String, example = "9.50")]
    pub amount: BigDecimal,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct WithdrawalCreatedResponse {
    pub withdrawal_id: Uuid,
    pub batch_id: String,
    #[schema(example = "completed")]
    pub status: String,
    #[schema(value_type = String, example = "9.50")]
    pub amount: BigDecimal,
    pub currency: String,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct WithdrawalResponse {
    pub id: Uuid,
    #[schema(value_type = String, example = "9.50")]
    pub amount: BigDecimal,
    pub currency: String,
    #[schema(example = "completed")]
    pub status: String,
    pub requested_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
    pub payout_batch_id: Option<String>,
    pub error_message: Option<String>,
}

impl From<Withdrawal> for WithdrawalResponse {
    fn from(w: Withdrawal) -> Self {
        Self {
            id: w.id,
            amount: from_minor_units(w.amount),
            currency: w.currency,
            status: w.status.to_string(),
            requested_at: w.requested_at,
            processed_at: w.processed_at,
            payout_batch_id: w.payout_batch_id,
            error_message: w.error_message,
        }
    }
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct Pagination {
    /// Defaults to 0.
    pub skip: Option<i64>,
    /// Defaults to 20, at most 100.
    pub take: Option<i64>,
}

#[utoipa::path(
    post,
    path = "/settlement/withdrawals",
    request_body = CreateWithdrawalRequest,
    params(("x-user-id" = String, Header, description = "Authenticated user")),
    responses(
        (status = 201, description = "Payout sent and balance debited", body = WithdrawalCreatedResponse),
        (status = 400, description = "Invalid amount"),
        (status = 422, description = "Insufficient balance or no payout account"),
        (status = 502, description = "Provider rejected the payout")
    ),
    tag = "Withdrawals"
)]
pub async fn create_withdrawal(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Json(payload): Json<CreateWithdrawalRequest>,
) -> Result<impl IntoResponse, AppError> {
    validate_withdrawal_amount(&payload.amount)?;

    let receipt = state.settlement.withdraw(user_id, &payload.amount).await?;
    let withdrawal = receipt.withdrawal;

    Ok((
        StatusCode::CREATED,
        Json(WithdrawalCreatedResponse {
            withdrawal_id: withdrawal.id,
            batch_id: receipt.payout_batch_id,
            status: withdrawal.status.to_string(),
            amount: from_minor_units(withdrawal.amount),
            currency: withdrawal.currency,
        }),
    ))
}

#[utoipa::path(
    get,
    path = "/settlement/withdrawals",
    params(
        ("x-user-id" = String, Header, description = "Authenticated user"),
        Pagination
    ),
    responses(
        (status = 200, description = "Withdrawals, newest first", body = [WithdrawalResponse]),
        (status = 400, description = "Invalid pagination")
    ),
    tag = "Withdrawals"
)]
pub async fn list_withdrawals(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Query(pagination): Query<Pagination>,
) -> Result<impl IntoResponse, AppError> {
    let (skip, take) = resolve_page(pagination.skip, pagination.take)?;

    let withdrawals = state
        .settlement
        .list_withdrawals(user_id, skip, take)
        .await?;

    Ok(Json(
        withdrawals
            .into_iter()
            .map(WithdrawalResponse::from)
            .collect::<Vec<_>>(),
    ))
}
