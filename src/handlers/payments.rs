use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::domain::money::from_minor_units;
use crate::domain::Transaction;
use crate::error::AppError;
use crate::middleware::auth::CurrentUser;
use crate::services::InitiatePayment;
use crate::validation::{
    sanitize_string, validate_redirect_url, validate_token, PAYMENT_METHOD_ID_MAX_LEN,
    PROVIDER_ID_MAX_LEN,
};
use crate::AppState;

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreatePaymentRequest {
    pub submission_id: Uuid,
    pub payment_method_id: String,
    pub return_url: String,
    pub cancel_url: String,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PaymentInitiationResponse {
    pub transaction_id: Uuid,
    pub approval_url: String,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ExecutePaymentRequest {
    pub payment_id: String,
    pub payer_id: String,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TransactionResponse {
    pub id: Uuid,
    pub submission_id: Uuid,
    pub payment_method_id: String,
    #[schema(value_type = String, example = "10.00")]
    pub amount_total: BigDecimal,
    #[schema(value_type = String, example = "0.50")]
    pub platform_fee: BigDecimal,
    #[schema(value_type = String, example = "9.50")]
    pub creator_payout_amount: BigDecimal,
    pub currency: String,
    #[schema(example = "succeeded")]
    pub status: String,
    pub provider_transaction_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Transaction> for TransactionResponse {
    fn from(tx: Transaction) -> Self {
        Self {
            id: tx.id,
            submission_id: tx.submission_id,
            payment_method_id: tx.payment_method_id,
            amount_total: from_minor_units(tx.amount_total),
            platform_fee: from_minor_units(tx.platform_fee),
            creator_payout_amount: from_minor_units(tx.creator_payout_amount),
            currency: tx.currency,
            status: tx.status.to_string(),
            provider_transaction_id: tx.provider_transaction_id,
            created_at: tx.created_at,
            updated_at: tx.updated_at,
        }
    }
}

#[utoipa::path(
    post,
    path = "/settlement/payments",
    request_body = CreatePaymentRequest,
    params(("x-user-id" = String, Header, description = "Authenticated user")),
    responses(
        (status = 201, description = "Provider payment created", body = PaymentInitiationResponse),
        (status = 400, description = "Invalid request"),
        (status = 404, description = "Submission not found"),
        (status = 409, description = "Submission already paid"),
        (status = 422, description = "Curator has no payout account"),
        (status = 502, description = "Provider rejected the payment"),
        (status = 503, description = "Provider temporarily unavailable")
    ),
    tag = "Payments"
)]
pub async fn create_payment(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Json(payload): Json<CreatePaymentRequest>,
) -> Result<impl IntoResponse, AppError> {
    let payment_method_id = sanitize_string(&payload.payment_method_id);
    validate_token("paymentMethodId", &payment_method_id, PAYMENT_METHOD_ID_MAX_LEN)?;
    validate_redirect_url("returnUrl", &payload.return_url)?;
    validate_redirect_url("cancelUrl", &payload.cancel_url)?;

    tracing::info!(%user_id, submission_id = %payload.submission_id, "Payment requested");

    let initiation = state
        .settlement
        .process_payment(InitiatePayment {
            submission_id: payload.submission_id,
            payment_method_id,
            return_url: payload.return_url,
            cancel_url: payload.cancel_url,
        })
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(PaymentInitiationResponse {
            transaction_id: initiation.transaction.id,
            approval_url: initiation.approval_url,
        }),
    ))
}

#[utoipa::path(
    post,
    path = "/settlement/payments/execute",
    request_body = ExecutePaymentRequest,
    params(("x-user-id" = String, Header, description = "Authenticated user")),
    responses(
        (status = 200, description = "Payment settled", body = TransactionResponse),
        (status = 404, description = "Unknown payment"),
        (status = 409, description = "Payment already settled"),
        (status = 502, description = "Provider rejected execution"),
        (status = 503, description = "Provider temporarily unavailable")
    ),
    tag = "Payments"
)]
pub async fn execute_payment(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Json(payload): Json<ExecutePaymentRequest>,
) -> Result<impl IntoResponse, AppError> {
    let payment_id = payload.payment_id.trim();
    let payer_id = payload.payer_id.trim();
    validate_token("paymentId", payment_id, PROVIDER_ID_MAX_LEN)?;
    validate_token("payerId", payer_id, PROVIDER_ID_MAX_LEN)?;

    tracing::info!(%user_id, %payment_id, "Payment execution requested");

    let transaction = state
        .settlement
        .complete_payment(payment_id, payer_id)
        .await?;

    Ok(Json(TransactionResponse::from(transaction)))
}
