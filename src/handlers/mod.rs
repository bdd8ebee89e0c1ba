pub mod balance;
pub mod payments;
pub mod withdrawals;

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use utoipa::OpenApi;

use crate::health::{check_health, HealthResponse};
use crate::AppState;

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is healthy or degraded", body = HealthResponse),
        (status = 503, description = "Database is unreachable", body = HealthResponse)
    ),
    tag = "Health"
)]
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let report = check_health(&state.health_checks, state.started_at).await;

    let status_code = if report.status == "unhealthy" {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };

    (status_code, Json(report))
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health,
        payments::create_payment,
        payments::execute_payment,
        balance::get_balance,
        balance::get_earnings,
        withdrawals::create_withdrawal,
        withdrawals::list_withdrawals,
    ),
    components(schemas(
        HealthResponse,
        payments::CreatePaymentRequest,
        payments::PaymentInitiationResponse,
        payments::ExecutePaymentRequest,
        payments::TransactionResponse,
        balance::BalanceResponse,
        balance::EarningsResponse,
        withdrawals::CreateWithdrawalRequest,
        withdrawals::WithdrawalCreatedResponse,
        withdrawals::WithdrawalResponse,
    )),
    tags(
        (name = "Health", description = "Liveness and dependency status"),
        (name = "Payments", description = "Submission payment capture"),
        (name = "Balance", description = "Curator balance and earnings"),
        (name = "Withdrawals", description = "Curator payouts")
    )
)]
pub struct ApiDoc;

pub async fn openapi_json() -> impl IntoResponse {
    Json(ApiDoc::openapi())
}
