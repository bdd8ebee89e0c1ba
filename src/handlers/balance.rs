use axum::{
    extract::{Query, State},
    response::IntoResponse,
    Json,
};
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::domain::money::from_minor_units;
use crate::domain::EarningsPeriod;
use crate::error::AppError;
use crate::middleware::auth::CurrentUser;
use crate::AppState;

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BalanceResponse {
    #[schema(value_type = String, example = "9.50")]
    pub balance: BigDecimal,
    #[schema(value_type = String, example = "0.00")]
    pub pending_withdrawals: BigDecimal,
    #[schema(value_type = String, example = "9.50")]
    pub available: BigDecimal,
    #[schema(value_type = String, example = "9.50")]
    pub total_earnings: BigDecimal,
    #[schema(example = "USD")]
    pub currency: String,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct EarningsQuery {
    /// One of `week`, `month`, `year`, `all`. Defaults to `month`.
    pub period: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct EarningsResponse {
    #[schema(example = "month")]
    pub period: String,
    /// Start of the window; absent for `all`.
    pub since: Option<DateTime<Utc>>,
    #[schema(value_type = String, example = "95.00")]
    pub total_earnings: BigDecimal,
    #[schema(value_type = String, example = "5.00")]
    pub platform_fees: BigDecimal,
    pub transaction_count: i64,
    pub currency: String,
}

#[utoipa::path(
    get,
    path = "/settlement/balance",
    params(("x-user-id" = String, Header, description = "Authenticated user")),
    responses(
        (status = 200, description = "Current balance", body = BalanceResponse),
        (status = 401, description = "No authenticated user"),
        (status = 404, description = "Unknown user")
    ),
    tag = "Balance"
)]
pub async fn get_balance(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
) -> Result<impl IntoResponse, AppError> {
    let summary = state.settlement.get_balance(user_id).await?;

    Ok(Json(BalanceResponse {
        balance: from_minor_units(summary.balance),
        pending_withdrawals: from_minor_units(summary.pending_withdrawals),
        available: from_minor_units(summary.available),
        total_earnings: from_minor_units(summary.total_earnings),
        currency: summary.currency,
    }))
}

#[utoipa::path(
    get,
    path = "/settlement/earnings",
    params(
        ("x-user-id" = String, Header, description = "Authenticated user"),
        EarningsQuery
    ),
    responses(
        (status = 200, description = "Earnings over the period", body = EarningsResponse),
        (status = 400, description = "Unknown period")
    ),
    tag = "Balance"
)]
pub async fn get_earnings(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Query(query): Query<EarningsQuery>,
) -> Result<impl IntoResponse, AppError> {
    let period = match query.period.as_deref() {
        None => EarningsPeriod::default(),
        Some(raw) => raw
            .trim()
            .to_ascii_lowercase()
            .parse::<EarningsPeriod>()
            .map_err(|_| {
                AppError::Validation("period must be one of: week, month, year, all".to_string())
            })?,
    };

    let stats = state.settlement.get_earnings_stats(user_id, period).await?;

    Ok(Json(EarningsResponse {
        period: stats.period.as_str().to_string(),
        since: stats.since,
        total_earnings: from_minor_units(stats.totals.creator_payout),
        platform_fees: from_minor_units(stats.totals.platform_fees),
        transaction_count: stats.totals.transaction_count,
        currency: stats.currency,
    }))
}
