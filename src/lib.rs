pub mod adapters;
pub mod cli;
pub mod config;
pub mod db;
pub mod domain;
pub mod error;
pub mod gateway;
pub mod handlers;
pub mod health;
pub mod middleware;
pub mod ports;
pub mod services;
pub mod startup;
pub mod validation;

use axum::{
    http::Method,
    middleware as axum_middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::{Any, CorsLayer};

use crate::health::DependencyChecker;
use crate::middleware::idempotency::{idempotency_middleware, IdempotencyService};
use crate::middleware::request_logger::request_logger_middleware;
use crate::services::SettlementService;

#[derive(Clone)]
pub struct AppState {
    pub settlement: Arc<SettlementService>,
    pub idempotency: Option<IdempotencyService>,
    pub health_checks: Arc<Vec<Arc<dyn DependencyChecker>>>,
    pub started_at: Instant,
}

impl AppState {
    /// State without external dependency checks or Redis, for embedding the
    /// router over a non-Postgres store.
    pub fn new(settlement: Arc<SettlementService>) -> Self {
        Self {
            settlement,
            idempotency: None,
            health_checks: Arc::new(Vec::new()),
            started_at: Instant::now(),
        }
    }
}

pub fn create_app(state: AppState) -> Router {
    let mut settlement_routes = Router::new()
        .route("/payments", post(handlers::payments::create_payment))
        .route("/payments/execute", post(handlers::payments::execute_payment))
        .route("/balance", get(handlers::balance::get_balance))
        .route("/earnings", get(handlers::balance::get_earnings))
        .route(
            "/withdrawals",
            post(handlers::withdrawals::create_withdrawal)
                .get(handlers::withdrawals::list_withdrawals),
        );

    if let Some(service) = state.idempotency.clone() {
        settlement_routes = settlement_routes.layer(axum_middleware::from_fn_with_state(
            service,
            idempotency_middleware,
        ));
    }

    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any)
        .allow_origin(Any);

    Router::new()
        .route("/health", get(handlers::health))
        .route("/api-docs/openapi.json", get(handlers::openapi_json))
        .nest("/settlement", settlement_routes)
        .layer(axum_middleware::from_fn(request_logger_middleware))
        .layer(cors)
        .with_state(state)
}
