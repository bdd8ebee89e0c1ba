use anyhow::{Context, Result};
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Instant;

use crate::adapters::PgSettlementStore;
use crate::config::Config;
use crate::gateway::{PayPalGateway, PaymentGateway};
use crate::health::{DependencyChecker, PaymentProviderChecker, PostgresChecker, RedisChecker};
use crate::middleware::idempotency::IdempotencyService;
use crate::services::{SettlementComponents, SettlementService};
use crate::AppState;

/// Wires the Postgres store, the PayPal gateway and the optional Redis
/// idempotency guard into the HTTP state.
pub fn build_state(config: &Config, pool: PgPool) -> Result<AppState> {
    let gateway: Arc<dyn PaymentGateway> = Arc::new(PayPalGateway::new(&config.paypal));
    let store = Arc::new(PgSettlementStore::new(pool.clone()));
    let settlement = SettlementService::new(SettlementComponents::from_store(
        store,
        gateway.clone(),
        config.settlement_currency.clone(),
    ));

    let idempotency = match &config.redis_url {
        Some(url) => Some(IdempotencyService::new(url).context("Invalid REDIS_URL")?),
        None => None,
    };

    let mut health_checks: Vec<Arc<dyn DependencyChecker>> = vec![
        Arc::new(PostgresChecker::new(pool)),
        Arc::new(PaymentProviderChecker::new(gateway)),
    ];
    if let Some(service) = &idempotency {
        health_checks.push(Arc::new(RedisChecker::new(service.clone())));
    }

    Ok(AppState {
        settlement: Arc::new(settlement),
        idempotency,
        health_checks: Arc::new(health_checks),
        started_at: Instant::now(),
    })
}

pub struct ValidationReport {
    pub environment: bool,
    pub database: bool,
    /// `None` when Redis is not configured.
    pub redis: Option<bool>,
    pub payment_provider: bool,
    pub errors: Vec<String>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.environment && self.database && self.redis.unwrap_or(true) && self.payment_provider
    }

    pub fn print(&self) {
        println!("\n=== Startup Validation Report ===");
        println!("Environment Variables: {}", status(self.environment));
        println!("Database Connectivity: {}", status(self.database));
        println!(
            "Redis Connectivity:    {}",
            self.redis.map(status).unwrap_or("SKIPPED (REDIS_URL unset)")
        );
        println!("Payment Provider Auth: {}", status(self.payment_provider));

        if !self.errors.is_empty() {
            println!("\nErrors:");
            for error in &self.errors {
                println!("  - {}", error);
            }
        }

        println!("\nOverall Status: {}", if self.is_valid() { "PASS" } else { "FAIL" });
        println!("=================================\n");
    }
}

fn status(ok: bool) -> &'static str {
    if ok { "OK" } else { "FAIL" }
}

pub async fn validate_environment(
    config: &Config,
    pool: &PgPool,
    gateway: &dyn PaymentGateway,
) -> Result<ValidationReport> {
    let mut report = ValidationReport {
        environment: true,
        database: true,
        redis: None,
        payment_provider: true,
        errors: Vec::new(),
    };

    if let Err(e) = validate_env_vars(config) {
        report.environment = false;
        report.errors.push(format!("Environment: {}", e));
    }

    if let Err(e) = validate_database(pool).await {
        report.database = false;
        report.errors.push(format!("Database: {}", e));
    }

    if let Some(url) = &config.redis_url {
        let result = validate_redis(url).await;
        report.redis = Some(result.is_ok());
        if let Err(e) = result {
            report.errors.push(format!("Redis: {}", e));
        }
    }

    // A token exchange proves both reachability and credentials
    if let Err(e) = gateway.access_token().await {
        report.payment_provider = false;
        report.errors.push(format!("Payment provider: {}", e));
    }

    Ok(report)
}

fn validate_env_vars(config: &Config) -> Result<()> {
    if config.database_url.is_empty() {
        anyhow::bail!("DATABASE_URL is empty");
    }
    if config.server_port == 0 {
        anyhow::bail!("SERVER_PORT must be greater than 0");
    }
    if config.paypal.client_id.is_empty() || config.paypal.client_secret.is_empty() {
        anyhow::bail!("PAYPAL_CLIENT_ID and PAYPAL_CLIENT_SECRET must be set");
    }

    url::Url::parse(&config.paypal.base_url).context("PAYPAL_BASE_URL is not a valid URL")?;

    Ok(())
}

async fn validate_database(pool: &PgPool) -> Result<()> {
    sqlx::query("SELECT 1")
        .fetch_one(pool)
        .await
        .context("Failed to connect to database")?;

    let applied: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM _sqlx_migrations")
        .fetch_one(pool)
        .await
        .context("Failed to check migrations table")?;

    if applied == 0 {
        anyhow::bail!("No migrations applied");
    }

    Ok(())
}

async fn validate_redis(redis_url: &str) -> Result<()> {
    IdempotencyService::new(redis_url)
        .context("Invalid Redis URL")?
        .ping()
        .await
        .context("Redis PING failed")
}
