use clap::{Parser, Subcommand};
use sqlx::PgPool;

use crate::adapters::PgSettlementStore;
use crate::config::Config;
use crate::domain::money::format_minor_units;
use crate::gateway::PayPalGateway;
use crate::ports::ReconciliationLog;

#[derive(Parser)]
#[command(name = "settlement-core")]
#[command(about = "Settlement Core - submission payments, curator balances and payouts", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the HTTP server (default)
    Serve,

    /// Database management commands
    #[command(subcommand)]
    Db(DbCommands),

    /// Validate configuration and check connectivity
    Config,

    /// Inspect settlement steps that need out-of-band correction
    #[command(subcommand)]
    Reconciliation(ReconciliationCommands),
}

#[derive(Subcommand)]
pub enum DbCommands {
    /// Run database migrations
    Migrate,
}

#[derive(Subcommand)]
pub enum ReconciliationCommands {
    /// List reconciliation records, newest first
    List {
        #[arg(short, long, default_value_t = 50)]
        limit: i64,
    },
}

pub async fn handle_db_migrate(config: &Config) -> anyhow::Result<()> {
    let pool = crate::db::create_pool(config).await?;

    tracing::info!("Running database migrations...");
    crate::db::run_migrations(&pool).await?;
    println!("Database migrations completed");

    Ok(())
}

pub async fn handle_config_validate(config: &Config) -> anyhow::Result<()> {
    tracing::info!("Validating configuration...");

    println!("Configuration:");
    println!("  Server Port: {}", config.server_port);
    println!("  Database URL: {}", mask_password(&config.database_url));
    println!("  PayPal Base URL: {}", config.paypal.base_url);
    println!("  PayPal Client ID: {}", mask_secret(&config.paypal.client_id));
    println!("  Provider Timeout: {}s", config.paypal.timeout_secs);
    println!("  Settlement Currency: {}", config.settlement_currency);
    println!(
        "  Redis URL: {}",
        config
            .redis_url
            .as_deref()
            .map(mask_password)
            .unwrap_or_else(|| "(not set)".to_string())
    );

    let pool = crate::db::create_pool(config).await?;
    let gateway = PayPalGateway::new(&config.paypal);
    let report = crate::startup::validate_environment(config, &pool, &gateway).await?;
    report.print();

    if !report.is_valid() {
        anyhow::bail!("Configuration validation failed");
    }

    tracing::info!("Configuration is valid");
    Ok(())
}

pub async fn handle_reconciliation_list(pool: &PgPool, limit: i64) -> anyhow::Result<()> {
    if limit <= 0 {
        anyhow::bail!("--limit must be greater than 0");
    }

    let store = PgSettlementStore::new(pool.clone());
    let records = store.list(limit).await?;

    if records.is_empty() {
        println!("No reconciliation records");
        return Ok(());
    }

    println!(
        "{:<38} {:<24} {:<38} {:<38} {:>12}  {:<20}",
        "Id", "Kind", "Reference", "User", "Amount", "Created"
    );
    println!("{}", "-".repeat(176));
    for record in records {
        println!(
            "{:<38} {:<24} {:<38} {:<38} {:>12}  {:<20}",
            record.id,
            record.kind,
            record.reference_id,
            record.user_id,
            format_minor_units(record.amount),
            record.created_at.format("%Y-%m-%d %H:%M:%S"),
        );
        println!("    reason: {}", record.reason);
    }

    Ok(())
}

fn mask_password(url: &str) -> String {
    if let Some(at_pos) = url.rfind('@') {
        if let Some(colon_pos) = url[..at_pos].rfind(':') {
            if let Some(slash_pos) = url[..colon_pos].rfind("//") {
                let prefix = &url[..slash_pos + 2];
                let user_start = slash_pos + 2;
                let user = &url[user_start..colon_pos];
                let suffix = &url[at_pos..];
                return format!("{}{}:****{}", prefix, user, suffix);
            }
        }
    }
    url.to_string()
}

fn mask_secret(value: &str) -> String {
    let visible: String = value.chars().take(4).collect();
    if value.chars().count() <= 4 {
        "****".to_string()
    } else {
        format!("{}****", visible)
    }
}
