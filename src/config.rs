use anyhow::Context;
use dotenvy::dotenv;
use serde::Deserialize;
use std::env;

pub const DEFAULT_PAYPAL_BASE_URL: &str = "https://api-m.sandbox.paypal.com";

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct PayPalConfig {
    pub client_id: String,
    pub client_secret: String,
    pub base_url: String,
    pub timeout_secs: u64,
    pub failure_threshold: u32,
    pub reset_timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server_port: u16,
    pub database_url: String,
    pub database_max_connections: u32,
    pub paypal: PayPalConfig,
    pub settlement_currency: String,
    pub redis_url: Option<String>,
    pub log_format: LogFormat,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenv().ok(); // Load .env file if present
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .with_context(|| format!("{} must be set", key))
        };
        let or_default =
            |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let paypal = PayPalConfig {
            client_id: required("PAYPAL_CLIENT_ID")?,
            client_secret: required("PAYPAL_CLIENT_SECRET")?,
            base_url: or_default("PAYPAL_BASE_URL", DEFAULT_PAYPAL_BASE_URL),
            timeout_secs: or_default("PAYMENT_PROVIDER_TIMEOUT_SECS", "30")
                .parse()
                .context("PAYMENT_PROVIDER_TIMEOUT_SECS must be a number of seconds")?,
            failure_threshold: or_default("PAYMENT_PROVIDER_FAILURE_THRESHOLD", "5")
                .parse()
                .context("PAYMENT_PROVIDER_FAILURE_THRESHOLD must be a positive integer")?,
            reset_timeout_secs: or_default("PAYMENT_PROVIDER_RESET_SECS", "60")
                .parse()
                .context("PAYMENT_PROVIDER_RESET_SECS must be a number of seconds")?,
        };

        url::Url::parse(&paypal.base_url).context("PAYPAL_BASE_URL is not a valid URL")?;
        if paypal.timeout_secs == 0 {
            anyhow::bail!("PAYMENT_PROVIDER_TIMEOUT_SECS must be greater than 0");
        }
        if paypal.failure_threshold == 0 {
            anyhow::bail!("PAYMENT_PROVIDER_FAILURE_THRESHOLD must be greater than 0");
        }

        let settlement_currency = or_default("SETTLEMENT_CURRENCY", "USD");
        crate::domain::validate_currency(&settlement_currency)
            .map_err(|e| anyhow::anyhow!("SETTLEMENT_CURRENCY: {}", e))?;

        let log_format = match or_default("LOG_FORMAT", "text").to_ascii_lowercase().as_str() {
            "json" => LogFormat::Json,
            "text" => LogFormat::Text,
            other => anyhow::bail!("LOG_FORMAT must be 'text' or 'json', got {:?}", other),
        };

        Ok(Config {
            server_port: or_default("SERVER_PORT", "3000")
                .parse()
                .context("SERVER_PORT must be a port number")?,
            database_url: required("DATABASE_URL")?,
            database_max_connections: or_default("DATABASE_MAX_CONNECTIONS", "5")
                .parse()
                .context("DATABASE_MAX_CONNECTIONS must be a positive integer")?,
            paypal,
            settlement_currency,
            redis_url: lookup("REDIS_URL").filter(|v| !v.trim().is_empty()),
            log_format,
        })
    }
}
