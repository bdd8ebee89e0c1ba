//! Payment provider gateway.
//!
//! Amounts cross this boundary as integer minor units; conversion to the
//! provider's decimal strings happens inside the implementation.

pub mod paypal;

use async_trait::async_trait;
use thiserror::Error;

pub use paypal::PayPalGateway;

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("provider authentication failed: {0}")]
    Auth(String),

    #[error("provider rejected request ({status} {code}): {message}")]
    Request {
        status: u16,
        code: String,
        message: String,
    },

    #[error("provider unreachable: {0}")]
    Transport(String),

    #[error("invalid response from provider: {0}")]
    InvalidResponse(String),

    #[error("circuit breaker open: {0}")]
    CircuitOpen(String),
}

impl From<reqwest::Error> for GatewayError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            GatewayError::Transport(format!("request timed out: {}", e))
        } else if e.is_decode() {
            GatewayError::InvalidResponse(e.to_string())
        } else {
            GatewayError::Transport(e.to_string())
        }
    }
}

/// Coarse classification of provider failures, used to pick user-facing
/// wording and HTTP status. Nothing is retried automatically.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderErrorKind {
    RateLimited,
    Duplicate,
    Declined,
    Rejected,
    Unavailable,
    Auth,
}

impl GatewayError {
    pub fn kind(&self) -> ProviderErrorKind {
        match self {
            GatewayError::Auth(_) => ProviderErrorKind::Auth,
            GatewayError::Transport(_)
            | GatewayError::InvalidResponse(_)
            | GatewayError::CircuitOpen(_) => ProviderErrorKind::Unavailable,
            GatewayError::Request { status, code, .. } => match code.as_str() {
                "RATE_LIMIT_REACHED" => ProviderErrorKind::RateLimited,
                "DUPLICATE_TRANSACTION" | "DUPLICATE_REQUEST_ID" => ProviderErrorKind::Duplicate,
                "INSTRUMENT_DECLINED" | "PAYER_CANNOT_PAY" | "TRANSACTION_REFUSED" => {
                    ProviderErrorKind::Declined
                }
                c if c.starts_with("RISK_") => ProviderErrorKind::Declined,
                _ if *status == 429 => ProviderErrorKind::RateLimited,
                _ if *status >= 500 => ProviderErrorKind::Unavailable,
                _ => ProviderErrorKind::Rejected,
            },
        }
    }

    /// The end user may simply try again with a new request.
    pub fn is_transient(&self) -> bool {
        matches!(
            self.kind(),
            ProviderErrorKind::RateLimited | ProviderErrorKind::Unavailable
        )
    }

    /// Counts toward opening the circuit breaker.
    pub fn is_outage(&self) -> bool {
        match self {
            GatewayError::Transport(_) => true,
            GatewayError::Request { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Provider-supplied message, when there is one safe to show.
    pub fn provider_message(&self) -> String {
        match self {
            GatewayError::Request { message, .. } if !message.is_empty() => message.clone(),
            GatewayError::Request { code, .. } => code.clone(),
            other => other.to_string(),
        }
    }

    pub fn user_message(&self) -> &'static str {
        if self.is_transient() {
            "The payment provider is temporarily unavailable, please try again"
        } else {
            "The payment could not be processed, please contact support"
        }
    }
}

pub type GatewayResult<T> = Result<T, GatewayError>;

#[derive(Debug, Clone)]
pub struct CreatePayment {
    pub amount_minor: i64,
    pub currency: String,
    pub description: String,
    pub return_url: String,
    pub cancel_url: String,
}

#[derive(Debug, Clone)]
pub struct CreatedPayment {
    pub id: String,
    pub approval_url: String,
    pub raw: serde_json::Value,
}

#[derive(Debug, Clone)]
pub struct ExecutedPayment {
    pub state: String,
    pub raw: serde_json::Value,
}

impl ExecutedPayment {
    pub fn is_approved(&self) -> bool {
        self.state.eq_ignore_ascii_case("approved")
    }
}

#[derive(Debug, Clone)]
pub struct CreatePayout {
    /// Caller-chosen idempotency id for the batch.
    pub sender_batch_id: String,
    pub recipient: String,
    pub amount_minor: i64,
    pub currency: String,
    pub note: String,
}

#[derive(Debug, Clone)]
pub struct CreatedPayout {
    pub batch_id: String,
    pub raw: serde_json::Value,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn access_token(&self) -> GatewayResult<String>;

    async fn create_payment(&self, request: &CreatePayment) -> GatewayResult<CreatedPayment>;

    async fn execute_payment(&self, payment_id: &str, payer_id: &str)
        -> GatewayResult<ExecutedPayment>;

    async fn create_payout(&self, request: &CreatePayout) -> GatewayResult<CreatedPayout>;

    /// `"closed"` while calls are permitted.
    fn circuit_state(&self) -> &'static str {
        "closed"
    }
}
