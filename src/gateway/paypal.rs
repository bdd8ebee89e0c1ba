use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use failsafe::futures::CircuitBreaker as FuturesCircuitBreaker;
use failsafe::{backoff, failure_policy, Config, Error as FailsafeError, StateMachine};
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::Deserialize;
use serde_json::json;
use std::future::Future;
use std::time::Duration;
use tokio::sync::RwLock;

use super::{
    CreatePayment, CreatePayout, CreatedPayment, CreatedPayout, ExecutedPayment, GatewayError,
    GatewayResult, PaymentGateway,
};
use crate::config::PayPalConfig;
use crate::domain::money::format_minor_units;

type Breaker = StateMachine<failure_policy::ConsecutiveFailures<backoff::EqualJittered>, ()>;

#[derive(Debug, Clone)]
struct CachedToken {
    token: String,
    expires_at: DateTime<Utc>,
}

/// PayPal REST v1 client: hosted-checkout payments and payouts.
pub struct PayPalGateway {
    client: Client,
    base_url: String,
    client_id: String,
    client_secret: String,
    circuit_breaker: Breaker,
    token: RwLock<Option<CachedToken>>,
}

impl PayPalGateway {
    pub fn new(config: &PayPalConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_default();

        let backoff = backoff::equal_jittered(
            Duration::from_secs(config.reset_timeout_secs),
            Duration::from_secs(config.reset_timeout_secs * 2),
        );
        let policy = failure_policy::consecutive_failures(config.failure_threshold, backoff);
        let circuit_breaker = Config::new().failure_policy(policy).build();

        PayPalGateway {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            circuit_breaker,
            token: RwLock::new(None),
        }
    }

    /// Runs a provider call through the circuit breaker. Only outages count
    /// as failures; business rejections leave the breaker closed.
    async fn guarded<T, F>(&self, call: F) -> GatewayResult<T>
    where
        F: Future<Output = GatewayResult<T>>,
    {
        let result = self
            .circuit_breaker
            .call_with(|e: &GatewayError| e.is_outage(), call)
            .await;

        match result {
            Ok(value) => Ok(value),
            Err(FailsafeError::Rejected) => Err(GatewayError::CircuitOpen(
                "payment provider circuit breaker is open".to_string(),
            )),
            Err(FailsafeError::Inner(e)) => Err(e),
        }
    }

    async fn fetch_token(&self) -> GatewayResult<String> {
        {
            let cached = self.token.read().await;
            if let Some(ref t) = *cached {
                if t.expires_at > Utc::now() {
                    return Ok(t.token.clone());
                }
            }
        }

        let credentials = STANDARD.encode(format!("{}:{}", self.client_id, self.client_secret));
        let response = self
            .client
            .post(format!("{}/v1/oauth2/token", self.base_url))
            .header("Authorization", format!("Basic {}", credentials))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await?;

        let status = response.status();
        if status.is_server_error() {
            return Err(error_from_response(response).await);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = status.as_u16(), "PayPal token request rejected");
            return Err(GatewayError::Auth(format!(
                "token request returned {}: {}",
                status.as_u16(),
                body
            )));
        }

        let token: TokenResponse = response.json().await?;
        // Refresh a minute early so an in-flight call never carries an expired token
        let lifetime = (token.expires_in as i64 - 60).max(0);
        let mut cached = self.token.write().await;
        *cached = Some(CachedToken {
            token: token.access_token.clone(),
            expires_at: Utc::now() + ChronoDuration::seconds(lifetime),
        });

        Ok(token.access_token)
    }

    async fn authorized(&self, method: Method, path: &str) -> GatewayResult<RequestBuilder> {
        let token = self.fetch_token().await?;
        Ok(self
            .client
            .request(method, format!("{}{}", self.base_url, path))
            .bearer_auth(token))
    }
}

#[async_trait]
impl PaymentGateway for PayPalGateway {
    async fn access_token(&self) -> GatewayResult<String> {
        self.guarded(self.fetch_token()).await
    }

    async fn create_payment(&self, request: &CreatePayment) -> GatewayResult<CreatedPayment> {
        let body = json!({
            "intent": "sale",
            "payer": { "payment_method": "paypal" },
            "redirect_urls": {
                "return_url": request.return_url,
                "cancel_url": request.cancel_url,
            },
            "transactions": [{
                "amount": {
                    "total": format_minor_units(request.amount_minor),
                    "currency": request.currency,
                },
                "description": request.description,
            }],
        });

        self.guarded(async {
            let response = self
                .authorized(Method::POST, "/v1/payments/payment")
                .await?
                .json(&body)
                .send()
                .await?;
            let raw = success_body(response).await?;

            let payment: PaymentResponse = parse(&raw)?;
            let approval_url = payment
                .links
                .iter()
                .find(|link| link.rel == "approval_url")
                .map(|link| link.href.clone())
                .ok_or_else(|| {
                    GatewayError::InvalidResponse(format!(
                        "payment {} has no approval_url link",
                        payment.id
                    ))
                })?;

            tracing::info!(payment_id = %payment.id, "PayPal payment created");
            Ok(CreatedPayment {
                id: payment.id,
                approval_url,
                raw,
            })
        })
        .await
    }

    async fn execute_payment(
        &self,
        payment_id: &str,
        payer_id: &str,
    ) -> GatewayResult<ExecutedPayment> {
        let path = format!("/v1/payments/payment/{}/execute", payment_id);
        let body = json!({ "payer_id": payer_id });

        self.guarded(async {
            let response = self
                .authorized(Method::POST, &path)
                .await?
                .json(&body)
                .send()
                .await?;
            let raw = success_body(response).await?;
            let executed: ExecuteResponse = parse(&raw)?;

            tracing::info!(payment_id, state = %executed.state, "PayPal payment executed");
            Ok(ExecutedPayment {
                state: executed.state,
                raw,
            })
        })
        .await
    }

    async fn create_payout(&self, request: &CreatePayout) -> GatewayResult<CreatedPayout> {
        let body = json!({
            "sender_batch_header": {
                "sender_batch_id": request.sender_batch_id,
                "email_subject": "You have a payout!",
                "email_message": request.note,
            },
            "items": [{
                "recipient_type": "EMAIL",
                "amount": {
                    "value": format_minor_units(request.amount_minor),
                    "currency": request.currency,
                },
                "note": request.note,
                "sender_item_id": request.sender_batch_id,
                "receiver": request.recipient,
            }],
        });

        self.guarded(async {
            let response = self
                .authorized(Method::POST, "/v1/payments/payouts")
                .await?
                .json(&body)
                .send()
                .await?;
            let raw = success_body(response).await?;
            let payout: PayoutResponse = parse(&raw)?;

            tracing::info!(
                batch_id = %payout.batch_header.payout_batch_id,
                batch_status = payout.batch_header.batch_status.as_deref().unwrap_or("unknown"),
                "PayPal payout submitted"
            );
            Ok(CreatedPayout {
                batch_id: payout.batch_header.payout_batch_id,
                raw,
            })
        })
        .await
    }

    fn circuit_state(&self) -> &'static str {
        if self.circuit_breaker.is_call_permitted() {
            "closed"
        } else {
            "open"
        }
    }
}

async fn success_body(response: Response) -> GatewayResult<serde_json::Value> {
    if !response.status().is_success() {
        return Err(error_from_response(response).await);
    }
    Ok(response.json().await?)
}

async fn error_from_response(response: Response) -> GatewayError {
    let status = response.status().as_u16();
    let text = response.text().await.unwrap_or_default();
    let parsed: Option<ErrorResponse> = serde_json::from_str(&text).ok();

    let (code, message) = match parsed {
        Some(err) => (
            err.name.unwrap_or_else(|| format!("HTTP_{}", status)),
            err.message.unwrap_or_default(),
        ),
        None => (format!("HTTP_{}", status), text),
    };

    tracing::warn!(status, code = %code, "PayPal request failed");
    GatewayError::Request {
        status,
        code,
        message,
    }
}

fn parse<T: for<'de> Deserialize<'de>>(raw: &serde_json::Value) -> GatewayResult<T> {
    serde_json::from_value(raw.clone()).map_err(|e| GatewayError::InvalidResponse(e.to_string()))
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

#[derive(Debug, Deserialize)]
struct Link {
    href: String,
    rel: String,
}

#[derive(Debug, Deserialize)]
struct PaymentResponse {
    id: String,
    #[serde(default)]
    links: Vec<Link>,
}

#[derive(Debug, Deserialize)]
struct ExecuteResponse {
    state: String,
}

#[derive(Debug, Deserialize)]
struct BatchHeader {
    payout_batch_id: String,
    batch_status: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PayoutResponse {
    batch_header: BatchHeader,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    name: Option<String>,
    message: Option<String>,
}
