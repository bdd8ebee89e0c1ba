use axum::{
    extract::State,
    http::{Method, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};

use super::auth::USER_ID_HEADER;

const IDEMPOTENCY_TTL: u64 = 86400; // 24 hours in seconds
const PROCESSING_TTL: u64 = 300;
const IDEMPOTENCY_PREFIX: &str = "idempotency:";
const PROCESSING: &str = "PROCESSING";
pub const IDEMPOTENCY_KEY_HEADER: &str = "x-idempotency-key";

/// Replay guard for settlement POSTs, so a retried "pay" or "withdraw" click
/// does not reach the provider twice.
#[derive(Clone)]
pub struct IdempotencyService {
    redis_client: redis::Client,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CachedResponse {
    status: u16,
}

#[derive(Debug)]
pub enum IdempotencyStatus {
    New,
    Processing,
    Completed(CachedResponse),
}

/// Keys are scoped per user and route so one client cannot replay another's.
pub fn cache_key(user_id: Option<&str>, path: &str, key: &str) -> String {
    format!(
        "{}{}:{}:{}",
        IDEMPOTENCY_PREFIX,
        user_id.unwrap_or("anonymous"),
        path,
        key
    )
}

impl IdempotencyService {
    pub fn new(redis_url: &str) -> anyhow::Result<Self> {
        let redis_client = redis::Client::open(redis_url)?;
        Ok(Self { redis_client })
    }

    /// Claims the key, or reports what an earlier request with it left behind.
    pub async fn check_idempotency(&self, key: &str) -> anyhow::Result<IdempotencyStatus> {
        let mut conn = self.redis_client.get_multiplexed_async_connection().await?;

        // SET NX makes the claim atomic across concurrent duplicates
        let claimed: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(PROCESSING)
            .arg("NX")
            .arg("EX")
            .arg(PROCESSING_TTL)
            .query_async(&mut conn)
            .await?;
        if claimed.is_some() {
            return Ok(IdempotencyStatus::New);
        }

        let existing: Option<String> = conn.get(key).await?;
        match existing {
            Some(value) if value != PROCESSING => {
                Ok(IdempotencyStatus::Completed(serde_json::from_str(&value)?))
            }
            _ => Ok(IdempotencyStatus::Processing),
        }
    }

    pub async fn store_response(&self, key: &str, status: u16) -> anyhow::Result<()> {
        let mut conn = self.redis_client.get_multiplexed_async_connection().await?;
        let serialized = serde_json::to_string(&CachedResponse { status })?;
        let _: () = conn.set_ex(key, serialized, IDEMPOTENCY_TTL).await?;
        Ok(())
    }

    /// Frees the key after a failed attempt so the client can retry.
    pub async fn release_lock(&self, key: &str) -> anyhow::Result<()> {
        let mut conn = self.redis_client.get_multiplexed_async_connection().await?;
        let _: () = conn.del(key).await?;
        Ok(())
    }

    pub async fn ping(&self) -> anyhow::Result<()> {
        let mut conn = self.redis_client.get_multiplexed_async_connection().await?;
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }
}

pub async fn idempotency_middleware<B>(
    State(service): State<IdempotencyService>,
    request: Request<B>,
    next: Next<B>,
) -> Response {
    if request.method() != Method::POST {
        return next.run(request).await;
    }

    let idempotency_key = match request.headers().get(IDEMPOTENCY_KEY_HEADER) {
        Some(key) => match key.to_str() {
            Ok(k) if !k.trim().is_empty() => k.trim().to_string(),
            _ => {
                return (
                    StatusCode::BAD_REQUEST,
                    Json(serde_json::json!({
                        "error": "Invalid idempotency key format",
                        "status": 400
                    })),
                )
                    .into_response();
            }
        },
        None => return next.run(request).await,
    };

    let user_id = request
        .headers()
        .get(USER_ID_HEADER)
        .and_then(|v| v.to_str().ok());
    let key = cache_key(user_id, request.uri().path(), &idempotency_key);

    match service.check_idempotency(&key).await {
        Ok(IdempotencyStatus::New) => {
            let response = next.run(request).await;

            // Client errors are final for this key; anything else may be retried
            let outcome = if response.status().is_success() || response.status().is_client_error() {
                service.store_response(&key, response.status().as_u16()).await
            } else {
                service.release_lock(&key).await
            };
            if let Err(e) = outcome {
                tracing::error!(key = %key, error = %e, "Failed to record idempotency outcome");
            }

            response
        }
        Ok(IdempotencyStatus::Processing) => (
            StatusCode::CONFLICT,
            Json(serde_json::json!({
                "error": "Request is currently being processed",
                "status": 409,
                "retry_after": 5
            })),
        )
            .into_response(),
        Ok(IdempotencyStatus::Completed(cached)) => {
            let status = StatusCode::from_u16(cached.status).unwrap_or(StatusCode::OK);
            (
                status,
                Json(serde_json::json!({
                    "cached": true,
                    "message": "Request already processed"
                })),
            )
                .into_response()
        }
        Err(e) => {
            // Redis down: fail open, the settlement core still guards duplicates
            tracing::error!(key = %key, error = %e, "Idempotency check failed");
            next.run(request).await
        }
    }
}
