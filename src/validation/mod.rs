use bigdecimal::BigDecimal;
use std::fmt;

pub const PAYMENT_METHOD_ID_MAX_LEN: usize = 64;
pub const PROVIDER_ID_MAX_LEN: usize = 128;
pub const REDIRECT_URL_MAX_LEN: usize = 2048;
/// Minor units carry two decimal places.
pub const AMOUNT_MAX_SCALE: i64 = 2;
pub const DEFAULT_PAGE_SIZE: i64 = 20;
pub const MAX_PAGE_SIZE: i64 = 100;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl std::error::Error for ValidationError {}

pub type ValidationResult = Result<(), ValidationError>;

pub fn sanitize_string(value: &str) -> String {
    value
        .chars()
        .filter(|ch| !ch.is_control())
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn validate_required(field: &'static str, value: &str) -> ValidationResult {
    if value.trim().is_empty() {
        return Err(ValidationError::new(field, "must not be empty"));
    }

    Ok(())
}

pub fn validate_max_len(field: &'static str, value: &str, max_len: usize) -> ValidationResult {
    if value.len() > max_len {
        return Err(ValidationError::new(
            field,
            format!("must be at most {} characters", max_len),
        ));
    }

    Ok(())
}

/// Provider identifiers (payment id, payer id, payment method) are opaque
/// tokens: no whitespace or control characters.
pub fn validate_token(field: &'static str, value: &str, max_len: usize) -> ValidationResult {
    validate_required(field, value)?;
    validate_max_len(field, value, max_len)?;

    if value.chars().any(|ch| ch.is_whitespace() || ch.is_control()) {
        return Err(ValidationError::new(field, "must not contain whitespace"));
    }

    Ok(())
}

pub fn validate_redirect_url(field: &'static str, value: &str) -> ValidationResult {
    validate_required(field, value)?;
    validate_max_len(field, value, REDIRECT_URL_MAX_LEN)?;

    let parsed =
        url::Url::parse(value).map_err(|_| ValidationError::new(field, "must be an absolute URL"))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(ValidationError::new(field, "must use http or https"));
    }

    Ok(())
}

pub fn validate_withdrawal_amount(amount: &BigDecimal) -> ValidationResult {
    if amount <= &BigDecimal::from(0) {
        return Err(ValidationError::new("amount", "must be greater than zero"));
    }

    if amount.with_scale(AMOUNT_MAX_SCALE) != *amount {
        return Err(ValidationError::new(
            "amount",
            format!("must have at most {} decimal places", AMOUNT_MAX_SCALE),
        ));
    }

    Ok(())
}

/// Resolves optional `skip`/`take` query values to a bounded page.
pub fn resolve_page(skip: Option<i64>, take: Option<i64>) -> Result<(i64, i64), ValidationError> {
    let skip = skip.unwrap_or(0);
    let take = take.unwrap_or(DEFAULT_PAGE_SIZE);

    if skip < 0 {
        return Err(ValidationError::new("skip", "must not be negative"));
    }
    if !(1..=MAX_PAGE_SIZE).contains(&take) {
        return Err(ValidationError::new(
            "take",
            format!("must be between 1 and {}", MAX_PAGE_SIZE),
        ));
    }

    Ok((skip, take))
}
