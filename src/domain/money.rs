//! Minor-unit money arithmetic.
//!
//! Every stored amount is an `i64` count of minor units (cents). Decimal major
//! units only appear at the edges: submission fees read from the catalogue,
//! REST bodies, and the provider's `"10.00"` string format.

use bigdecimal::{BigDecimal, ToPrimitive, Zero};

use super::DomainError;

/// Platform commission taken from every submission fee.
pub const PLATFORM_FEE_PERCENT: i64 = 5;

const MINOR_PER_MAJOR: i64 = 100;

/// Converts a major-unit decimal to minor units, rounding half away from zero
/// at the second decimal place.
pub fn to_minor_units(amount: &BigDecimal) -> Result<i64, DomainError> {
    let scaled = amount.clone() * BigDecimal::from(MINOR_PER_MAJOR);
    let truncated = scaled.with_scale(0);
    let remainder = (&scaled - &truncated).abs();

    let half = BigDecimal::new(5i32.into(), 1);
    let rounded = if remainder >= half {
        if scaled < BigDecimal::zero() {
            truncated - BigDecimal::from(1)
        } else {
            truncated + BigDecimal::from(1)
        }
    } else {
        truncated
    };

    rounded
        .to_i64()
        .ok_or_else(|| DomainError::InvalidAmount(format!("{} is out of range", amount)))
}

/// Converts minor units back to a two-decimal major-unit value.
pub fn from_minor_units(minor: i64) -> BigDecimal {
    (BigDecimal::from(minor) / BigDecimal::from(MINOR_PER_MAJOR)).with_scale(2)
}

/// Provider wire format: plain decimal string with exactly two places.
pub fn format_minor_units(minor: i64) -> String {
    let sign = if minor < 0 { "-" } else { "" };
    let abs = minor.unsigned_abs();
    format!(
        "{}{}.{:02}",
        sign,
        abs / MINOR_PER_MAJOR as u64,
        abs % MINOR_PER_MAJOR as u64
    )
}

/// How a submission fee is divided between the platform and the curator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeeSplit {
    pub amount_total: i64,
    pub platform_fee: i64,
    pub creator_payout: i64,
}

impl FeeSplit {
    pub fn from_total(amount_total: i64) -> Result<Self, DomainError> {
        if amount_total <= 0 {
            return Err(DomainError::InvalidAmount(format!(
                "submission fee must be positive, got {} minor units",
                amount_total
            )));
        }

        // round(total * 5%) with halves rounded up; total is positive here
        let platform_fee = (amount_total * PLATFORM_FEE_PERCENT + 50) / 100;
        let split = Self {
            amount_total,
            platform_fee,
            creator_payout: amount_total - platform_fee,
        };
        split.check()?;
        Ok(split)
    }

    /// `amount_total == platform_fee + creator_payout`, with no negative part.
    pub fn check(&self) -> Result<(), DomainError> {
        if self.platform_fee < 0 || self.creator_payout < 0 {
            return Err(DomainError::InvariantViolation(
                "fee split parts must not be negative".to_string(),
            ));
        }
        if self.platform_fee + self.creator_payout != self.amount_total {
            return Err(DomainError::InvariantViolation(format!(
                "amount_total {} != platform_fee {} + creator_payout {}",
                self.amount_total, self.platform_fee, self.creator_payout
            )));
        }
        Ok(())
    }
}
