use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use super::DomainError;

/// Rolling window used for curator earnings statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EarningsPeriod {
    Week,
    #[default]
    Month,
    Year,
    All,
}

impl EarningsPeriod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Week => "week",
            Self::Month => "month",
            Self::Year => "year",
            Self::All => "all",
        }
    }

    /// Start of the window ending at `now`; `None` means all time.
    pub fn since(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            Self::Week => Some(now - Duration::days(7)),
            Self::Month => Some(now - Duration::days(30)),
            Self::Year => Some(now - Duration::days(365)),
            Self::All => None,
        }
    }
}

impl FromStr for EarningsPeriod {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "week" => Ok(Self::Week),
            "month" => Ok(Self::Month),
            "year" => Ok(Self::Year),
            "all" => Ok(Self::All),
            other => Err(DomainError::InvariantViolation(format!(
                "unknown earnings period {:?}",
                other
            ))),
        }
    }
}

/// Aggregates over a curator's succeeded transactions, in minor units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EarningsTotals {
    pub creator_payout: i64,
    pub platform_fees: i64,
    pub transaction_count: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EarningsStats {
    pub period: EarningsPeriod,
    pub since: Option<DateTime<Utc>>,
    pub totals: EarningsTotals,
    pub currency: String,
}
