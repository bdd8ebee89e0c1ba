//! Balance ledger: the only writer of a curator's stored balance.

use std::sync::Arc;
use uuid::Uuid;

use super::error::{SettlementError, SettlementResult};
use crate::ports::{BalanceRepository, WithdrawalRepository};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AvailableBalance {
    pub balance: i64,
    pub pending_withdrawals: i64,
    pub available: i64,
}

impl AvailableBalance {
    pub fn new(balance: i64, pending_withdrawals: i64) -> Self {
        Self {
            balance,
            pending_withdrawals,
            available: balance - pending_withdrawals,
        }
    }
}

#[derive(Clone)]
pub struct BalanceLedger {
    balances: Arc<dyn BalanceRepository>,
    withdrawals: Arc<dyn WithdrawalRepository>,
}

impl BalanceLedger {
    pub fn new(
        balances: Arc<dyn BalanceRepository>,
        withdrawals: Arc<dyn WithdrawalRepository>,
    ) -> Self {
        Self {
            balances,
            withdrawals,
        }
    }

    /// Adds `amount` minor units and returns the new balance. Callers credit at
    /// most once per triggering event.
    pub async fn credit(&self, user_id: Uuid, amount: i64) -> SettlementResult<i64> {
        if amount <= 0 {
            return Err(SettlementError::InvariantViolation(format!(
                "credit amount must be positive, got {}",
                amount
            )));
        }

        let balance = self.balances.increment(user_id, amount).await?;
        tracing::info!(%user_id, amount_minor = amount, balance_minor = balance, "Balance credited");
        Ok(balance)
    }

    pub async fn get_available(&self, user_id: Uuid) -> SettlementResult<AvailableBalance> {
        let balance = self.balances.balance(user_id).await?;
        let in_flight = self.withdrawals.in_flight_total(user_id).await?;
        Ok(AvailableBalance::new(balance, in_flight))
    }

    /// Removes `amount` minor units. Fails fast instead of clamping if the
    /// balance would go negative.
    pub async fn debit(&self, user_id: Uuid, amount: i64) -> SettlementResult<i64> {
        if amount <= 0 {
            return Err(SettlementError::InvariantViolation(format!(
                "debit amount must be positive, got {}",
                amount
            )));
        }

        match self.balances.decrement_if_sufficient(user_id, amount).await? {
            Some(balance) => {
                tracing::info!(%user_id, amount_minor = amount, balance_minor = balance, "Balance debited");
                Ok(balance)
            }
            None => {
                tracing::error!(%user_id, amount_minor = amount, "Debit would make balance negative");
                Err(SettlementError::InvariantViolation(format!(
                    "debit of {} would make balance of user {} negative",
                    amount, user_id
                )))
            }
        }
    }
}
