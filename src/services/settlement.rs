use bigdecimal::BigDecimal;
use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

use super::error::{SettlementError, SettlementResult};
use super::ledger::BalanceLedger;
use super::transactions::{InitiatePayment, PaymentInitiation, TransactionManager};
use super::withdrawals::{WithdrawalManager, WithdrawalReceipt};
use crate::domain::money::to_minor_units;
use crate::domain::{EarningsPeriod, EarningsStats, ReconciliationRecord, Transaction, Withdrawal};
use crate::gateway::PaymentGateway;
use crate::ports::{
    BalanceRepository, PaymentSettlementStore, PayoutAccountDirectory, ReconciliationLog,
    SubmissionDirectory, TransactionRepository, WithdrawalRepository,
};

/// Everything the settlement core needs from the outside world.
#[derive(Clone)]
pub struct SettlementComponents {
    pub transactions: Arc<dyn TransactionRepository>,
    pub withdrawals: Arc<dyn WithdrawalRepository>,
    pub balances: Arc<dyn BalanceRepository>,
    pub submissions: Arc<dyn SubmissionDirectory>,
    pub payout_accounts: Arc<dyn PayoutAccountDirectory>,
    pub reconciliation: Arc<dyn ReconciliationLog>,
    /// When absent, confirm finalizes and credits as two separate writes.
    pub atomic_settlement: Option<Arc<dyn PaymentSettlementStore>>,
    pub gateway: Arc<dyn PaymentGateway>,
    pub currency: String,
}

impl SettlementComponents {
    /// Wires every port to one store that implements all of them.
    pub fn from_store<S>(store: Arc<S>, gateway: Arc<dyn PaymentGateway>, currency: String) -> Self
    where
        S: TransactionRepository
            + WithdrawalRepository
            + BalanceRepository
            + SubmissionDirectory
            + PayoutAccountDirectory
            + ReconciliationLog
            + PaymentSettlementStore
            + 'static,
    {
        Self {
            transactions: store.clone(),
            withdrawals: store.clone(),
            balances: store.clone(),
            submissions: store.clone(),
            payout_accounts: store.clone(),
            reconciliation: store.clone(),
            atomic_settlement: Some(store),
            gateway,
            currency,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BalanceSummary {
    pub balance: i64,
    pub pending_withdrawals: i64,
    pub available: i64,
    /// Lifetime curator payout across succeeded transactions.
    pub total_earnings: i64,
    pub currency: String,
}

/// Single entry point for payments, balance queries and withdrawals.
pub struct SettlementService {
    transactions: TransactionManager,
    withdrawals: WithdrawalManager,
    ledger: BalanceLedger,
    transaction_repo: Arc<dyn TransactionRepository>,
    reconciliation: Arc<dyn ReconciliationLog>,
    gateway: Arc<dyn PaymentGateway>,
    currency: String,
}

impl SettlementService {
    pub fn new(components: SettlementComponents) -> Self {
        let ledger = BalanceLedger::new(components.balances.clone(), components.withdrawals.clone());

        let transactions = TransactionManager::new(
            components.transactions.clone(),
            components.submissions.clone(),
            components.payout_accounts.clone(),
            components.reconciliation.clone(),
            components.atomic_settlement.clone(),
            components.gateway.clone(),
            ledger.clone(),
            components.currency.clone(),
        );

        let withdrawals = WithdrawalManager::new(
            components.withdrawals.clone(),
            components.payout_accounts.clone(),
            components.reconciliation.clone(),
            components.gateway.clone(),
            ledger.clone(),
            components.currency.clone(),
        );

        Self {
            transactions,
            withdrawals,
            ledger,
            transaction_repo: components.transactions,
            reconciliation: components.reconciliation,
            gateway: components.gateway,
            currency: components.currency,
        }
    }

    pub fn currency(&self) -> &str {
        &self.currency
    }

    pub fn gateway(&self) -> &Arc<dyn PaymentGateway> {
        &self.gateway
    }

    pub async fn process_payment(&self, input: InitiatePayment) -> SettlementResult<PaymentInitiation> {
        self.transactions.initiate(input).await
    }

    pub async fn complete_payment(&self, payment_id: &str, payer_id: &str) -> SettlementResult<Transaction> {
        if payment_id.trim().is_empty() || payer_id.trim().is_empty() {
            return Err(SettlementError::Validation(
                "payment id and payer id are required".to_string(),
            ));
        }
        self.transactions.confirm(payment_id, payer_id).await
    }

    pub async fn get_balance(&self, user_id: Uuid) -> SettlementResult<BalanceSummary> {
        let available = self.ledger.get_available(user_id).await?;
        let lifetime = self.transaction_repo.earnings(user_id, None).await?;

        Ok(BalanceSummary {
            balance: available.balance,
            pending_withdrawals: available.pending_withdrawals,
            available: available.available,
            total_earnings: lifetime.creator_payout,
            currency: self.currency.clone(),
        })
    }

    pub async fn get_earnings_stats(
        &self,
        user_id: Uuid,
        period: EarningsPeriod,
    ) -> SettlementResult<EarningsStats> {
        let since = period.since(Utc::now());
        let totals = self.transaction_repo.earnings(user_id, since).await?;

        Ok(EarningsStats {
            period,
            since,
            totals,
            currency: self.currency.clone(),
        })
    }

    /// `amount` is in major units, as entered by the curator.
    pub async fn withdraw(&self, user_id: Uuid, amount: &BigDecimal) -> SettlementResult<WithdrawalReceipt> {
        let minor = to_minor_units(amount)?;
        self.withdrawals.withdraw(user_id, minor).await
    }

    pub async fn list_withdrawals(
        &self,
        user_id: Uuid,
        skip: i64,
        take: i64,
    ) -> SettlementResult<Vec<Withdrawal>> {
        if skip < 0 || take <= 0 {
            return Err(SettlementError::Validation(
                "skip must be >= 0 and take must be > 0".to_string(),
            ));
        }
        self.withdrawals.list(user_id, skip, take).await
    }

    pub async fn list_reconciliation(&self, limit: i64) -> SettlementResult<Vec<ReconciliationRecord>> {
        Ok(self.reconciliation.list(limit).await?)
    }
}
