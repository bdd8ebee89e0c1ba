//! In-process store implementing every settlement port.
//!
//! One mutex guards all state, so each port call is atomic the same way a
//! single Postgres statement or transaction is.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

use crate::domain::{
    EarningsTotals, ReconciliationRecord, Submission, Transaction, TransactionStatus, Withdrawal,
};
use crate::ports::{
    BalanceRepository, PaymentSettlementStore, PayoutAccountDirectory, ReconciliationLog, RepositoryError,
    RepositoryResult, Reservation, SubmissionDirectory, TransactionRepository,
    WithdrawalRepository,
};

#[derive(Default)]
struct State {
    balances: HashMap<Uuid, i64>,
    payout_accounts: HashMap<Uuid, String>,
    submissions: HashMap<Uuid, Submission>,
    transactions: HashMap<Uuid, Transaction>,
    withdrawals: HashMap<Uuid, Withdrawal>,
    reconciliation: Vec<ReconciliationRecord>,
}

impl State {
    fn balance(&self, user_id: Uuid) -> RepositoryResult<i64> {
        self.balances
            .get(&user_id)
            .copied()
            .ok_or_else(|| RepositoryError::NotFound(format!("user {}", user_id)))
    }

    fn in_flight(&self, user_id: Uuid) -> i64 {
        self.withdrawals
            .values()
            .filter(|w| w.user_id == user_id && w.status.is_in_flight())
            .map(|w| w.amount)
            .sum()
    }
}

#[derive(Default)]
pub struct InMemorySettlementStore {
    state: Mutex<State>,
}

impl InMemorySettlementStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn add_user(&self, user_id: Uuid, balance: i64) {
        self.state().balances.insert(user_id, balance);
    }

    pub fn link_payout_account(&self, user_id: Uuid, email: impl Into<String>) {
        self.state().payout_accounts.insert(user_id, email.into());
    }

    pub fn add_submission(&self, submission: Submission) {
        self.state().submissions.insert(submission.id, submission);
    }

    pub fn submission_status(&self, id: Uuid) -> Option<String> {
        self.state().submissions.get(&id).map(|s| s.status.clone())
    }
}

#[async_trait]
impl TransactionRepository for InMemorySettlementStore {
    async fn insert(&self, tx: &Transaction) -> RepositoryResult<Transaction> {
        let mut state = self.state();
        let duplicate = state.transactions.values().any(|existing| {
            existing.submission_id == tx.submission_id
                || (tx.provider_transaction_id.is_some()
                    && existing.provider_transaction_id == tx.provider_transaction_id)
        });
        if duplicate {
            return Err(RepositoryError::Conflict(format!(
                "submission {} already has a transaction",
                tx.submission_id
            )));
        }
        state.transactions.insert(tx.id, tx.clone());
        Ok(tx.clone())
    }

    async fn get_by_id(&self, id: Uuid) -> RepositoryResult<Transaction> {
        self.state()
            .transactions
            .get(&id)
            .cloned()
            .ok_or_else(|| RepositoryError::NotFound(format!("transaction {}", id)))
    }

    async fn find_by_submission(&self, submission_id: Uuid) -> RepositoryResult<Option<Transaction>> {
        Ok(self
            .state()
            .transactions
            .values()
            .find(|t| t.submission_id == submission_id)
            .cloned())
    }

    async fn find_by_provider_id(&self, provider_id: &str) -> RepositoryResult<Option<Transaction>> {
        Ok(self
            .state()
            .transactions
            .values()
            .find(|t| t.provider_transaction_id.as_deref() == Some(provider_id))
            .cloned())
    }

    async fn finalize(
        &self,
        id: Uuid,
        status: TransactionStatus,
    ) -> RepositoryResult<Option<Transaction>> {
        let mut state = self.state();
        let tx = state
            .transactions
            .get_mut(&id)
            .ok_or_else(|| RepositoryError::NotFound(format!("transaction {}", id)))?;

        if tx.status != TransactionStatus::Pending {
            return Ok(None);
        }
        tx.transition(status)
            .map_err(|e| RepositoryError::Database(e.to_string()))?;
        Ok(Some(tx.clone()))
    }

    async fn earnings(
        &self,
        payee_id: Uuid,
        since: Option<DateTime<Utc>>,
    ) -> RepositoryResult<EarningsTotals> {
        let state = self.state();
        let totals = state
            .transactions
            .values()
            .filter(|t| t.payee_id == payee_id && t.status == TransactionStatus::Succeeded)
            .filter(|t| since.map_or(true, |since| t.updated_at >= since))
            .fold(EarningsTotals::default(), |mut acc, t| {
                acc.creator_payout += t.creator_payout_amount;
                acc.platform_fees += t.platform_fee;
                acc.transaction_count += 1;
                acc
            });
        Ok(totals)
    }
}

#[async_trait]
impl PaymentSettlementStore for InMemorySettlementStore {
    async fn finalize_and_credit(&self, id: Uuid) -> RepositoryResult<Option<Transaction>> {
        let mut state = self.state();
        let mut settled = match state.transactions.get(&id) {
            Some(tx) if tx.status == TransactionStatus::Pending => tx.clone(),
            Some(_) => return Ok(None),
            None => return Err(RepositoryError::NotFound(format!("transaction {}", id))),
        };
        if !state.balances.contains_key(&settled.payee_id) {
            return Err(RepositoryError::NotFound(format!("user {}", settled.payee_id)));
        }

        settled
            .transition(TransactionStatus::Succeeded)
            .map_err(|e| RepositoryError::Database(e.to_string()))?;
        if let Some(balance) = state.balances.get_mut(&settled.payee_id) {
            *balance += settled.creator_payout_amount;
        }
        state.transactions.insert(id, settled.clone());
        Ok(Some(settled))
    }
}

#[async_trait]
impl WithdrawalRepository for InMemorySettlementStore {
    async fn reserve(&self, withdrawal: &Withdrawal) -> RepositoryResult<Reservation> {
        let mut state = self.state();
        let balance = state.balance(withdrawal.user_id)?;
        let in_flight = state.in_flight(withdrawal.user_id);

        if balance - in_flight < withdrawal.amount {
            return Ok(Reservation::Insufficient { balance, in_flight });
        }
        state.withdrawals.insert(withdrawal.id, withdrawal.clone());
        Ok(Reservation::Reserved(withdrawal.clone()))
    }

    async fn update(&self, withdrawal: &Withdrawal) -> RepositoryResult<Withdrawal> {
        let mut state = self.state();
        let stored = state
            .withdrawals
            .get_mut(&withdrawal.id)
            .ok_or_else(|| RepositoryError::NotFound(format!("withdrawal {}", withdrawal.id)))?;
        *stored = withdrawal.clone();
        Ok(withdrawal.clone())
    }

    async fn get_by_id(&self, id: Uuid) -> RepositoryResult<Withdrawal> {
        self.state()
            .withdrawals
            .get(&id)
            .cloned()
            .ok_or_else(|| RepositoryError::NotFound(format!("withdrawal {}", id)))
    }

    async fn list_for_user(
        &self,
        user_id: Uuid,
        skip: i64,
        take: i64,
    ) -> RepositoryResult<Vec<Withdrawal>> {
        let state = self.state();
        let mut withdrawals: Vec<Withdrawal> = state
            .withdrawals
            .values()
            .filter(|w| w.user_id == user_id)
            .cloned()
            .collect();
        withdrawals.sort_by(|a, b| b.requested_at.cmp(&a.requested_at).then(b.id.cmp(&a.id)));

        Ok(withdrawals
            .into_iter()
            .skip(skip.max(0) as usize)
            .take(take.max(0) as usize)
            .collect())
    }

    async fn in_flight_total(&self, user_id: Uuid) -> RepositoryResult<i64> {
        Ok(self.state().in_flight(user_id))
    }
}

#[async_trait]
impl BalanceRepository for InMemorySettlementStore {
    async fn balance(&self, user_id: Uuid) -> RepositoryResult<i64> {
        self.state().balance(user_id)
    }

    async fn increment(&self, user_id: Uuid, amount: i64) -> RepositoryResult<i64> {
        let mut state = self.state();
        let balance = state
            .balances
            .get_mut(&user_id)
            .ok_or_else(|| RepositoryError::NotFound(format!("user {}", user_id)))?;
        *balance += amount;
        Ok(*balance)
    }

    async fn decrement_if_sufficient(
        &self,
        user_id: Uuid,
        amount: i64,
    ) -> RepositoryResult<Option<i64>> {
        let mut state = self.state();
        let balance = state
            .balances
            .get_mut(&user_id)
            .ok_or_else(|| RepositoryError::NotFound(format!("user {}", user_id)))?;
        if *balance < amount {
            return Ok(None);
        }
        *balance -= amount;
        Ok(Some(*balance))
    }
}

#[async_trait]
impl SubmissionDirectory for InMemorySettlementStore {
    async fn get_submission(&self, id: Uuid) -> RepositoryResult<Option<Submission>> {
        Ok(self.state().submissions.get(&id).cloned())
    }

    async fn mark_pending_review(&self, id: Uuid) -> RepositoryResult<()> {
        let mut state = self.state();
        let submission = state
            .submissions
            .get_mut(&id)
            .ok_or_else(|| RepositoryError::NotFound(format!("submission {}", id)))?;
        submission.status = "pending".to_string();
        Ok(())
    }
}

#[async_trait]
impl PayoutAccountDirectory for InMemorySettlementStore {
    async fn payout_address(&self, user_id: Uuid) -> RepositoryResult<Option<String>> {
        Ok(self.state().payout_accounts.get(&user_id).cloned())
    }
}

#[async_trait]
impl ReconciliationLog for InMemorySettlementStore {
    async fn record(&self, record: &ReconciliationRecord) -> RepositoryResult<()> {
        self.state().reconciliation.push(record.clone());
        Ok(())
    }

    async fn list(&self, limit: i64) -> RepositoryResult<Vec<ReconciliationRecord>> {
        Ok(self
            .state()
            .reconciliation
            .iter()
            .rev()
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::FeeSplit;

    #[tokio::test]
    async fn test_reserve_counts_in_flight_withdrawals() {
        let store = InMemorySettlementStore::new();
        let user = Uuid::new_v4();
        store.add_user(user, 100);

        let first = Withdrawal::pending(user, 60, "USD".to_string()).unwrap();
        let second = Withdrawal::pending(user, 60, "USD".to_string()).unwrap();

        assert!(matches!(store.reserve(&first).await.unwrap(), Reservation::Reserved(_)));
        match store.reserve(&second).await.unwrap() {
            Reservation::Insufficient { balance, in_flight } => {
                assert_eq!(balance, 100);
                assert_eq!(in_flight, 60);
            }
            other => panic!("expected insufficient, got {:?}", other),
        }
        assert_eq!(store.in_flight_total(user).await.unwrap(), 60);
    }

    #[tokio::test]
    async fn test_finalize_writes_terminal_state_once() {
        let store = InMemorySettlementStore::new();
        let tx = Transaction::pending(
            Uuid::new_v4(),
            "paypal".to_string(),
            Uuid::new_v4(),
            Uuid::new_v4(),
            FeeSplit::from_total(1000).unwrap(),
            "USD".to_string(),
        )
        .unwrap();
        store.insert(&tx).await.unwrap();

        let settled = store.finalize(tx.id, TransactionStatus::Succeeded).await.unwrap();
        assert_eq!(settled.unwrap().status, TransactionStatus::Succeeded);
        assert!(store.finalize(tx.id, TransactionStatus::Failed).await.unwrap().is_none());
        assert_eq!(
            TransactionRepository::get_by_id(&store, tx.id).await.unwrap().status,
            TransactionStatus::Succeeded
        );
    }

    #[tokio::test]
    async fn test_duplicate_submission_conflicts() {
        let store = InMemorySettlementStore::new();
        let submission_id = Uuid::new_v4();
        let make = || {
            Transaction::pending(
                submission_id,
                "paypal".to_string(),
                Uuid::new_v4(),
                Uuid::new_v4(),
                FeeSplit::from_total(500).unwrap(),
                "USD".to_string(),
            )
            .unwrap()
        };

        store.insert(&make()).await.unwrap();
        assert!(matches!(
            store.insert(&make()).await,
            Err(RepositoryError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn test_conditional_decrement() {
        let store = InMemorySettlementStore::new();
        let user = Uuid::new_v4();
        store.add_user(user, 100);

        assert_eq!(store.decrement_if_sufficient(user, 101).await.unwrap(), None);
        assert_eq!(store.decrement_if_sufficient(user, 40).await.unwrap(), Some(60));
        assert!(matches!(
            store.decrement_if_sufficient(Uuid::new_v4(), 1).await,
            Err(RepositoryError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_finalize_and_credit_applies_both_once() {
        let store = InMemorySettlementStore::new();
        let payee = Uuid::new_v4();
        store.add_user(payee, 100);
        let tx = Transaction::pending(
            Uuid::new_v4(),
            "paypal".to_string(),
            Uuid::new_v4(),
            payee,
            FeeSplit::from_total(1000).unwrap(),
            "USD".to_string(),
        )
        .unwrap();
        TransactionRepository::insert(&store, &tx).await.unwrap();

        let settled = store.finalize_and_credit(tx.id).await.unwrap().unwrap();
        assert_eq!(settled.status, TransactionStatus::Succeeded);
        assert_eq!(store.balance(payee).await.unwrap(), 1050);

        assert!(store.finalize_and_credit(tx.id).await.unwrap().is_none());
        assert_eq!(store.balance(payee).await.unwrap(), 1050);
    }

    #[tokio::test]
    async fn test_finalize_and_credit_leaves_pending_when_payee_missing() {
        let store = InMemorySettlementStore::new();
        let tx = Transaction::pending(
            Uuid::new_v4(),
            "paypal".to_string(),
            Uuid::new_v4(),
            Uuid::new_v4(),
            FeeSplit::from_total(1000).unwrap(),
            "USD".to_string(),
        )
        .unwrap();
        TransactionRepository::insert(&store, &tx).await.unwrap();

        assert!(store.finalize_and_credit(tx.id).await.is_err());
        let stored = TransactionRepository::get_by_id(&store, tx.id).await.unwrap();
        assert_eq!(stored.status, TransactionStatus::Pending);
    }
}
