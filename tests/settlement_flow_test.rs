mod common;

use async_trait::async_trait;
use std::sync::Arc;
use uuid::Uuid;

use common::{major, Failure, Fixture, CURATOR_EMAIL};
use settlement_core::adapters::InMemorySettlementStore;
use settlement_core::domain::{
    EarningsPeriod, ReconciliationKind, Transaction, TransactionStatus, Withdrawal,
    WithdrawalStatus,
};
use settlement_core::ports::{
    BalanceRepository, PaymentSettlementStore, ReconciliationLog, RepositoryError,
    RepositoryResult, Reservation, TransactionRepository, WithdrawalRepository,
};
use settlement_core::services::{SettlementComponents, SettlementError, SettlementService};

/// Balance store whose writes can be made to fail.
struct FlakyBalances {
    inner: Arc<InMemorySettlementStore>,
    fail_increment: bool,
    fail_decrement: bool,
}

#[async_trait]
impl BalanceRepository for FlakyBalances {
    async fn balance(&self, user_id: Uuid) -> RepositoryResult<i64> {
        self.inner.balance(user_id).await
    }

    async fn increment(&self, user_id: Uuid, amount: i64) -> RepositoryResult<i64> {
        if self.fail_increment {
            return Err(RepositoryError::Database("connection reset".to_string()));
        }
        self.inner.increment(user_id, amount).await
    }

    async fn decrement_if_sufficient(
        &self,
        user_id: Uuid,
        amount: i64,
    ) -> RepositoryResult<Option<i64>> {
        if self.fail_decrement {
            return Err(RepositoryError::Database("connection reset".to_string()));
        }
        self.inner.decrement_if_sufficient(user_id, amount).await
    }
}

/// Withdrawal store that refuses status writes into the listed states.
struct FlakyWithdrawals {
    inner: Arc<InMemorySettlementStore>,
    fail_on: Vec<WithdrawalStatus>,
}

#[async_trait]
impl WithdrawalRepository for FlakyWithdrawals {
    async fn reserve(&self, withdrawal: &Withdrawal) -> RepositoryResult<Reservation> {
        self.inner.reserve(withdrawal).await
    }

    async fn update(&self, withdrawal: &Withdrawal) -> RepositoryResult<Withdrawal> {
        if self.fail_on.contains(&withdrawal.status) {
            return Err(RepositoryError::Database("connection reset".to_string()));
        }
        self.inner.update(withdrawal).await
    }

    async fn get_by_id(&self, id: Uuid) -> RepositoryResult<Withdrawal> {
        WithdrawalRepository::get_by_id(&*self.inner, id).await
    }

    async fn list_for_user(
        &self,
        user_id: Uuid,
        skip: i64,
        take: i64,
    ) -> RepositoryResult<Vec<Withdrawal>> {
        self.inner.list_for_user(user_id, skip, take).await
    }

    async fn in_flight_total(&self, user_id: Uuid) -> RepositoryResult<i64> {
        self.inner.in_flight_total(user_id).await
    }
}

struct BrokenSettlementStore;

#[async_trait]
impl PaymentSettlementStore for BrokenSettlementStore {
    async fn finalize_and_credit(&self, _id: Uuid) -> RepositoryResult<Option<Transaction>> {
        Err(RepositoryError::Database("deadlock detected".to_string()))
    }
}

fn with_flaky_withdrawals(fx: &Fixture, fail_on: Vec<WithdrawalStatus>) -> SettlementService {
    SettlementService::new(SettlementComponents {
        withdrawals: Arc::new(FlakyWithdrawals {
            inner: fx.store.clone(),
            fail_on,
        }),
        ..SettlementComponents::from_store(fx.store.clone(), fx.gateway.clone(), "USD".to_string())
    })
}

async fn pay_and_confirm(fx: &Fixture) -> Transaction {
    let initiation = fx.service.process_payment(fx.initiate_request()).await.unwrap();
    let payment_id = initiation.transaction.provider_transaction_id.clone().unwrap();
    fx.service.complete_payment(&payment_id, "PAYER-1").await.unwrap()
}

#[tokio::test]
async fn test_ten_dollar_submission_splits_and_credits_curator() {
    let fx = Fixture::new("10.00");

    let initiation = fx.service.process_payment(fx.initiate_request()).await.unwrap();
    let tx = &initiation.transaction;
    assert_eq!(tx.amount_total, 1000);
    assert_eq!(tx.platform_fee, 50);
    assert_eq!(tx.creator_payout_amount, 950);
    assert_eq!(tx.status, TransactionStatus::Pending);
    assert_eq!(tx.payer_id, fx.artist_id);
    assert_eq!(tx.payee_id, fx.curator_id);
    assert!(initiation.approval_url.starts_with("https://provider.test/checkout"));

    let sent = fx.gateway.created_payments.lock().unwrap()[0].clone();
    assert_eq!(sent.amount_minor, 1000);
    assert_eq!(sent.currency, "USD");
    assert!(sent.description.contains("Midnight Static"));

    let payment_id = tx.provider_transaction_id.clone().unwrap();
    let settled = fx.service.complete_payment(&payment_id, "PAYER-1").await.unwrap();
    assert_eq!(settled.status, TransactionStatus::Succeeded);

    let balance = fx.service.get_balance(fx.curator_id).await.unwrap();
    assert_eq!(balance.balance, 950);
    assert_eq!(balance.available, 950);
    assert_eq!(balance.total_earnings, 950);
    assert_eq!(
        fx.store.submission_status(fx.submission_id).as_deref(),
        Some("pending")
    );
}

#[tokio::test]
async fn test_fee_rounding_keeps_split_balanced() {
    let fx = Fixture::new("7.99");

    let initiation = fx.service.process_payment(fx.initiate_request()).await.unwrap();
    let tx = initiation.transaction;
    assert_eq!(tx.amount_total, 799);
    assert_eq!(tx.platform_fee, 40);
    assert_eq!(tx.creator_payout_amount, 759);
    assert_eq!(tx.platform_fee + tx.creator_payout_amount, tx.amount_total);
}

#[tokio::test]
async fn test_withdraw_full_balance_completes_and_zeroes_balance() {
    let fx = Fixture::new("10.00");
    pay_and_confirm(&fx).await;

    let receipt = fx.service.withdraw(fx.curator_id, &major("9.50")).await.unwrap();
    let withdrawal = &receipt.withdrawal;
    assert_eq!(withdrawal.status, WithdrawalStatus::Completed);
    assert_eq!(withdrawal.amount, 950);
    assert_eq!(withdrawal.payout_batch_id.as_deref(), Some(receipt.payout_batch_id.as_str()));
    assert!(withdrawal.processed_at.is_some());
    assert!(withdrawal.provider_payload.is_some());

    let payout = fx.gateway.payouts.lock().unwrap()[0].clone();
    assert_eq!(payout.recipient, CURATOR_EMAIL);
    assert_eq!(payout.amount_minor, 950);
    assert_eq!(payout.sender_batch_id, withdrawal.id.to_string());

    let balance = fx.service.get_balance(fx.curator_id).await.unwrap();
    assert_eq!(balance.balance, 0);
    assert_eq!(balance.pending_withdrawals, 0);
    assert_eq!(balance.available, 0);
    assert_eq!(balance.total_earnings, 950);
}

#[tokio::test]
async fn test_withdraw_more_than_available_is_refused_without_a_row() {
    let fx = Fixture::new("10.00");
    fx.set_curator_balance(500);

    let result = fx.service.withdraw(fx.curator_id, &major("10.00")).await;
    assert!(matches!(
        result,
        Err(SettlementError::InsufficientBalance {
            requested: 1000,
            available: 500
        })
    ));

    assert_eq!(fx.gateway.payout_calls(), 0);
    assert!(fx.service.list_withdrawals(fx.curator_id, 0, 20).await.unwrap().is_empty());
    assert_eq!(fx.service.get_balance(fx.curator_id).await.unwrap().balance, 500);
}

#[tokio::test]
async fn test_payout_network_error_marks_withdrawal_failed_and_keeps_balance() {
    let fx = Fixture::new("10.00");
    fx.set_curator_balance(950);
    fx.gateway.fail_payouts_with(Failure::Transport("connection refused"));

    let result = fx.service.withdraw(fx.curator_id, &major("5.00")).await;
    let withdrawal_id = match result {
        Err(SettlementError::WithdrawalFailed {
            withdrawal_id,
            message,
        }) => {
            assert!(message.contains("connection refused"));
            withdrawal_id
        }
        other => panic!("expected WithdrawalFailed, got {:?}", other),
    };

    let stored = WithdrawalRepository::get_by_id(&*fx.store, withdrawal_id)
        .await
        .unwrap();
    assert_eq!(stored.status, WithdrawalStatus::Failed);
    assert!(stored.error_message.unwrap().contains("connection refused"));

    let balance = fx.service.get_balance(fx.curator_id).await.unwrap();
    assert_eq!(balance.balance, 950);
    assert_eq!(balance.available, 950);
}

#[tokio::test]
async fn test_provider_rejection_message_reaches_caller() {
    let fx = Fixture::new("10.00");
    fx.set_curator_balance(950);
    fx.gateway.fail_payouts_with(Failure::Request {
        status: 422,
        code: "RECEIVER_UNREGISTERED",
        message: "Receiver is unregistered",
    });

    match fx.service.withdraw(fx.curator_id, &major("1.00")).await {
        Err(SettlementError::WithdrawalFailed { message, .. }) => {
            assert_eq!(message, "Receiver is unregistered")
        }
        other => panic!("expected WithdrawalFailed, got {:?}", other),
    }
}

#[tokio::test]
async fn test_missing_payout_account_blocks_payment_before_provider() {
    let fx = Fixture::without_payout_account("10.00");

    let result = fx.service.process_payment(fx.initiate_request()).await;
    assert!(matches!(result, Err(SettlementError::PayoutAccountMissing(id)) if id == fx.curator_id));

    assert_eq!(fx.gateway.create_payment_calls(), 0);
    assert!(fx
        .store
        .find_by_submission(fx.submission_id)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_missing_payout_account_blocks_withdrawal() {
    let fx = Fixture::without_payout_account("10.00");
    fx.set_curator_balance(950);

    let result = fx.service.withdraw(fx.curator_id, &major("1.00")).await;
    assert!(matches!(result, Err(SettlementError::PayoutAccountMissing(_))));
    assert_eq!(fx.gateway.payout_calls(), 0);
}

#[tokio::test]
async fn test_unknown_submission_is_not_found() {
    let fx = Fixture::new("10.00");
    let mut request = fx.initiate_request();
    request.submission_id = Uuid::new_v4();

    let result = fx.service.process_payment(request).await;
    assert!(matches!(result, Err(SettlementError::NotFound { entity: "submission", .. })));
}

#[tokio::test]
async fn test_confirm_twice_credits_once() {
    let fx = Fixture::new("10.00");
    let settled = pay_and_confirm(&fx).await;
    let payment_id = settled.provider_transaction_id.unwrap();

    let second = fx.service.complete_payment(&payment_id, "PAYER-1").await;
    assert!(matches!(second, Err(SettlementError::AlreadyProcessed(id)) if id == settled.id));

    assert_eq!(fx.gateway.execute_calls(), 1);
    assert_eq!(fx.service.get_balance(fx.curator_id).await.unwrap().balance, 950);
}

#[tokio::test]
async fn test_concurrent_confirms_credit_once() {
    let fx = Fixture::new("10.00");
    let initiation = fx.service.process_payment(fx.initiate_request()).await.unwrap();
    let payment_id = initiation.transaction.provider_transaction_id.unwrap();

    let (a, b) = tokio::join!(
        fx.service.complete_payment(&payment_id, "PAYER-1"),
        fx.service.complete_payment(&payment_id, "PAYER-1"),
    );

    let successes = [&a, &b].iter().filter(|r| r.is_ok()).count();
    assert_eq!(successes, 1);
    assert!([a, b]
        .into_iter()
        .any(|r| matches!(r, Err(SettlementError::AlreadyProcessed(_)))));
    assert_eq!(fx.service.get_balance(fx.curator_id).await.unwrap().balance, 950);
}

#[tokio::test]
async fn test_unapproved_execution_fails_transaction_without_credit() {
    let fx = Fixture::new("10.00");
    fx.gateway.execute_returns("failed");

    let settled = pay_and_confirm(&fx).await;
    assert_eq!(settled.status, TransactionStatus::Failed);
    assert_eq!(fx.service.get_balance(fx.curator_id).await.unwrap().balance, 0);
    assert_eq!(
        fx.store.submission_status(fx.submission_id).as_deref(),
        Some("awaiting_payment")
    );
}

#[tokio::test]
async fn test_unknown_payment_is_not_found_and_never_executed() {
    let fx = Fixture::new("10.00");

    let result = fx.service.complete_payment("PAY-UNKNOWN", "PAYER-1").await;
    assert!(matches!(result, Err(SettlementError::NotFound { entity: "payment", .. })));
    assert_eq!(fx.gateway.execute_calls(), 0);
}

#[tokio::test]
async fn test_pending_payment_is_resumed_not_recreated() {
    let fx = Fixture::new("10.00");

    let first = fx.service.process_payment(fx.initiate_request()).await.unwrap();
    let second = fx.service.process_payment(fx.initiate_request()).await.unwrap();

    assert_eq!(first.transaction.id, second.transaction.id);
    assert_eq!(first.approval_url, second.approval_url);
    assert_eq!(fx.gateway.create_payment_calls(), 1);
}

#[tokio::test]
async fn test_paid_submission_cannot_be_paid_again() {
    let fx = Fixture::new("10.00");
    let settled = pay_and_confirm(&fx).await;

    let result = fx.service.process_payment(fx.initiate_request()).await;
    assert!(matches!(result, Err(SettlementError::AlreadyProcessed(id)) if id == settled.id));
    assert_eq!(fx.gateway.create_payment_calls(), 1);
}

#[tokio::test]
async fn test_provider_error_on_create_leaves_no_transaction() {
    let fx = Fixture::new("10.00");
    fx.gateway.fail_payments_with(Failure::Request {
        status: 429,
        code: "RATE_LIMIT_REACHED",
        message: "Too many requests",
    });

    match fx.service.process_payment(fx.initiate_request()).await {
        Err(SettlementError::Provider { operation, source }) => {
            assert_eq!(operation, "create payment");
            assert!(source.is_transient());
        }
        other => panic!("expected provider error, got {:?}", other),
    }
    assert!(fx
        .store
        .find_by_submission(fx.submission_id)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_withdrawals_cannot_overdraw() {
    let fx = Fixture::new("10.00");
    fx.set_curator_balance(100);

    let first = {
        let service = fx.service.clone();
        let user = fx.curator_id;
        tokio::spawn(async move { service.withdraw(user, &major("0.60")).await })
    };
    let second = {
        let service = fx.service.clone();
        let user = fx.curator_id;
        tokio::spawn(async move { service.withdraw(user, &major("0.60")).await })
    };

    let results = [first.await.unwrap(), second.await.unwrap()];
    let succeeded = results.iter().filter(|r| r.is_ok()).count();
    let refused = results
        .iter()
        .filter(|r| matches!(r, Err(SettlementError::InsufficientBalance { .. })))
        .count();

    assert_eq!(succeeded, 1);
    assert_eq!(refused, 1);
    assert_eq!(fx.gateway.payout_calls(), 1);
    assert_eq!(fx.service.get_balance(fx.curator_id).await.unwrap().balance, 40);
}

#[tokio::test]
async fn test_in_flight_withdrawals_reduce_available() {
    let fx = Fixture::new("10.00");
    fx.set_curator_balance(1000);
    let pending = Withdrawal::pending(fx.curator_id, 300, "USD".to_string()).unwrap();
    fx.store.reserve(&pending).await.unwrap();

    let balance = fx.service.get_balance(fx.curator_id).await.unwrap();
    assert_eq!(balance.balance, 1000);
    assert_eq!(balance.pending_withdrawals, 300);
    assert_eq!(balance.available, 700);

    let result = fx.service.withdraw(fx.curator_id, &major("8.00")).await;
    assert!(matches!(result, Err(SettlementError::InsufficientBalance { available: 700, .. })));
}

#[tokio::test]
async fn test_credit_failure_is_recorded_for_reconciliation() {
    let fx = Fixture::with_components("10.00", |mut components| {
        let store = Arc::new(InMemorySettlementStore::new());
        components.balances = Arc::new(FlakyBalances {
            inner: store,
            fail_increment: true,
            fail_decrement: false,
        });
        components.atomic_settlement = None;
        components
    });

    let settled = pay_and_confirm(&fx).await;
    assert_eq!(settled.status, TransactionStatus::Succeeded);

    let records = fx.service.list_reconciliation(10).await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].kind, ReconciliationKind::UncreditedTransaction);
    assert_eq!(records[0].reference_id, settled.id);
    assert_eq!(records[0].user_id, fx.curator_id);
    assert_eq!(records[0].amount, 950);
}

#[tokio::test]
async fn test_debit_failure_after_payout_is_recorded_for_reconciliation() {
    let fx = Fixture::new("10.00");
    fx.set_curator_balance(950);

    // Same store, but debits fail
    let components = SettlementComponents {
        balances: Arc::new(FlakyBalances {
            inner: fx.store.clone(),
            fail_increment: false,
            fail_decrement: true,
        }),
        ..SettlementComponents::from_store(
            fx.store.clone(),
            fx.gateway.clone(),
            "USD".to_string(),
        )
    };
    let service = SettlementService::new(components);

    let result = service.withdraw(fx.curator_id, &major("5.00")).await;
    assert!(matches!(result, Err(SettlementError::Repository(_))));
    assert_eq!(fx.gateway.payout_calls(), 1);

    let withdrawals = fx.store.list_for_user(fx.curator_id, 0, 10).await.unwrap();
    assert_eq!(withdrawals.len(), 1);
    assert_eq!(withdrawals[0].status, WithdrawalStatus::Processing);

    let records = fx.store.list(10).await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].kind, ReconciliationKind::UndebitedWithdrawal);
    assert_eq!(records[0].reference_id, withdrawals[0].id);
    assert_eq!(records[0].amount, 500);
}

#[tokio::test]
async fn test_earnings_stats_and_ledger_reconcile() {
    let fx = Fixture::new("10.00");
    pay_and_confirm(&fx).await;
    fx.service.withdraw(fx.curator_id, &major("4.00")).await.unwrap();

    let stats = fx
        .service
        .get_earnings_stats(fx.curator_id, EarningsPeriod::Month)
        .await
        .unwrap();
    assert_eq!(stats.totals.creator_payout, 950);
    assert_eq!(stats.totals.platform_fees, 50);
    assert_eq!(stats.totals.transaction_count, 1);
    assert!(stats.since.is_some());

    let all = fx
        .service
        .get_earnings_stats(fx.curator_id, EarningsPeriod::All)
        .await
        .unwrap();
    assert!(all.since.is_none());

    let completed: i64 = fx
        .service
        .list_withdrawals(fx.curator_id, 0, 100)
        .await
        .unwrap()
        .iter()
        .filter(|w| w.status == WithdrawalStatus::Completed)
        .map(|w| w.amount)
        .sum();
    let balance = fx.service.get_balance(fx.curator_id).await.unwrap();
    assert_eq!(balance.balance, all.totals.creator_payout - completed);
    assert_eq!(balance.balance, 550);
}

#[tokio::test]
async fn test_withdrawals_listed_newest_first_with_paging() {
    let fx = Fixture::new("10.00");
    fx.set_curator_balance(10_000);

    let mut ids = Vec::new();
    for amount in ["1.00", "2.00", "3.00"] {
        let receipt = fx.service.withdraw(fx.curator_id, &major(amount)).await.unwrap();
        ids.push(receipt.withdrawal.id);
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    }

    let page = fx.service.list_withdrawals(fx.curator_id, 0, 2).await.unwrap();
    assert_eq!(page.len(), 2);
    assert_eq!(page[0].id, ids[2]);
    assert_eq!(page[1].id, ids[1]);

    let rest = fx.service.list_withdrawals(fx.curator_id, 2, 2).await.unwrap();
    assert_eq!(rest.len(), 1);
    assert_eq!(rest[0].id, ids[0]);
}

#[tokio::test]
async fn test_non_positive_withdrawal_is_a_validation_error() {
    let fx = Fixture::new("10.00");
    fx.set_curator_balance(950);

    let result = fx.service.withdraw(fx.curator_id, &major("0")).await;
    assert!(matches!(result, Err(SettlementError::Validation(_))));
    assert_eq!(fx.gateway.payout_calls(), 0);
}

#[tokio::test]
async fn test_lost_processing_write_still_debits_and_completes() {
    let fx = Fixture::new("10.00");
    fx.set_curator_balance(950);
    let service = with_flaky_withdrawals(&fx, vec![WithdrawalStatus::Processing]);

    let receipt = service.withdraw(fx.curator_id, &major("5.00")).await.unwrap();
    assert_eq!(fx.gateway.payout_calls(), 1);
    assert_eq!(receipt.withdrawal.status, WithdrawalStatus::Completed);

    let stored = WithdrawalRepository::get_by_id(&*fx.store, receipt.withdrawal.id)
        .await
        .unwrap();
    assert_eq!(stored.status, WithdrawalStatus::Completed);
    assert_eq!(stored.payout_batch_id.as_deref(), Some(receipt.payout_batch_id.as_str()));
    assert_eq!(fx.store.balance(fx.curator_id).await.unwrap(), 450);
    assert!(fx.store.list(10).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_accepted_payout_without_any_status_write_is_recorded() {
    let fx = Fixture::new("10.00");
    fx.set_curator_balance(950);
    let service = with_flaky_withdrawals(
        &fx,
        vec![WithdrawalStatus::Processing, WithdrawalStatus::Completed],
    );

    let result = service.withdraw(fx.curator_id, &major("5.00")).await;
    assert!(matches!(result, Err(SettlementError::Repository(_))));
    assert_eq!(fx.gateway.payout_calls(), 1);
    assert_eq!(fx.store.balance(fx.curator_id).await.unwrap(), 450);

    let withdrawals = fx.store.list_for_user(fx.curator_id, 0, 10).await.unwrap();
    assert_eq!(withdrawals.len(), 1);
    assert_eq!(withdrawals[0].status, WithdrawalStatus::Pending);

    let records = fx.store.list(10).await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].kind, ReconciliationKind::StaleWithdrawal);
    assert_eq!(records[0].reference_id, withdrawals[0].id);
    assert_eq!(records[0].amount, 500);
    assert!(records[0].reason.contains("BATCH-1"));
}

#[tokio::test]
async fn test_rejected_payout_without_failed_write_is_recorded() {
    let fx = Fixture::new("10.00");
    fx.set_curator_balance(950);
    fx.gateway.fail_payouts_with(Failure::Request {
        status: 422,
        code: "RECEIVER_UNREGISTERED",
        message: "Receiver is unregistered",
    });
    let service = with_flaky_withdrawals(&fx, vec![WithdrawalStatus::Failed]);

    let result = service.withdraw(fx.curator_id, &major("5.00")).await;
    assert!(matches!(result, Err(SettlementError::Repository(_))));
    assert_eq!(fx.store.balance(fx.curator_id).await.unwrap(), 950);

    let withdrawals = fx.store.list_for_user(fx.curator_id, 0, 10).await.unwrap();
    assert_eq!(withdrawals[0].status, WithdrawalStatus::Pending);

    let records = fx.store.list(10).await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].kind, ReconciliationKind::StaleWithdrawal);
    assert_eq!(records[0].reference_id, withdrawals[0].id);
    assert!(records[0].reason.contains("Receiver is unregistered"));
}

#[tokio::test]
async fn test_atomic_settlement_error_falls_back_to_separate_writes() {
    let fx = Fixture::with_components("10.00", |mut components| {
        components.atomic_settlement = Some(Arc::new(BrokenSettlementStore));
        components
    });

    let settled = pay_and_confirm(&fx).await;
    assert_eq!(settled.status, TransactionStatus::Succeeded);
    assert_eq!(fx.service.get_balance(fx.curator_id).await.unwrap().balance, 950);
    assert!(fx.store.list(10).await.unwrap().is_empty());
}
