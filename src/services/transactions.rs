//! Transaction manager: drives a submission payment from `pending` to a
//! terminal state and credits the curator once on success.

use std::sync::Arc;
use uuid::Uuid;

use super::error::{SettlementError, SettlementResult};
use super::ledger::BalanceLedger;
use crate::domain::money::to_minor_units;
use crate::domain::{
    FeeSplit, ReconciliationKind, ReconciliationRecord, Transaction, TransactionStatus,
};
use crate::gateway::{CreatePayment, PaymentGateway};
use crate::ports::{
    PaymentSettlementStore, PayoutAccountDirectory, ReconciliationLog, RepositoryError,
    SubmissionDirectory, TransactionRepository,
};

#[derive(Debug, Clone)]
pub struct InitiatePayment {
    pub submission_id: Uuid,
    pub payment_method_id: String,
    pub return_url: String,
    pub cancel_url: String,
}

#[derive(Debug, Clone)]
pub struct PaymentInitiation {
    pub transaction: Transaction,
    pub approval_url: String,
}

pub struct TransactionManager {
    transactions: Arc<dyn TransactionRepository>,
    submissions: Arc<dyn SubmissionDirectory>,
    payout_accounts: Arc<dyn PayoutAccountDirectory>,
    reconciliation: Arc<dyn ReconciliationLog>,
    atomic_settlement: Option<Arc<dyn PaymentSettlementStore>>,
    gateway: Arc<dyn PaymentGateway>,
    ledger: BalanceLedger,
    currency: String,
}

impl TransactionManager {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        transactions: Arc<dyn TransactionRepository>,
        submissions: Arc<dyn SubmissionDirectory>,
        payout_accounts: Arc<dyn PayoutAccountDirectory>,
        reconciliation: Arc<dyn ReconciliationLog>,
        atomic_settlement: Option<Arc<dyn PaymentSettlementStore>>,
        gateway: Arc<dyn PaymentGateway>,
        ledger: BalanceLedger,
        currency: String,
    ) -> Self {
        Self {
            transactions,
            submissions,
            payout_accounts,
            reconciliation,
            atomic_settlement,
            gateway,
            ledger,
            currency,
        }
    }

    /// Creates a provider payment for a submission and persists it as a
    /// `pending` transaction. A submission that already has a pending
    /// transaction gets that one back instead of a second provider payment.
    pub async fn initiate(&self, input: InitiatePayment) -> SettlementResult<PaymentInitiation> {
        let submission = self
            .submissions
            .get_submission(input.submission_id)
            .await?
            .ok_or_else(|| SettlementError::not_found("submission", input.submission_id))?;

        let curator_id = submission.playlist.creator_id;
        if self.payout_accounts.payout_address(curator_id).await?.is_none() {
            tracing::warn!(
                submission_id = %submission.id,
                %curator_id,
                "Curator has no payout account, refusing payment"
            );
            return Err(SettlementError::PayoutAccountMissing(curator_id));
        }

        let fee = to_minor_units(&submission.playlist.submission_fee)?;
        let split = FeeSplit::from_total(fee)?;

        if let Some(existing) = self.transactions.find_by_submission(submission.id).await? {
            return match (existing.status, existing.approval_url.clone()) {
                (TransactionStatus::Pending, Some(approval_url)) => {
                    tracing::info!(
                        transaction_id = %existing.id,
                        "Resuming pending payment for submission"
                    );
                    Ok(PaymentInitiation {
                        transaction: existing,
                        approval_url,
                    })
                }
                _ => Err(SettlementError::AlreadyProcessed(existing.id)),
            };
        }

        let transaction = Transaction::pending(
            submission.id,
            input.payment_method_id,
            submission.artist_id,
            curator_id,
            split,
            self.currency.clone(),
        )?;

        let created = self
            .gateway
            .create_payment(&CreatePayment {
                amount_minor: split.amount_total,
                currency: self.currency.clone(),
                description: submission.payment_description(),
                return_url: input.return_url,
                cancel_url: input.cancel_url,
            })
            .await
            .map_err(|e| {
                tracing::error!(submission_id = %submission.id, error = %e, "Provider payment creation failed");
                SettlementError::provider("create payment")(e)
            })?;

        let transaction =
            transaction.with_provider_payment(created.id.clone(), created.approval_url.clone());
        let saved = match self.transactions.insert(&transaction).await {
            Ok(saved) => saved,
            Err(RepositoryError::Conflict(msg)) => {
                // Lost a race with a concurrent initiate for the same submission
                tracing::warn!(payment_id = %created.id, %msg, "Duplicate transaction for submission");
                let existing = self
                    .transactions
                    .find_by_submission(submission.id)
                    .await?
                    .ok_or_else(|| SettlementError::not_found("transaction", submission.id))?;
                return Err(SettlementError::AlreadyProcessed(existing.id));
            }
            Err(e) => {
                tracing::error!(
                    payment_id = %created.id,
                    error = %e,
                    "Provider payment created but transaction not persisted"
                );
                return Err(e.into());
            }
        };

        tracing::info!(
            transaction_id = %saved.id,
            submission_id = %saved.submission_id,
            payment_id = %created.id,
            amount_minor = saved.amount_total,
            platform_fee_minor = saved.platform_fee,
            "Payment initiated"
        );

        Ok(PaymentInitiation {
            transaction: saved,
            approval_url: created.approval_url,
        })
    }

    /// Executes an approved provider payment and settles the transaction.
    ///
    /// An approved execution marks the transaction `succeeded`, releases the
    /// submission for review and credits the curator. Any other provider
    /// state marks it `failed` without a credit.
    pub async fn confirm(&self, payment_id: &str, payer_id: &str) -> SettlementResult<Transaction> {
        let transaction = self
            .transactions
            .find_by_provider_id(payment_id)
            .await?
            .ok_or_else(|| SettlementError::not_found("payment", payment_id))?;

        if transaction.status.is_terminal() {
            tracing::warn!(transaction_id = %transaction.id, status = %transaction.status, "Payment already settled");
            return Err(SettlementError::AlreadyProcessed(transaction.id));
        }

        let executed = self
            .gateway
            .execute_payment(payment_id, payer_id)
            .await
            .map_err(|e| {
                tracing::error!(transaction_id = %transaction.id, error = %e, "Provider payment execution failed");
                SettlementError::provider("execute payment")(e)
            })?;

        let outcome = if executed.is_approved() {
            TransactionStatus::Succeeded
        } else {
            tracing::warn!(
                transaction_id = %transaction.id,
                state = %executed.state,
                "Provider did not approve payment"
            );
            TransactionStatus::Failed
        };
        transaction.check_transition(outcome)?;

        if outcome == TransactionStatus::Succeeded {
            if let Some(settled) = self.settle_atomically(&transaction).await? {
                self.release_for_review(&settled).await;
                return Ok(settled);
            }
        }

        let settled = self
            .transactions
            .finalize(transaction.id, outcome)
            .await?
            .ok_or(SettlementError::AlreadyProcessed(transaction.id))?;

        tracing::info!(transaction_id = %settled.id, status = %settled.status, "Payment settled");

        if settled.status == TransactionStatus::Succeeded {
            self.release_for_review(&settled).await;
            self.credit_or_record(&settled).await;
        }

        Ok(settled)
    }

    /// Status change and credit in one store transaction. `Ok(None)` means
    /// the store could not do it and the two-step path should run; the row is
    /// still pending in that case.
    async fn settle_atomically(&self, transaction: &Transaction) -> SettlementResult<Option<Transaction>> {
        let store = match &self.atomic_settlement {
            Some(store) => store,
            None => return Ok(None),
        };

        match store.finalize_and_credit(transaction.id).await {
            Ok(Some(settled)) => {
                tracing::info!(
                    transaction_id = %settled.id,
                    user_id = %settled.payee_id,
                    amount_minor = settled.creator_payout_amount,
                    "Payment settled and curator credited"
                );
                Ok(Some(settled))
            }
            Ok(None) => Err(SettlementError::AlreadyProcessed(transaction.id)),
            Err(e) => {
                tracing::warn!(
                    transaction_id = %transaction.id,
                    error = %e,
                    "Atomic settlement failed, falling back to separate writes"
                );
                Ok(None)
            }
        }
    }

    async fn release_for_review(&self, transaction: &Transaction) {
        if let Err(e) = self
            .submissions
            .mark_pending_review(transaction.submission_id)
            .await
        {
            tracing::error!(
                transaction_id = %transaction.id,
                submission_id = %transaction.submission_id,
                error = %e,
                "Failed to release paid submission for review"
            );
        }
    }

    /// The one step allowed to finish with residue: the transaction is already
    /// terminal, so failures here are recorded for reconciliation instead of
    /// being returned to the payer.
    async fn credit_or_record(&self, transaction: &Transaction) {
        let credit = self
            .ledger
            .credit(transaction.payee_id, transaction.creator_payout_amount)
            .await;

        if let Err(e) = credit {
            tracing::error!(
                transaction_id = %transaction.id,
                user_id = %transaction.payee_id,
                amount_minor = transaction.creator_payout_amount,
                error = %e,
                "Balance credit failed after payment succeeded"
            );
            let record = ReconciliationRecord::new(
                ReconciliationKind::UncreditedTransaction,
                transaction.id,
                transaction.payee_id,
                transaction.creator_payout_amount,
                e.to_string(),
            );
            if let Err(log_err) = self.reconciliation.record(&record).await {
                tracing::error!(
                    transaction_id = %transaction.id,
                    user_id = %transaction.payee_id,
                    amount_minor = transaction.creator_payout_amount,
                    error = %log_err,
                    "Failed to write reconciliation record"
                );
            }
        }
    }
}
