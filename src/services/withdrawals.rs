//! Withdrawal manager: curator payouts against the ledger balance.
//!
//! The provider payout call always completes before the balance is touched,
//! so a rejected or unreachable payout leaves the balance as it was.

use std::sync::Arc;
use uuid::Uuid;

use super::error::{SettlementError, SettlementResult};
use super::ledger::BalanceLedger;
use crate::domain::{ReconciliationKind, ReconciliationRecord, Withdrawal};
use crate::gateway::{CreatePayout, PaymentGateway};
use crate::ports::{
    PayoutAccountDirectory, ReconciliationLog, RepositoryResult, Reservation, WithdrawalRepository,
};

const PAYOUT_NOTE: &str = "Playlist submission earnings";

#[derive(Debug, Clone)]
pub struct WithdrawalReceipt {
    pub withdrawal: Withdrawal,
    pub payout_batch_id: String,
}

pub struct WithdrawalManager {
    withdrawals: Arc<dyn WithdrawalRepository>,
    payout_accounts: Arc<dyn PayoutAccountDirectory>,
    reconciliation: Arc<dyn ReconciliationLog>,
    gateway: Arc<dyn PaymentGateway>,
    ledger: BalanceLedger,
    currency: String,
}

impl WithdrawalManager {
    pub fn new(
        withdrawals: Arc<dyn WithdrawalRepository>,
        payout_accounts: Arc<dyn PayoutAccountDirectory>,
        reconciliation: Arc<dyn ReconciliationLog>,
        gateway: Arc<dyn PaymentGateway>,
        ledger: BalanceLedger,
        currency: String,
    ) -> Self {
        Self {
            withdrawals,
            payout_accounts,
            reconciliation,
            gateway,
            ledger,
            currency,
        }
    }

    pub async fn withdraw(&self, user_id: Uuid, amount: i64) -> SettlementResult<WithdrawalReceipt> {
        if amount <= 0 {
            return Err(SettlementError::Validation(
                "withdrawal amount must be positive".to_string(),
            ));
        }

        let available = self.ledger.get_available(user_id).await?;
        if amount > available.available {
            tracing::warn!(
                %user_id,
                amount_minor = amount,
                available_minor = available.available,
                "Withdrawal exceeds available balance"
            );
            return Err(SettlementError::InsufficientBalance {
                requested: amount,
                available: available.available,
            });
        }

        let recipient = self
            .payout_accounts
            .payout_address(user_id)
            .await?
            .ok_or(SettlementError::PayoutAccountMissing(user_id))?;

        // Re-checked atomically with the insert; the read above can be stale
        let candidate = Withdrawal::pending(user_id, amount, self.currency.clone())?;
        let mut withdrawal = match self.withdrawals.reserve(&candidate).await? {
            Reservation::Reserved(w) => w,
            Reservation::Insufficient { balance, in_flight } => {
                tracing::warn!(
                    %user_id,
                    amount_minor = amount,
                    balance_minor = balance,
                    in_flight_minor = in_flight,
                    "Concurrent withdrawal consumed the available balance"
                );
                return Err(SettlementError::InsufficientBalance {
                    requested: amount,
                    available: balance - in_flight,
                });
            }
        };

        tracing::info!(withdrawal_id = %withdrawal.id, %user_id, amount_minor = amount, "Withdrawal reserved");

        let payout = self
            .gateway
            .create_payout(&CreatePayout {
                sender_batch_id: withdrawal.id.to_string(),
                recipient,
                amount_minor: amount,
                currency: withdrawal.currency.clone(),
                note: PAYOUT_NOTE.to_string(),
            })
            .await;

        let payout = match payout {
            Ok(payout) => payout,
            Err(e) => {
                let message = e.provider_message();
                tracing::error!(
                    withdrawal_id = %withdrawal.id,
                    %user_id,
                    error = %e,
                    "Payout rejected, balance untouched"
                );
                withdrawal.mark_failed(message.clone())?;
                if let Err(update_err) = self.persist(&withdrawal).await {
                    self.record_residue(
                        ReconciliationKind::StaleWithdrawal,
                        &withdrawal,
                        format!(
                            "payout rejected ({}), failed status not written: {}",
                            message, update_err
                        ),
                    )
                    .await;
                    return Err(update_err.into());
                }
                return Err(SettlementError::WithdrawalFailed {
                    withdrawal_id: withdrawal.id,
                    message,
                });
            }
        };

        let batch_id = payout.batch_id;
        withdrawal.mark_processing(batch_id.clone(), payout.raw)?;
        // Money has left: a lost status write must not stop the debit
        let withdrawal = match self.persist(&withdrawal).await {
            Ok(stored) => stored,
            Err(e) => {
                tracing::error!(
                    withdrawal_id = %withdrawal.id,
                    batch_id = %batch_id,
                    error = %e,
                    "Failed to record accepted payout"
                );
                withdrawal
            }
        };
        tracing::info!(
            withdrawal_id = %withdrawal.id,
            batch_id = %batch_id,
            "Payout accepted by provider"
        );

        let withdrawal = self.settle_debit(withdrawal, &batch_id).await?;

        Ok(WithdrawalReceipt {
            withdrawal,
            payout_batch_id: batch_id,
        })
    }

    /// Debits the balance for an accepted payout and completes the withdrawal.
    /// The money has already left, so every failure from here on is recorded
    /// for reconciliation before it is returned.
    async fn settle_debit(
        &self,
        mut withdrawal: Withdrawal,
        batch_id: &str,
    ) -> SettlementResult<Withdrawal> {
        if let Err(e) = self.ledger.debit(withdrawal.user_id, withdrawal.amount).await {
            self.record_residue(
                ReconciliationKind::UndebitedWithdrawal,
                &withdrawal,
                format!("batch {}: {}", batch_id, e),
            )
            .await;
            return Err(e);
        }

        withdrawal.mark_completed()?;
        let withdrawal = match self.persist(&withdrawal).await {
            Ok(stored) => stored,
            Err(e) => {
                self.record_residue(
                    ReconciliationKind::StaleWithdrawal,
                    &withdrawal,
                    format!(
                        "batch {}: balance debited, completed status not written: {}",
                        batch_id, e
                    ),
                )
                .await;
                return Err(e.into());
            }
        };
        tracing::info!(withdrawal_id = %withdrawal.id, "Withdrawal completed");
        Ok(withdrawal)
    }

    /// Status write with a single retry.
    async fn persist(&self, withdrawal: &Withdrawal) -> RepositoryResult<Withdrawal> {
        match self.withdrawals.update(withdrawal).await {
            Ok(stored) => Ok(stored),
            Err(e) => {
                tracing::warn!(
                    withdrawal_id = %withdrawal.id,
                    status = %withdrawal.status,
                    error = %e,
                    "Withdrawal status write failed, retrying"
                );
                self.withdrawals.update(withdrawal).await
            }
        }
    }

    async fn record_residue(&self, kind: ReconciliationKind, withdrawal: &Withdrawal, reason: String) {
        tracing::error!(
            withdrawal_id = %withdrawal.id,
            user_id = %withdrawal.user_id,
            amount_minor = withdrawal.amount,
            kind = %kind,
            reason = %reason,
            "Withdrawal left unfinished after provider call"
        );
        let record = ReconciliationRecord::new(
            kind,
            withdrawal.id,
            withdrawal.user_id,
            withdrawal.amount,
            reason,
        );
        if let Err(log_err) = self.reconciliation.record(&record).await {
            tracing::error!(withdrawal_id = %withdrawal.id, error = %log_err, "Failed to write reconciliation record");
        }
    }

    pub async fn list(&self, user_id: Uuid, skip: i64, take: i64) -> SettlementResult<Vec<Withdrawal>> {
        Ok(self.withdrawals.list_for_user(user_id, skip, take).await?)
    }
}
