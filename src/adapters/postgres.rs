//! Postgres implementation of the settlement ports.

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::{
    EarningsTotals, PlaylistRef, ReconciliationKind, ReconciliationRecord, SongRef, Submission,
    Transaction, TransactionStatus, Withdrawal,
};
use crate::ports::{
    BalanceRepository, PaymentSettlementStore, PayoutAccountDirectory, ReconciliationLog, RepositoryError,
    RepositoryResult, Reservation, SubmissionDirectory, TransactionRepository,
    WithdrawalRepository,
};

const TRANSACTION_COLUMNS: &str = "id, submission_id, payment_method_id, payer_id, payee_id, \
    amount_total, currency, platform_fee, creator_payout_amount, status, \
    provider_transaction_id, approval_url, created_at, updated_at";

const WITHDRAWAL_COLUMNS: &str = "id, user_id, amount, currency, status, requested_at, \
    processed_at, payout_batch_id, provider_payload, error_message, created_at, updated_at";

/// One store backing every port, sharing a single pool.
#[derive(Clone)]
pub struct PgSettlementStore {
    pool: PgPool,
}

impl PgSettlementStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl TransactionRepository for PgSettlementStore {
    async fn insert(&self, tx: &Transaction) -> RepositoryResult<Transaction> {
        let sql = format!(
            "INSERT INTO transactions ({cols}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14) \
             RETURNING {cols}",
            cols = TRANSACTION_COLUMNS
        );
        let row = sqlx::query_as::<_, TransactionRow>(&sql)
            .bind(tx.id)
            .bind(tx.submission_id)
            .bind(&tx.payment_method_id)
            .bind(tx.payer_id)
            .bind(tx.payee_id)
            .bind(tx.amount_total)
            .bind(&tx.currency)
            .bind(tx.platform_fee)
            .bind(tx.creator_payout_amount)
            .bind(tx.status.as_str())
            .bind(&tx.provider_transaction_id)
            .bind(&tx.approval_url)
            .bind(tx.created_at)
            .bind(tx.updated_at)
            .fetch_one(&self.pool)
            .await
            .map_err(RepositoryError::from)?;

        row.into_domain()
    }

    async fn get_by_id(&self, id: Uuid) -> RepositoryResult<Transaction> {
        let sql = format!("SELECT {} FROM transactions WHERE id = $1", TRANSACTION_COLUMNS);
        let row = sqlx::query_as::<_, TransactionRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(RepositoryError::from)?;

        row.ok_or_else(|| RepositoryError::NotFound(format!("transaction {}", id)))?
            .into_domain()
    }

    async fn find_by_submission(&self, submission_id: Uuid) -> RepositoryResult<Option<Transaction>> {
        let sql = format!(
            "SELECT {} FROM transactions WHERE submission_id = $1",
            TRANSACTION_COLUMNS
        );
        let row = sqlx::query_as::<_, TransactionRow>(&sql)
            .bind(submission_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(RepositoryError::from)?;

        row.map(TransactionRow::into_domain).transpose()
    }

    async fn find_by_provider_id(&self, provider_id: &str) -> RepositoryResult<Option<Transaction>> {
        let sql = format!(
            "SELECT {} FROM transactions WHERE provider_transaction_id = $1",
            TRANSACTION_COLUMNS
        );
        let row = sqlx::query_as::<_, TransactionRow>(&sql)
            .bind(provider_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(RepositoryError::from)?;

        row.map(TransactionRow::into_domain).transpose()
    }

    async fn finalize(
        &self,
        id: Uuid,
        status: TransactionStatus,
    ) -> RepositoryResult<Option<Transaction>> {
        let sql = format!(
            "UPDATE transactions SET status = $2, updated_at = NOW() \
             WHERE id = $1 AND status = 'pending' \
             RETURNING {}",
            TRANSACTION_COLUMNS
        );
        let row = sqlx::query_as::<_, TransactionRow>(&sql)
            .bind(id)
            .bind(status.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(RepositoryError::from)?;

        row.map(TransactionRow::into_domain).transpose()
    }

    async fn earnings(
        &self,
        payee_id: Uuid,
        since: Option<DateTime<Utc>>,
    ) -> RepositoryResult<EarningsTotals> {
        let (creator_payout, platform_fees, transaction_count) =
            sqlx::query_as::<_, (i64, i64, i64)>(
                r#"
                SELECT
                    COALESCE(SUM(creator_payout_amount), 0)::BIGINT,
                    COALESCE(SUM(platform_fee), 0)::BIGINT,
                    COUNT(*)
                FROM transactions
                WHERE payee_id = $1
                  AND status = 'succeeded'
                  AND ($2::TIMESTAMPTZ IS NULL OR updated_at >= $2)
                "#,
            )
            .bind(payee_id)
            .bind(since)
            .fetch_one(&self.pool)
            .await
            .map_err(RepositoryError::from)?;

        Ok(EarningsTotals {
            creator_payout,
            platform_fees,
            transaction_count,
        })
    }
}

#[async_trait]
impl PaymentSettlementStore for PgSettlementStore {
    async fn finalize_and_credit(&self, id: Uuid) -> RepositoryResult<Option<Transaction>> {
        let mut tx = self.pool.begin().await.map_err(RepositoryError::from)?;

        let sql = format!(
            "UPDATE transactions SET status = 'succeeded', updated_at = NOW() \
             WHERE id = $1 AND status = 'pending' \
             RETURNING {}",
            TRANSACTION_COLUMNS
        );
        let row = sqlx::query_as::<_, TransactionRow>(&sql)
            .bind(id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(RepositoryError::from)?;

        let settled = match row {
            Some(row) => row.into_domain()?,
            None => {
                tx.rollback().await.map_err(RepositoryError::from)?;
                return Ok(None);
            }
        };

        let credited = sqlx::query(
            "UPDATE users SET balance = balance + $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(settled.payee_id)
        .bind(settled.creator_payout_amount)
        .execute(&mut *tx)
        .await
        .map_err(RepositoryError::from)?;

        if credited.rows_affected() == 0 {
            tx.rollback().await.map_err(RepositoryError::from)?;
            return Err(RepositoryError::NotFound(format!("user {}", settled.payee_id)));
        }

        tx.commit().await.map_err(RepositoryError::from)?;
        Ok(Some(settled))
    }
}

#[async_trait]
impl WithdrawalRepository for PgSettlementStore {
    async fn reserve(&self, withdrawal: &Withdrawal) -> RepositoryResult<Reservation> {
        let mut tx = self.pool.begin().await.map_err(RepositoryError::from)?;

        // Row lock serializes concurrent reservations for the same user
        let balance = sqlx::query_scalar::<_, i64>("SELECT balance FROM users WHERE id = $1 FOR UPDATE")
            .bind(withdrawal.user_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(RepositoryError::from)?
            .ok_or_else(|| RepositoryError::NotFound(format!("user {}", withdrawal.user_id)))?;

        let in_flight = sqlx::query_scalar::<_, i64>(
            "SELECT COALESCE(SUM(amount), 0)::BIGINT FROM withdrawals \
             WHERE user_id = $1 AND status IN ('pending', 'processing')",
        )
        .bind(withdrawal.user_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(RepositoryError::from)?;

        if balance - in_flight < withdrawal.amount {
            tx.rollback().await.map_err(RepositoryError::from)?;
            return Ok(Reservation::Insufficient { balance, in_flight });
        }

        let sql = format!(
            "INSERT INTO withdrawals ({cols}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12) \
             RETURNING {cols}",
            cols = WITHDRAWAL_COLUMNS
        );
        let row = sqlx::query_as::<_, WithdrawalRow>(&sql)
            .bind(withdrawal.id)
            .bind(withdrawal.user_id)
            .bind(withdrawal.amount)
            .bind(&withdrawal.currency)
            .bind(withdrawal.status.as_str())
            .bind(withdrawal.requested_at)
            .bind(withdrawal.processed_at)
            .bind(&withdrawal.payout_batch_id)
            .bind(&withdrawal.provider_payload)
            .bind(&withdrawal.error_message)
            .bind(withdrawal.created_at)
            .bind(withdrawal.updated_at)
            .fetch_one(&mut *tx)
            .await
            .map_err(RepositoryError::from)?;

        tx.commit().await.map_err(RepositoryError::from)?;
        Ok(Reservation::Reserved(row.into_domain()?))
    }

    async fn update(&self, withdrawal: &Withdrawal) -> RepositoryResult<Withdrawal> {
        let sql = format!(
            "UPDATE withdrawals SET status = $2, processed_at = $3, payout_batch_id = $4, \
             provider_payload = $5, error_message = $6, updated_at = $7 \
             WHERE id = $1 RETURNING {}",
            WITHDRAWAL_COLUMNS
        );
        let row = sqlx::query_as::<_, WithdrawalRow>(&sql)
            .bind(withdrawal.id)
            .bind(withdrawal.status.as_str())
            .bind(withdrawal.processed_at)
            .bind(&withdrawal.payout_batch_id)
            .bind(&withdrawal.provider_payload)
            .bind(&withdrawal.error_message)
            .bind(withdrawal.updated_at)
            .fetch_optional(&self.pool)
            .await
            .map_err(RepositoryError::from)?;

        row.ok_or_else(|| RepositoryError::NotFound(format!("withdrawal {}", withdrawal.id)))?
            .into_domain()
    }

    async fn get_by_id(&self, id: Uuid) -> RepositoryResult<Withdrawal> {
        let sql = format!("SELECT {} FROM withdrawals WHERE id = $1", WITHDRAWAL_COLUMNS);
        let row = sqlx::query_as::<_, WithdrawalRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(RepositoryError::from)?;

        row.ok_or_else(|| RepositoryError::NotFound(format!("withdrawal {}", id)))?
            .into_domain()
    }

    async fn list_for_user(
        &self,
        user_id: Uuid,
        skip: i64,
        take: i64,
    ) -> RepositoryResult<Vec<Withdrawal>> {
        let sql = format!(
            "SELECT {} FROM withdrawals WHERE user_id = $1 \
             ORDER BY requested_at DESC, id DESC LIMIT $2 OFFSET $3",
            WITHDRAWAL_COLUMNS
        );
        let rows = sqlx::query_as::<_, WithdrawalRow>(&sql)
            .bind(user_id)
            .bind(take)
            .bind(skip)
            .fetch_all(&self.pool)
            .await
            .map_err(RepositoryError::from)?;

        rows.into_iter().map(WithdrawalRow::into_domain).collect()
    }

    async fn in_flight_total(&self, user_id: Uuid) -> RepositoryResult<i64> {
        let total = sqlx::query_scalar::<_, i64>(
            "SELECT COALESCE(SUM(amount), 0)::BIGINT FROM withdrawals \
             WHERE user_id = $1 AND status IN ('pending', 'processing')",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
        .map_err(RepositoryError::from)?;

        Ok(total)
    }
}

#[async_trait]
impl BalanceRepository for PgSettlementStore {
    async fn balance(&self, user_id: Uuid) -> RepositoryResult<i64> {
        sqlx::query_scalar::<_, i64>("SELECT balance FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(RepositoryError::from)?
            .ok_or_else(|| RepositoryError::NotFound(format!("user {}", user_id)))
    }

    async fn increment(&self, user_id: Uuid, amount: i64) -> RepositoryResult<i64> {
        sqlx::query_scalar::<_, i64>(
            "UPDATE users SET balance = balance + $2, updated_at = NOW() \
             WHERE id = $1 RETURNING balance",
        )
        .bind(user_id)
        .bind(amount)
        .fetch_optional(&self.pool)
        .await
        .map_err(RepositoryError::from)?
        .ok_or_else(|| RepositoryError::NotFound(format!("user {}", user_id)))
    }

    async fn decrement_if_sufficient(
        &self,
        user_id: Uuid,
        amount: i64,
    ) -> RepositoryResult<Option<i64>> {
        let updated = sqlx::query_scalar::<_, i64>(
            "UPDATE users SET balance = balance - $2, updated_at = NOW() \
             WHERE id = $1 AND balance >= $2 RETURNING balance",
        )
        .bind(user_id)
        .bind(amount)
        .fetch_optional(&self.pool)
        .await
        .map_err(RepositoryError::from)?;

        if updated.is_none() {
            // Distinguish a missing user from an insufficient balance
            self.balance(user_id).await?;
        }
        Ok(updated)
    }
}

#[async_trait]
impl SubmissionDirectory for PgSettlementStore {
    async fn get_submission(&self, id: Uuid) -> RepositoryResult<Option<Submission>> {
        let row = sqlx::query_as::<_, SubmissionRow>(
            r#"
            SELECT
                s.id, s.artist_id, s.status,
                p.id AS playlist_id, p.creator_id, p.name AS playlist_name, p.submission_fee,
                so.title AS song_title
            FROM submissions s
            JOIN playlists p ON p.id = s.playlist_id
            JOIN songs so ON so.id = s.song_id
            WHERE s.id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(RepositoryError::from)?;

        Ok(row.map(SubmissionRow::into_domain))
    }

    async fn mark_pending_review(&self, id: Uuid) -> RepositoryResult<()> {
        let result = sqlx::query(
            "UPDATE submissions SET status = 'pending', updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(RepositoryError::from)?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound(format!("submission {}", id)));
        }
        Ok(())
    }
}

#[async_trait]
impl PayoutAccountDirectory for PgSettlementStore {
    async fn payout_address(&self, user_id: Uuid) -> RepositoryResult<Option<String>> {
        let address = sqlx::query_scalar::<_, String>(
            "SELECT payout_email FROM payout_accounts WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(RepositoryError::from)?;

        Ok(address)
    }
}

#[async_trait]
impl ReconciliationLog for PgSettlementStore {
    async fn record(&self, record: &ReconciliationRecord) -> RepositoryResult<()> {
        sqlx::query(
            r#"
            INSERT INTO reconciliation_records (id, kind, reference_id, user_id, amount, reason, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(record.id)
        .bind(record.kind.as_str())
        .bind(record.reference_id)
        .bind(record.user_id)
        .bind(record.amount)
        .bind(&record.reason)
        .bind(record.created_at)
        .execute(&self.pool)
        .await
        .map_err(RepositoryError::from)?;

        Ok(())
    }

    async fn list(&self, limit: i64) -> RepositoryResult<Vec<ReconciliationRecord>> {
        let rows = sqlx::query_as::<_, ReconciliationRow>(
            "SELECT id, kind, reference_id, user_id, amount, reason, created_at \
             FROM reconciliation_records ORDER BY created_at DESC LIMIT $1",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(RepositoryError::from)?;

        rows.into_iter().map(ReconciliationRow::into_domain).collect()
    }
}

/// Internal row types for SQLx. Not exposed outside the adapter.
#[derive(Debug, sqlx::FromRow)]
struct TransactionRow {
    id: Uuid,
    submission_id: Uuid,
    payment_method_id: String,
    payer_id: Uuid,
    payee_id: Uuid,
    amount_total: i64,
    currency: String,
    platform_fee: i64,
    creator_payout_amount: i64,
    status: String,
    provider_transaction_id: Option<String>,
    approval_url: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TransactionRow {
    fn into_domain(self) -> RepositoryResult<Transaction> {
        let status = self
            .status
            .parse::<TransactionStatus>()
            .map_err(|e| RepositoryError::Database(e.to_string()))?;

        Ok(Transaction {
            id: self.id,
            submission_id: self.submission_id,
            payment_method_id: self.payment_method_id,
            payer_id: self.payer_id,
            payee_id: self.payee_id,
            amount_total: self.amount_total,
            currency: self.currency,
            platform_fee: self.platform_fee,
            creator_payout_amount: self.creator_payout_amount,
            status,
            provider_transaction_id: self.provider_transaction_id,
            approval_url: self.approval_url,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct WithdrawalRow {
    id: Uuid,
    user_id: Uuid,
    amount: i64,
    currency: String,
    status: String,
    requested_at: DateTime<Utc>,
    processed_at: Option<DateTime<Utc>>,
    payout_batch_id: Option<String>,
    provider_payload: Option<serde_json::Value>,
    error_message: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl WithdrawalRow {
    fn into_domain(self) -> RepositoryResult<Withdrawal> {
        let status = self
            .status
            .parse()
            .map_err(|e: crate::domain::DomainError| RepositoryError::Database(e.to_string()))?;

        Ok(Withdrawal {
            id: self.id,
            user_id: self.user_id,
            amount: self.amount,
            currency: self.currency,
            status,
            requested_at: self.requested_at,
            processed_at: self.processed_at,
            payout_batch_id: self.payout_batch_id,
            provider_payload: self.provider_payload,
            error_message: self.error_message,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct SubmissionRow {
    id: Uuid,
    artist_id: Uuid,
    status: String,
    playlist_id: Uuid,
    creator_id: Uuid,
    playlist_name: String,
    submission_fee: BigDecimal,
    song_title: String,
}

impl SubmissionRow {
    fn into_domain(self) -> Submission {
        Submission {
            id: self.id,
            artist_id: self.artist_id,
            status: self.status,
            playlist: PlaylistRef {
                id: self.playlist_id,
                creator_id: self.creator_id,
                name: self.playlist_name,
                submission_fee: self.submission_fee,
            },
            song: SongRef {
                title: self.song_title,
            },
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ReconciliationRow {
    id: Uuid,
    kind: String,
    reference_id: Uuid,
    user_id: Uuid,
    amount: i64,
    reason: String,
    created_at: DateTime<Utc>,
}

impl ReconciliationRow {
    fn into_domain(self) -> RepositoryResult<ReconciliationRecord> {
        let kind = ReconciliationKind::parse(&self.kind).ok_or_else(|| {
            RepositoryError::Database(format!("unknown reconciliation kind {:?}", self.kind))
        })?;

        Ok(ReconciliationRecord {
            id: self.id,
            kind,
            reference_id: self.reference_id,
            user_id: self.user_id,
            amount: self.amount,
            reason: self.reason,
            created_at: self.created_at,
        })
    }
}
