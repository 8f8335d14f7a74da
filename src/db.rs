// src/db.rs

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::error::{LedgerError, Result};
use crate::models::{
    Declaration, DeclarationStatus, UserProfile, Wallet, Withdrawal,
};
use crate::store::LedgerStore;

const DECLARATION_COLUMNS: &str = "id, clipper_id, clip_url, declared_views, paid_views, earnings, \
     status, verification_code, rejection_reason, payout_id, payout_claimed_at, paid_at, \
     created_at, updated_at";

const WITHDRAWAL_COLUMNS: &str = "id, user_id, amount, method, destination, status, payout_id, \
     failure_reason, processing_since, created_at, completed_at";

fn declaration_from_row(r: &PgRow) -> Result<Declaration> {
    Ok(Declaration {
        id: r.get("id"),
        clipper_id: r.get("clipper_id"),
        clip_url: r.get("clip_url"),
        declared_views: r.get("declared_views"),
        paid_views: r.get("paid_views"),
        earnings: r.get("earnings"),
        status: r.get::<String, _>("status").parse()?,
        verification_code: r.get("verification_code"),
        rejection_reason: r.get("rejection_reason"),
        payout_id: r.get("payout_id"),
        payout_claimed_at: r.get("payout_claimed_at"),
        paid_at: r.get("paid_at"),
        created_at: r.get("created_at"),
        updated_at: r.get("updated_at"),
    })
}

fn withdrawal_from_row(r: &PgRow) -> Result<Withdrawal> {
    Ok(Withdrawal {
        id: r.get("id"),
        user_id: r.get("user_id"),
        amount: r.get("amount"),
        method: r.get::<String, _>("method").parse()?,
        destination: r.get("destination"),
        status: r.get::<String, _>("status").parse()?,
        payout_id: r.get("payout_id"),
        failure_reason: r.get("failure_reason"),
        processing_since: r.get("processing_since"),
        created_at: r.get("created_at"),
        completed_at: r.get("completed_at"),
    })
}

/// Postgres-backed ledger. Multi-row effects are single statements built from
/// data-modifying CTEs, so each call commits atomically on its own.
#[derive(Clone)]
pub struct PgLedgerStore {
    pool: PgPool,
}

impl PgLedgerStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPool::connect(database_url).await?;
        Ok(Self::new(pool))
    }

    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!()
            .run(&self.pool)
            .await
            .map_err(|e| LedgerError::Internal(format!("migrations failed: {e}")))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl LedgerStore for PgLedgerStore {
    async fn get_declaration(&self, id: Uuid) -> Result<Option<Declaration>> {
        let sql = format!("SELECT {DECLARATION_COLUMNS} FROM declarations WHERE id = $1");
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(declaration_from_row).transpose()
    }

    async fn find_declaration(
        &self,
        clipper_id: Uuid,
        clip_url: &str,
    ) -> Result<Option<Declaration>> {
        let sql = format!(
            "SELECT {DECLARATION_COLUMNS} FROM declarations WHERE clipper_id = $1 AND clip_url = $2"
        );
        let row = sqlx::query(&sql)
            .bind(clipper_id)
            .bind(clip_url)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(declaration_from_row).transpose()
    }

    async fn insert_declaration(&self, d: &Declaration) -> Result<bool> {
        let result = sqlx::query(
            r#"INSERT INTO declarations
                   (id, clipper_id, clip_url, declared_views, paid_views, earnings, status,
                    verification_code, created_at, updated_at)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
               ON CONFLICT (clipper_id, clip_url) DO NOTHING"#,
        )
        .bind(d.id)
        .bind(d.clipper_id)
        .bind(&d.clip_url)
        .bind(d.declared_views)
        .bind(d.paid_views)
        .bind(d.earnings)
        .bind(d.status.as_str())
        .bind(d.verification_code.as_deref())
        .bind(d.created_at)
        .bind(d.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn update_declaration_views(
        &self,
        updated: &Declaration,
        expected_paid_views: i64,
        expected_status: DeclarationStatus,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"UPDATE declarations
               SET declared_views = $1,
                   paid_views = $2,
                   earnings = $3,
                   status = $4,
                   verification_code = COALESCE($5, verification_code),
                   rejection_reason = $6,
                   updated_at = $7
               WHERE id = $8
                 AND paid_views = $9
                 AND status = $10
                 AND payout_claimed_at IS NULL"#,
        )
        .bind(updated.declared_views)
        .bind(updated.paid_views)
        .bind(updated.earnings)
        .bind(updated.status.as_str())
        .bind(updated.verification_code.as_deref())
        .bind(updated.rejection_reason.as_deref())
        .bind(updated.updated_at)
        .bind(updated.id)
        .bind(expected_paid_views)
        .bind(expected_status.as_str())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn transition_declaration(
        &self,
        id: Uuid,
        from: DeclarationStatus,
        to: DeclarationStatus,
        rejection_reason: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"UPDATE declarations
               SET status = $1,
                   rejection_reason = COALESCE($2, rejection_reason),
                   updated_at = $3
               WHERE id = $4 AND status = $5 AND payout_claimed_at IS NULL"#,
        )
        .bind(to.as_str())
        .bind(rejection_reason)
        .bind(now)
        .bind(id)
        .bind(from.as_str())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn claim_declaration_payout(
        &self,
        id: Uuid,
        now: DateTime<Utc>,
        stale_before: DateTime<Utc>,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"UPDATE declarations
               SET payout_claimed_at = $1
               WHERE id = $2
                 AND status = 'approved'
                 AND (payout_claimed_at IS NULL OR payout_claimed_at < $3)"#,
        )
        .bind(now)
        .bind(id)
        .bind(stale_before)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn complete_declaration_payout(
        &self,
        id: Uuid,
        payout_id: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"UPDATE declarations
               SET status = 'paid', payout_id = $1, payout_claimed_at = NULL,
                   paid_at = $2, updated_at = $2
               WHERE id = $3 AND status = 'approved'"#,
        )
        .bind(payout_id)
        .bind(now)
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn release_declaration_payout(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query(
            r#"UPDATE declarations
               SET payout_claimed_at = NULL
               WHERE id = $1 AND status = 'approved' AND payout_claimed_at IS NOT NULL"#,
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn list_declarations_for_clipper(&self, clipper_id: Uuid) -> Result<Vec<Declaration>> {
        let sql = format!(
            "SELECT {DECLARATION_COLUMNS} FROM declarations WHERE clipper_id = $1 ORDER BY created_at DESC"
        );
        let rows = sqlx::query(&sql)
            .bind(clipper_id)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(declaration_from_row).collect()
    }

    async fn list_declarations_for_clip(&self, clip_url: &str) -> Result<Vec<Declaration>> {
        let sql = format!(
            "SELECT {DECLARATION_COLUMNS} FROM declarations WHERE clip_url = $1 ORDER BY created_at DESC"
        );
        let rows = sqlx::query(&sql)
            .bind(clip_url)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(declaration_from_row).collect()
    }

    async fn stale_declaration_claims(
        &self,
        stale_before: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Uuid>> {
        let rows = sqlx::query(
            r#"SELECT id
               FROM declarations
               WHERE status = 'approved' AND payout_claimed_at < $1
               ORDER BY payout_claimed_at ASC
               LIMIT $2"#,
        )
        .bind(stale_before)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|r| r.get("id")).collect())
    }

    async fn user_profile(&self, user_id: Uuid) -> Result<Option<UserProfile>> {
        let row = sqlx::query("SELECT id, balance, payout_account_id FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|r| UserProfile {
            id: r.get("id"),
            balance: r.get("balance"),
            payout_account_id: r.get("payout_account_id"),
        }))
    }

    async fn get_or_create_wallet(&self, user_id: Uuid) -> Result<Wallet> {
        // the no-op update makes RETURNING yield the existing row
        let row = sqlx::query(
            r#"INSERT INTO wallets (user_id, balance)
               VALUES ($1, 0)
               ON CONFLICT (user_id) DO UPDATE SET user_id = EXCLUDED.user_id
               RETURNING user_id, balance, updated_at"#,
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(Wallet {
            user_id: row.get("user_id"),
            balance: row.get("balance"),
            updated_at: row.get("updated_at"),
        })
    }

    async fn credit_wallet(&self, user_id: Uuid, amount: i64) -> Result<i64> {
        let row = sqlx::query(
            r#"WITH w AS (
                   INSERT INTO wallets (user_id, balance, updated_at)
                   VALUES ($1, $2, NOW())
                   ON CONFLICT (user_id) DO UPDATE
                       SET balance = wallets.balance + EXCLUDED.balance, updated_at = NOW()
                   RETURNING user_id, balance
               ), mirror AS (
                   UPDATE users u SET balance = w.balance FROM w WHERE u.id = w.user_id
               )
               SELECT balance FROM w"#,
        )
        .bind(user_id)
        .bind(amount)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.get("balance"))
    }

    async fn debit_wallet(&self, user_id: Uuid, amount: i64) -> Result<Option<i64>> {
        let row = sqlx::query(
            r#"WITH w AS (
                   UPDATE wallets
                   SET balance = balance - $2, updated_at = NOW()
                   WHERE user_id = $1 AND balance >= $2
                   RETURNING user_id, balance
               ), mirror AS (
                   UPDATE users u SET balance = w.balance FROM w WHERE u.id = w.user_id
               )
               SELECT balance FROM w"#,
        )
        .bind(user_id)
        .bind(amount)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| r.get("balance")))
    }

    async fn credit_for_event(
        &self,
        event_id: &str,
        event_type: &str,
        user_id: Uuid,
        amount: i64,
    ) -> Result<Option<i64>> {
        let row = sqlx::query(
            r#"WITH claimed AS (
                   INSERT INTO processed_webhook_events (event_id, event_type)
                   VALUES ($1, $2)
                   ON CONFLICT (event_id) DO NOTHING
                   RETURNING event_id
               ), w AS (
                   INSERT INTO wallets (user_id, balance, updated_at)
                   SELECT $3, $4, NOW() FROM claimed
                   ON CONFLICT (user_id) DO UPDATE
                       SET balance = wallets.balance + EXCLUDED.balance, updated_at = NOW()
                   RETURNING user_id, balance
               ), mirror AS (
                   UPDATE users u SET balance = w.balance FROM w WHERE u.id = w.user_id
               )
               SELECT balance FROM w"#,
        )
        .bind(event_id)
        .bind(event_type)
        .bind(user_id)
        .bind(amount)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| r.get("balance")))
    }

    async fn record_event(&self, event_id: &str, event_type: &str) -> Result<bool> {
        let result = sqlx::query(
            r#"INSERT INTO processed_webhook_events (event_id, event_type)
               VALUES ($1, $2)
               ON CONFLICT (event_id) DO NOTHING"#,
        )
        .bind(event_id)
        .bind(event_type)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn insert_withdrawal(&self, w: &Withdrawal) -> Result<()> {
        sqlx::query(
            r#"INSERT INTO withdrawals
                   (id, user_id, amount, method, destination, status, created_at)
               VALUES ($1, $2, $3, $4, $5, $6, $7)"#,
        )
        .bind(w.id)
        .bind(w.user_id)
        .bind(w.amount)
        .bind(w.method.as_str())
        .bind(&w.destination)
        .bind(w.status.as_str())
        .bind(w.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_withdrawal(&self, id: Uuid) -> Result<Option<Withdrawal>> {
        let sql = format!("SELECT {WITHDRAWAL_COLUMNS} FROM withdrawals WHERE id = $1");
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(withdrawal_from_row).transpose()
    }

    async fn list_withdrawals_for_user(&self, user_id: Uuid) -> Result<Vec<Withdrawal>> {
        let sql = format!(
            "SELECT {WITHDRAWAL_COLUMNS} FROM withdrawals WHERE user_id = $1 ORDER BY created_at DESC"
        );
        let rows = sqlx::query(&sql)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(withdrawal_from_row).collect()
    }

    async fn claim_withdrawal(
        &self,
        id: Uuid,
        now: DateTime<Utc>,
        stale_before: DateTime<Utc>,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"UPDATE withdrawals
               SET processing_since = $1
               WHERE id = $2
                 AND status = 'pending'
                 AND (processing_since IS NULL OR processing_since < $3)"#,
        )
        .bind(now)
        .bind(id)
        .bind(stale_before)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn complete_withdrawal(
        &self,
        id: Uuid,
        payout_id: &str,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"UPDATE withdrawals
               SET status = 'completed', payout_id = $1, processing_since = NULL, completed_at = $2
               WHERE id = $3 AND status = 'pending'"#,
        )
        .bind(payout_id)
        .bind(now)
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn fail_withdrawal(&self, id: Uuid, reason: &str, now: DateTime<Utc>) -> Result<bool> {
        let row = sqlx::query(
            r#"WITH failed AS (
                   UPDATE withdrawals
                   SET status = 'failed', failure_reason = $1, processing_since = NULL,
                       completed_at = $2
                   WHERE id = $3 AND status = 'pending'
                   RETURNING user_id, amount
               ), w AS (
                   INSERT INTO wallets (user_id, balance, updated_at)
                   SELECT user_id, amount, NOW() FROM failed
                   ON CONFLICT (user_id) DO UPDATE
                       SET balance = wallets.balance + EXCLUDED.balance, updated_at = NOW()
                   RETURNING user_id, balance
               ), mirror AS (
                   UPDATE users u SET balance = w.balance FROM w WHERE u.id = w.user_id
               )
               SELECT user_id FROM failed"#,
        )
        .bind(reason)
        .bind(now)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.is_some())
    }

    async fn stale_withdrawal_claims(
        &self,
        stale_before: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Uuid>> {
        let rows = sqlx::query(
            r#"SELECT id
               FROM withdrawals
               WHERE status = 'pending' AND processing_since < $1
               ORDER BY processing_since ASC
               LIMIT $2"#,
        )
        .bind(stale_before)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|r| r.get("id")).collect())
    }
}
