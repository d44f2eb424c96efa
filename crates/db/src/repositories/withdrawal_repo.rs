//! Repository for the `withdrawal_requests` table.

use agora_core::error::CoreError;
use agora_core::payouts::{decide_withdrawal, WithdrawalDecision, WithdrawalStatus};
use agora_core::types::DbId;
use sqlx::PgPool;

use crate::models::withdrawal::WithdrawalRequest;

const SELECT: &str = "SELECT w.id, w.user_id, u.email AS user_email, u.username, \
        w.amount_cents, w.paypal_email, w.status, w.rejected_reason, w.decided_by, \
        w.approved_at, w.decided_at, w.created_at \
     FROM withdrawal_requests w JOIN users u ON u.id = w.user_id";

/// Result of an admin status change.
#[derive(Debug)]
pub enum WithdrawalUpdate {
    NotFound,
    Invalid(CoreError),
    Applied {
        request: WithdrawalRequest,
        decision: WithdrawalDecision,
    },
}

pub struct WithdrawalRepo;

impl WithdrawalRepo {
    /// Insert a pending request if it fits the user's balance.
    ///
    /// The user row is locked while pending requests are summed so two
    /// concurrent requests cannot both spend the same balance. Returns
    /// `None` when `amount_cents` exceeds what is left of `released_cents`.
    pub async fn create_within_balance(
        pool: &PgPool,
        user_id: DbId,
        paypal_email: &str,
        amount_cents: i64,
        released_cents: i64,
    ) -> Result<Option<WithdrawalRequest>, sqlx::Error> {
        let mut tx = pool.begin().await?;
        let withdrawn: i64 =
            sqlx::query_scalar("SELECT withdrawn_cents FROM users WHERE id = $1 FOR UPDATE")
                .bind(user_id)
                .fetch_one(&mut *tx)
                .await?;
        let pending: i64 = sqlx::query_scalar(
            "SELECT COALESCE(SUM(amount_cents), 0)::BIGINT FROM withdrawal_requests
             WHERE user_id = $1 AND status = 'pending'",
        )
        .bind(user_id)
        .fetch_one(&mut *tx)
        .await?;
        if amount_cents > released_cents - withdrawn - pending {
            return Ok(None);
        }
        let id: DbId = sqlx::query_scalar(
            "INSERT INTO withdrawal_requests (user_id, amount_cents, paypal_email)
             VALUES ($1, $2, $3) RETURNING id",
        )
        .bind(user_id)
        .bind(amount_cents)
        .bind(paypal_email)
        .fetch_one(&mut *tx)
        .await?;
        let query = format!("{SELECT} WHERE w.id = $1");
        let request = sqlx::query_as::<_, WithdrawalRequest>(&query)
            .bind(id)
            .fetch_one(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(Some(request))
    }

    pub async fn find_by_id(
        pool: &PgPool,
        id: DbId,
    ) -> Result<Option<WithdrawalRequest>, sqlx::Error> {
        let query = format!("{SELECT} WHERE w.id = $1");
        sqlx::query_as::<_, WithdrawalRequest>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Every request, newest first, optionally filtered by status.
    pub async fn list_all(
        pool: &PgPool,
        status: Option<WithdrawalStatus>,
    ) -> Result<Vec<WithdrawalRequest>, sqlx::Error> {
        let query = format!(
            "{SELECT}
             WHERE ($1::TEXT IS NULL OR w.status = $1)
             ORDER BY w.created_at DESC, w.id DESC"
        );
        sqlx::query_as::<_, WithdrawalRequest>(&query)
            .bind(status.map(WithdrawalStatus::name))
            .fetch_all(pool)
            .await
    }

    pub async fn list_for_user(
        pool: &PgPool,
        user_id: DbId,
    ) -> Result<Vec<WithdrawalRequest>, sqlx::Error> {
        let query = format!(
            "{SELECT}
             WHERE w.user_id = $1
             ORDER BY w.created_at DESC, w.id DESC"
        );
        sqlx::query_as::<_, WithdrawalRequest>(&query)
            .bind(user_id)
            .fetch_all(pool)
            .await
    }

    /// Sum of the user's requests still awaiting a decision.
    pub async fn pending_total(pool: &PgPool, user_id: DbId) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar(
            "SELECT COALESCE(SUM(amount_cents), 0)::BIGINT FROM withdrawal_requests
             WHERE user_id = $1 AND status = 'pending'",
        )
        .bind(user_id)
        .fetch_one(pool)
        .await
    }

    /// Apply an admin decision in one transaction.
    ///
    /// Approval adds the amount to the user's `withdrawn_cents` so the
    /// balance stays consistent with the request status.
    pub async fn decide(
        pool: &PgPool,
        id: DbId,
        admin_id: DbId,
        requested: WithdrawalStatus,
        rejected_reason: Option<&str>,
    ) -> Result<WithdrawalUpdate, sqlx::Error> {
        let mut tx = pool.begin().await?;
        let current: Option<(DbId, String, i64)> = sqlx::query_as(
            "SELECT user_id, status, amount_cents FROM withdrawal_requests
             WHERE id = $1 FOR UPDATE",
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?;
        let Some((user_id, status, amount_cents)) = current else {
            return Ok(WithdrawalUpdate::NotFound);
        };
        let current = match WithdrawalStatus::parse(&status) {
            Ok(s) => s,
            Err(e) => return Ok(WithdrawalUpdate::Invalid(e)),
        };
        let decision = match decide_withdrawal(current, requested, rejected_reason) {
            Ok(d) => d,
            Err(e) => return Ok(WithdrawalUpdate::Invalid(e)),
        };

        match &decision {
            WithdrawalDecision::Unchanged => {}
            WithdrawalDecision::Approve => {
                sqlx::query(
                    "UPDATE withdrawal_requests
                     SET status = 'approved', decided_by = $2, approved_at = NOW(), decided_at = NOW()
                     WHERE id = $1",
                )
                .bind(id)
                .bind(admin_id)
                .execute(&mut *tx)
                .await?;
                sqlx::query("UPDATE users SET withdrawn_cents = withdrawn_cents + $2 WHERE id = $1")
                    .bind(user_id)
                    .bind(amount_cents)
                    .execute(&mut *tx)
                    .await?;
            }
            WithdrawalDecision::Reject { reason } => {
                sqlx::query(
                    "UPDATE withdrawal_requests
                     SET status = 'rejected', decided_by = $2, rejected_reason = $3, decided_at = NOW()
                     WHERE id = $1",
                )
                .bind(id)
                .bind(admin_id)
                .bind(reason)
                .execute(&mut *tx)
                .await?;
            }
        }

        let query = format!("{SELECT} WHERE w.id = $1");
        let request = sqlx::query_as::<_, WithdrawalRequest>(&query)
            .bind(id)
            .fetch_one(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(WithdrawalUpdate::Applied { request, decision })
    }
}
