//! Repository for the `earnings` table.

use agora_core::types::{DbId, Timestamp};
use sqlx::PgPool;

use crate::models::earning::{Earning, EarningTotals};

pub struct EarningRepo;

impl EarningRepo {
    /// Credit a seller for a purchase. Returns `false` if the purchase was
    /// already credited.
    pub async fn create(
        pool: &PgPool,
        seller_id: DbId,
        purchase_id: DbId,
        amount_cents: i64,
        release_at: Timestamp,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "INSERT INTO earnings (seller_id, purchase_id, amount_cents, release_at)
             VALUES ($1, $2, $3, $4)
             ON CONFLICT ON CONSTRAINT uq_earnings_purchase_id DO NOTHING",
        )
        .bind(seller_id)
        .bind(purchase_id)
        .bind(amount_cents)
        .bind(release_at)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Lifetime total and the part already past its release time.
    pub async fn totals(pool: &PgPool, seller_id: DbId) -> Result<EarningTotals, sqlx::Error> {
        sqlx::query_as::<_, EarningTotals>(
            "SELECT
                COALESCE(SUM(amount_cents), 0)::BIGINT AS total,
                COALESCE(SUM(amount_cents) FILTER (WHERE release_at <= NOW()), 0)::BIGINT AS released
             FROM earnings WHERE seller_id = $1",
        )
        .bind(seller_id)
        .fetch_one(pool)
        .await
    }

    /// Earnings the seller can withdraw against.
    pub async fn released_total(pool: &PgPool, seller_id: DbId) -> Result<i64, sqlx::Error> {
        Ok(Self::totals(pool, seller_id).await?.released)
    }

    pub async fn list_for_seller(
        pool: &PgPool,
        seller_id: DbId,
    ) -> Result<Vec<Earning>, sqlx::Error> {
        sqlx::query_as::<_, Earning>(
            "SELECT e.id, e.seller_id, e.purchase_id, e.amount_cents, e.release_at,
                    p.model_name, p.buyer_email, e.created_at
             FROM earnings e JOIN purchases p ON p.id = e.purchase_id
             WHERE e.seller_id = $1
             ORDER BY e.created_at DESC, e.id DESC",
        )
        .bind(seller_id)
        .fetch_all(pool)
        .await
    }
}
