//! Repository for the `purchases` table.

use agora_core::types::{DbId, Timestamp};
use sqlx::PgPool;

use crate::models::purchase::{CreatePurchase, Purchase};

const COLUMNS: &str = "id, order_id, model_id, buyer_id, buyer_email, model_name, \
                       total_cents, status, created_at, updated_at";

pub struct PurchaseRepo;

impl PurchaseRepo {
    /// Record a paid order. Returns `None` when the order id was already
    /// recorded, which makes webhook redelivery a no-op.
    pub async fn create(
        pool: &PgPool,
        input: &CreatePurchase,
    ) -> Result<Option<Purchase>, sqlx::Error> {
        let query = format!(
            "INSERT INTO purchases (order_id, model_id, buyer_id, buyer_email, model_name, total_cents)
             VALUES ($1, $2, $3, $4, $5, $6)
             ON CONFLICT ON CONSTRAINT uq_purchases_order_id DO NOTHING
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Purchase>(&query)
            .bind(&input.order_id)
            .bind(input.model_id)
            .bind(input.buyer_id)
            .bind(&input.buyer_email)
            .bind(&input.model_name)
            .bind(input.total_cents)
            .fetch_optional(pool)
            .await
    }

    /// Record a paid order together with the seller's earning.
    ///
    /// Both rows commit or neither does, so a failed earning insert leaves
    /// the order unrecorded and a redelivery can complete it. Returns `None`
    /// when the order id was already recorded.
    pub async fn record_sale(
        pool: &PgPool,
        input: &CreatePurchase,
        seller_id: DbId,
        amount_cents: i64,
        release_at: Timestamp,
    ) -> Result<Option<Purchase>, sqlx::Error> {
        let mut tx = pool.begin().await?;
        let query = format!(
            "INSERT INTO purchases (order_id, model_id, buyer_id, buyer_email, model_name, total_cents)
             VALUES ($1, $2, $3, $4, $5, $6)
             ON CONFLICT ON CONSTRAINT uq_purchases_order_id DO NOTHING
             RETURNING {COLUMNS}"
        );
        let Some(purchase) = sqlx::query_as::<_, Purchase>(&query)
            .bind(&input.order_id)
            .bind(input.model_id)
            .bind(input.buyer_id)
            .bind(&input.buyer_email)
            .bind(&input.model_name)
            .bind(input.total_cents)
            .fetch_optional(&mut *tx)
            .await?
        else {
            return Ok(None);
        };
        sqlx::query(
            "INSERT INTO earnings (seller_id, purchase_id, amount_cents, release_at)
             VALUES ($1, $2, $3, $4)
             ON CONFLICT ON CONSTRAINT uq_earnings_purchase_id DO NOTHING",
        )
        .bind(seller_id)
        .bind(purchase.id)
        .bind(amount_cents)
        .bind(release_at)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(Some(purchase))
    }

    /// Purchases made by a user, matched by account or checkout email.
    pub async fn list_for_buyer(
        pool: &PgPool,
        buyer_id: DbId,
        buyer_email: &str,
    ) -> Result<Vec<Purchase>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM purchases
             WHERE buyer_id = $1 OR buyer_email = $2
             ORDER BY created_at DESC, id DESC"
        );
        sqlx::query_as::<_, Purchase>(&query)
            .bind(buyer_id)
            .bind(buyer_email)
            .fetch_all(pool)
            .await
    }

    pub async fn has_purchased(
        pool: &PgPool,
        model_id: DbId,
        buyer_id: DbId,
        buyer_email: &str,
    ) -> Result<bool, sqlx::Error> {
        sqlx::query_scalar(
            "SELECT EXISTS (
                SELECT 1 FROM purchases
                WHERE model_id = $1 AND (buyer_id = $2 OR buyer_email = $3)
             )",
        )
        .bind(model_id)
        .bind(buyer_id)
        .bind(buyer_email)
        .fetch_one(pool)
        .await
    }
}
