//! Repository for the `models` and `model_likes` tables.

use agora_core::listing::ListingStatus;
use agora_core::types::DbId;
use sqlx::PgPool;

use crate::models::model::{CreateModel, LikeState, Model, ModelSummary};

const COLUMNS: &str = "id, author_id, name, description, price_cents, variant_id, tags, \
                       features, use_cases, setup, file_path, file_name, file_size_bytes, \
                       size_is_legacy, image_path, status, validation_result, downloads, \
                       approved_at, created_at, updated_at";

/// Summary projection; expects `models m` joined with `users u`.
const SUMMARY_SELECT: &str = "SELECT m.id, m.name, m.description, m.price_cents, m.tags, \
        m.status, m.image_path, m.downloads, \
        (SELECT COUNT(*) FROM model_likes l WHERE l.model_id = m.id) AS likes, \
        m.author_id, u.username AS author_username, u.email AS author_email, m.created_at \
     FROM models m JOIN users u ON u.id = m.author_id";

pub struct ModelRepo;

impl ModelRepo {
    /// Insert a listing. New listings always start pending.
    pub async fn create(pool: &PgPool, input: &CreateModel) -> Result<Model, sqlx::Error> {
        let query = format!(
            "INSERT INTO models
                (author_id, name, description, price_cents, variant_id, tags, features,
                 use_cases, setup, file_path, file_name, file_size_bytes, image_path,
                 validation_result)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Model>(&query)
            .bind(input.author_id)
            .bind(&input.name)
            .bind(&input.description)
            .bind(input.price_cents)
            .bind(&input.variant_id)
            .bind(&input.tags)
            .bind(&input.features)
            .bind(&input.use_cases)
            .bind(&input.setup)
            .bind(&input.file_path)
            .bind(&input.file_name)
            .bind(input.file_size_bytes)
            .bind(&input.image_path)
            .bind(&input.validation_result)
            .fetch_one(pool)
            .await
    }

    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<Model>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM models WHERE id = $1");
        sqlx::query_as::<_, Model>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Approved listings, newest first, optionally filtered by a `LIKE`
    /// pattern on name, description or tags.
    pub async fn list_approved(
        pool: &PgPool,
        pattern: Option<&str>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<ModelSummary>, sqlx::Error> {
        let query = format!(
            "{SUMMARY_SELECT}
             WHERE m.status = 'approved'
               AND ($1::TEXT IS NULL
                    OR m.name ILIKE $1
                    OR m.description ILIKE $1
                    OR EXISTS (SELECT 1 FROM unnest(m.tags) t WHERE t ILIKE $1))
             ORDER BY m.created_at DESC, m.id DESC
             LIMIT $2 OFFSET $3"
        );
        sqlx::query_as::<_, ModelSummary>(&query)
            .bind(pattern)
            .bind(limit)
            .bind(offset)
            .fetch_all(pool)
            .await
    }

    pub async fn list_by_author(
        pool: &PgPool,
        author_id: DbId,
    ) -> Result<Vec<ModelSummary>, sqlx::Error> {
        let query = format!(
            "{SUMMARY_SELECT}
             WHERE m.author_id = $1
             ORDER BY m.created_at DESC, m.id DESC"
        );
        sqlx::query_as::<_, ModelSummary>(&query)
            .bind(author_id)
            .fetch_all(pool)
            .await
    }

    /// Moderation queue, oldest first.
    pub async fn list_pending(pool: &PgPool) -> Result<Vec<ModelSummary>, sqlx::Error> {
        let query = format!(
            "{SUMMARY_SELECT}
             WHERE m.status = 'pending'
             ORDER BY m.created_at ASC, m.id ASC"
        );
        sqlx::query_as::<_, ModelSummary>(&query)
            .fetch_all(pool)
            .await
    }

    /// Approve a listing. Returns `None` when it does not exist or was
    /// already approved.
    pub async fn approve(pool: &PgPool, id: DbId) -> Result<Option<Model>, sqlx::Error> {
        let query = format!(
            "UPDATE models SET status = $2, approved_at = NOW()
             WHERE id = $1 AND status <> $2
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Model>(&query)
            .bind(id)
            .bind(ListingStatus::Approved.name())
            .fetch_optional(pool)
            .await
    }

    /// Delete a listing, returning the deleted row so stored files can be
    /// cleaned up.
    pub async fn delete(pool: &PgPool, id: DbId) -> Result<Option<Model>, sqlx::Error> {
        let query = format!("DELETE FROM models WHERE id = $1 RETURNING {COLUMNS}");
        sqlx::query_as::<_, Model>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Delete a listing still awaiting review. Approved listings are left
    /// in place and `None` is returned.
    pub async fn delete_unapproved(pool: &PgPool, id: DbId) -> Result<Option<Model>, sqlx::Error> {
        let query =
            format!("DELETE FROM models WHERE id = $1 AND status <> $2 RETURNING {COLUMNS}");
        sqlx::query_as::<_, Model>(&query)
            .bind(id)
            .bind(ListingStatus::Approved.name())
            .fetch_optional(pool)
            .await
    }

    /// Like the listing if the user has not, otherwise remove the like.
    pub async fn toggle_like(
        pool: &PgPool,
        model_id: DbId,
        user_id: DbId,
    ) -> Result<LikeState, sqlx::Error> {
        let mut tx = pool.begin().await?;
        let removed = sqlx::query("DELETE FROM model_likes WHERE model_id = $1 AND user_id = $2")
            .bind(model_id)
            .bind(user_id)
            .execute(&mut *tx)
            .await?
            .rows_affected()
            > 0;
        if !removed {
            sqlx::query(
                "INSERT INTO model_likes (model_id, user_id) VALUES ($1, $2)
                 ON CONFLICT ON CONSTRAINT uq_model_likes_model_user DO NOTHING",
            )
            .bind(model_id)
            .bind(user_id)
            .execute(&mut *tx)
            .await?;
        }
        let likes: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM model_likes WHERE model_id = $1")
            .bind(model_id)
            .fetch_one(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(LikeState {
            is_liked: !removed,
            likes,
        })
    }

    pub async fn increment_downloads(pool: &PgPool, id: DbId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("UPDATE models SET downloads = downloads + 1 WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
