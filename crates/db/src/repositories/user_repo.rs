//! Repository for the `users` table.

use agora_core::plans::Plan;
use agora_core::storage::RecordedSize;
use agora_core::types::DbId;
use sqlx::PgPool;

use crate::models::user::{CreateUser, StoredFileSize, User};

const COLUMNS: &str = "id, email, username, role, plan, email_verified, withdrawn_cents, \
                       subscription_id, subscription_status, last_login_at, created_at, updated_at";

pub struct UserRepo;

impl UserRepo {
    /// Insert a new, unverified user.
    pub async fn create(pool: &PgPool, input: &CreateUser) -> Result<User, sqlx::Error> {
        let query = format!(
            "INSERT INTO users (email, username, role)
             VALUES ($1, $2, $3)
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, User>(&query)
            .bind(&input.email)
            .bind(&input.username)
            .bind(&input.role)
            .fetch_one(pool)
            .await
    }

    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<User>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM users WHERE id = $1");
        sqlx::query_as::<_, User>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Emails are stored normalized, so callers pass a normalized address.
    pub async fn find_by_email(pool: &PgPool, email: &str) -> Result<Option<User>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM users WHERE email = $1");
        sqlx::query_as::<_, User>(&query)
            .bind(email)
            .fetch_optional(pool)
            .await
    }

    /// Case-insensitive lookup, so `Alice` and `alice` cannot both register.
    pub async fn find_by_username(
        pool: &PgPool,
        username: &str,
    ) -> Result<Option<User>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM users WHERE LOWER(username) = LOWER($1)");
        sqlx::query_as::<_, User>(&query)
            .bind(username)
            .fetch_optional(pool)
            .await
    }

    /// Mark the email verified and stamp the login time.
    pub async fn record_verified_login(pool: &PgPool, id: DbId) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE users SET email_verified = true, last_login_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Set the subscription plan for the account with `email`.
    ///
    /// Returns `false` when no account has that email.
    pub async fn update_subscription(
        pool: &PgPool,
        email: &str,
        plan: Plan,
        status: &str,
        subscription_id: Option<&str>,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE users SET
                plan = $2,
                subscription_status = $3,
                subscription_id = COALESCE($4, subscription_id)
             WHERE email = $1",
        )
        .bind(email)
        .bind(plan.name())
        .bind(status)
        .bind(subscription_id)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Sizes of every file the user has uploaded, pending or live.
    pub async fn stored_file_sizes(
        pool: &PgPool,
        user_id: DbId,
    ) -> Result<Vec<StoredFileSize>, sqlx::Error> {
        sqlx::query_as::<_, StoredFileSize>(
            "SELECT file_size_bytes, size_is_legacy FROM models WHERE author_id = $1",
        )
        .bind(user_id)
        .fetch_all(pool)
        .await
    }

    /// Total bytes stored by the user, with legacy sizes normalized.
    pub async fn storage_used_bytes(pool: &PgPool, user_id: DbId) -> Result<i64, sqlx::Error> {
        let sizes = Self::stored_file_sizes(pool, user_id).await?;
        Ok(sizes
            .into_iter()
            .map(|s| {
                RecordedSize {
                    value: s.file_size_bytes,
                    legacy: s.size_is_legacy,
                }
                .bytes()
            })
            .sum())
    }
}
