//! Repository for the `otp_codes` table.

use agora_core::otp::OtpPurpose;
use agora_core::types::{DbId, Timestamp};
use sqlx::PgPool;

use crate::models::otp::OtpCode;

const COLUMNS: &str =
    "id, email, purpose, code_hash, expires_at, attempts, consumed_at, created_at, updated_at";

pub struct OtpRepo;

impl OtpRepo {
    /// Store a new code, discarding any outstanding code for the same
    /// address and purpose.
    pub async fn issue(
        pool: &PgPool,
        email: &str,
        purpose: OtpPurpose,
        code_hash: &str,
        expires_at: Timestamp,
    ) -> Result<OtpCode, sqlx::Error> {
        let mut tx = pool.begin().await?;
        sqlx::query("DELETE FROM otp_codes WHERE email = $1 AND purpose = $2 AND consumed_at IS NULL")
            .bind(email)
            .bind(purpose.name())
            .execute(&mut *tx)
            .await?;
        let query = format!(
            "INSERT INTO otp_codes (email, purpose, code_hash, expires_at)
             VALUES ($1, $2, $3, $4)
             RETURNING {COLUMNS}"
        );
        let code = sqlx::query_as::<_, OtpCode>(&query)
            .bind(email)
            .bind(purpose.name())
            .bind(code_hash)
            .bind(expires_at)
            .fetch_one(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(code)
    }

    /// The latest unconsumed code for an address, in any purpose.
    pub async fn find_outstanding(
        pool: &PgPool,
        email: &str,
    ) -> Result<Option<OtpCode>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM otp_codes
             WHERE email = $1 AND consumed_at IS NULL
             ORDER BY created_at DESC, id DESC
             LIMIT 1"
        );
        sqlx::query_as::<_, OtpCode>(&query)
            .bind(email)
            .fetch_optional(pool)
            .await
    }

    /// When the last code for this address and purpose was issued.
    pub async fn last_issued_at(
        pool: &PgPool,
        email: &str,
        purpose: OtpPurpose,
    ) -> Result<Option<Timestamp>, sqlx::Error> {
        sqlx::query_scalar(
            "SELECT MAX(created_at) FROM otp_codes WHERE email = $1 AND purpose = $2",
        )
        .bind(email)
        .bind(purpose.name())
        .fetch_one(pool)
        .await
    }

    pub async fn record_failed_attempt(pool: &PgPool, id: DbId) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE otp_codes SET attempts = attempts + 1 WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(())
    }

    /// Mark a code used. Returns `false` if it was already consumed, so two
    /// concurrent verifications cannot both succeed.
    pub async fn consume(pool: &PgPool, id: DbId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE otp_codes SET consumed_at = NOW() WHERE id = $1 AND consumed_at IS NULL",
        )
        .bind(id)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Remove codes that expired more than a day ago.
    pub async fn cleanup_expired(pool: &PgPool) -> Result<u64, sqlx::Error> {
        let result =
            sqlx::query("DELETE FROM otp_codes WHERE expires_at < NOW() - INTERVAL '1 day'")
                .execute(pool)
                .await?;
        Ok(result.rows_affected())
    }
}
