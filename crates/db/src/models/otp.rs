use agora_core::otp::StoredCode;
use agora_core::types::{DbId, Timestamp};
use sqlx::FromRow;

/// A row from the `otp_codes` table.
#[derive(Debug, Clone, FromRow)]
pub struct OtpCode {
    pub id: DbId,
    pub email: String,
    pub purpose: String,
    pub code_hash: String,
    pub expires_at: Timestamp,
    pub attempts: i32,
    pub consumed_at: Option<Timestamp>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl OtpCode {
    pub fn stored(&self) -> StoredCode<'_> {
        StoredCode {
            code_hash: &self.code_hash,
            expires_at: self.expires_at,
            attempts: self.attempts,
        }
    }
}
