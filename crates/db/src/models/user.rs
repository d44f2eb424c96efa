//! User entity and DTOs.

use agora_core::plans::Plan;
use agora_core::types::{DbId, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

/// A row from the `users` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct User {
    pub id: DbId,
    pub email: String,
    pub username: String,
    pub role: String,
    pub plan: String,
    pub email_verified: bool,
    pub withdrawn_cents: i64,
    pub subscription_id: Option<String>,
    pub subscription_status: Option<String>,
    pub last_login_at: Option<Timestamp>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl User {
    pub fn plan(&self) -> Plan {
        Plan::from_name(&self.plan)
    }
}

/// DTO for creating a user. New accounts start unverified.
#[derive(Debug)]
pub struct CreateUser {
    pub email: String,
    pub username: String,
    pub role: String,
}

/// A stored file size, as recorded on a model row.
#[derive(Debug, Clone, Copy, FromRow)]
pub struct StoredFileSize {
    pub file_size_bytes: i64,
    pub size_is_legacy: bool,
}
