use agora_core::types::{DbId, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

/// A row from `withdrawal_requests`, joined with the requester's identity.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct WithdrawalRequest {
    pub id: DbId,
    pub user_id: DbId,
    pub user_email: String,
    pub username: String,
    pub amount_cents: i64,
    pub paypal_email: String,
    pub status: String,
    pub rejected_reason: Option<String>,
    pub decided_by: Option<DbId>,
    pub approved_at: Option<Timestamp>,
    pub decided_at: Option<Timestamp>,
    pub created_at: Timestamp,
}
