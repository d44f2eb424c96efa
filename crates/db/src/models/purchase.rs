use agora_core::types::{DbId, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

/// A row from the `purchases` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Purchase {
    pub id: DbId,
    pub order_id: String,
    pub model_id: Option<DbId>,
    pub buyer_id: Option<DbId>,
    pub buyer_email: String,
    pub model_name: String,
    pub total_cents: i64,
    pub status: String,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

#[derive(Debug)]
pub struct CreatePurchase {
    pub order_id: String,
    pub model_id: DbId,
    pub buyer_id: Option<DbId>,
    pub buyer_email: String,
    pub model_name: String,
    pub total_cents: i64,
}
