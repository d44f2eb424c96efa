use agora_core::types::{DbId, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

/// A row from the `earnings` table joined with the sale it came from.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Earning {
    pub id: DbId,
    pub seller_id: DbId,
    pub purchase_id: DbId,
    pub amount_cents: i64,
    pub release_at: Timestamp,
    pub model_name: String,
    pub buyer_email: String,
    pub created_at: Timestamp,
}

/// Lifetime and withdrawable earnings of a seller, in cents.
#[derive(Debug, Clone, Copy, Default, FromRow, Serialize)]
pub struct EarningTotals {
    pub total: i64,
    pub released: i64,
}
