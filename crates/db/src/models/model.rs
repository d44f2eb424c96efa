//! Model listing entity and DTOs.

use agora_core::types::{DbId, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

/// A row from the `models` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Model {
    pub id: DbId,
    pub author_id: DbId,
    pub name: String,
    pub description: String,
    pub price_cents: i64,
    pub variant_id: String,
    pub tags: Vec<String>,
    pub features: Vec<String>,
    pub use_cases: Vec<String>,
    pub setup: String,
    #[serde(skip_serializing)]
    pub file_path: String,
    pub file_name: String,
    pub file_size_bytes: i64,
    #[serde(skip_serializing)]
    pub size_is_legacy: bool,
    pub image_path: Option<String>,
    pub status: String,
    pub validation_result: Option<serde_json::Value>,
    pub downloads: i64,
    pub approved_at: Option<Timestamp>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// A listing joined with its author and like count, for marketplace pages.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct ModelSummary {
    pub id: DbId,
    pub name: String,
    pub description: String,
    pub price_cents: i64,
    pub tags: Vec<String>,
    pub status: String,
    pub image_path: Option<String>,
    pub downloads: i64,
    pub likes: i64,
    pub author_id: DbId,
    pub author_username: String,
    pub author_email: String,
    pub created_at: Timestamp,
}

#[derive(Debug)]
pub struct CreateModel {
    pub author_id: DbId,
    pub name: String,
    pub description: String,
    pub price_cents: i64,
    pub variant_id: String,
    pub tags: Vec<String>,
    pub features: Vec<String>,
    pub use_cases: Vec<String>,
    pub setup: String,
    pub file_path: String,
    pub file_name: String,
    pub file_size_bytes: i64,
    pub image_path: Option<String>,
    pub validation_result: Option<serde_json::Value>,
}

/// Result of toggling a like.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct LikeState {
    pub is_liked: bool,
    pub likes: i64,
}
