use agora_core::types::{DbId, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

/// A row from the `conversations` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Conversation {
    pub id: DbId,
    pub user_id: DbId,
    pub title: String,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// A row from the `conversation_messages` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct ConversationMessage {
    pub id: DbId,
    pub conversation_id: DbId,
    pub role: String,
    pub content: String,
    pub created_at: Timestamp,
}
