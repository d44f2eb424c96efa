//! Repository for saved AI conversations.

use agora_core::types::DbId;
use sqlx::PgPool;

use crate::models::conversation::{Conversation, ConversationMessage};

const COLUMNS: &str = "id, user_id, title, created_at, updated_at";
const MESSAGE_COLUMNS: &str = "id, conversation_id, role, content, created_at";

pub struct ConversationRepo;

impl ConversationRepo {
    pub async fn create(
        pool: &PgPool,
        user_id: DbId,
        title: &str,
    ) -> Result<Conversation, sqlx::Error> {
        let query = format!(
            "INSERT INTO conversations (user_id, title) VALUES ($1, $2) RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Conversation>(&query)
            .bind(user_id)
            .bind(title)
            .fetch_one(pool)
            .await
    }

    /// Most recently active first.
    pub async fn list_for_user(
        pool: &PgPool,
        user_id: DbId,
    ) -> Result<Vec<Conversation>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM conversations
             WHERE user_id = $1
             ORDER BY updated_at DESC, id DESC"
        );
        sqlx::query_as::<_, Conversation>(&query)
            .bind(user_id)
            .fetch_all(pool)
            .await
    }

    pub async fn find_for_user(
        pool: &PgPool,
        id: DbId,
        user_id: DbId,
    ) -> Result<Option<Conversation>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM conversations WHERE id = $1 AND user_id = $2");
        sqlx::query_as::<_, Conversation>(&query)
            .bind(id)
            .bind(user_id)
            .fetch_optional(pool)
            .await
    }

    pub async fn delete(pool: &PgPool, id: DbId, user_id: DbId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM conversations WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(user_id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn list_messages(
        pool: &PgPool,
        conversation_id: DbId,
    ) -> Result<Vec<ConversationMessage>, sqlx::Error> {
        let query = format!(
            "SELECT {MESSAGE_COLUMNS} FROM conversation_messages
             WHERE conversation_id = $1
             ORDER BY id ASC"
        );
        sqlx::query_as::<_, ConversationMessage>(&query)
            .bind(conversation_id)
            .fetch_all(pool)
            .await
    }

    /// Append a message and bump the conversation's `updated_at`.
    pub async fn append_message(
        pool: &PgPool,
        conversation_id: DbId,
        role: &str,
        content: &str,
    ) -> Result<ConversationMessage, sqlx::Error> {
        let mut tx = pool.begin().await?;
        let query = format!(
            "INSERT INTO conversation_messages (conversation_id, role, content)
             VALUES ($1, $2, $3)
             RETURNING {MESSAGE_COLUMNS}"
        );
        let message = sqlx::query_as::<_, ConversationMessage>(&query)
            .bind(conversation_id)
            .bind(role)
            .bind(content)
            .fetch_one(&mut *tx)
            .await?;
        sqlx::query("UPDATE conversations SET updated_at = NOW() WHERE id = $1")
            .bind(conversation_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(message)
    }
}
