//! Handlers for the `/conversations` resource: saved assistant chats.

use agora_core::chat::{ROLE_ASSISTANT, ROLE_USER};
use agora_core::types::DbId;
use agora_db::models::conversation::{Conversation, ConversationMessage};
use agora_db::repositories::ConversationRepo;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use validator::Validate;

use crate::error::{AppError, AppResult};
use crate::middleware::auth::AuthUser;
use crate::response::DataResponse;
use crate::state::AppState;

const DEFAULT_TITLE: &str = "New conversation";
const MAX_TITLE_CHARS: usize = 120;

#[derive(Debug, Deserialize)]
pub struct CreateConversationRequest {
    pub title: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct AppendMessageRequest {
    pub role: String,
    #[validate(length(max = 32000, message = "Message is too long"))]
    pub content: String,
}

/// GET /api/v1/conversations
pub async fn list_conversations(
    auth: AuthUser,
    State(state): State<AppState>,
) -> AppResult<Json<DataResponse<Vec<Conversation>>>> {
    let data = ConversationRepo::list_for_user(&state.pool, auth.user_id).await?;
    Ok(Json(DataResponse { data }))
}

/// POST /api/v1/conversations
pub async fn create_conversation(
    auth: AuthUser,
    State(state): State<AppState>,
    Json(input): Json<CreateConversationRequest>,
) -> AppResult<(StatusCode, Json<DataResponse<Conversation>>)> {
    let title = input
        .title
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(|t| t.chars().take(MAX_TITLE_CHARS).collect::<String>())
        .unwrap_or_else(|| DEFAULT_TITLE.to_string());

    let data = ConversationRepo::create(&state.pool, auth.user_id, &title).await?;
    Ok((StatusCode::CREATED, Json(DataResponse { data })))
}

/// GET /api/v1/conversations/{id}
pub async fn get_conversation(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<Json<DataResponse<Conversation>>> {
    let data = owned(&state, id, auth.user_id).await?;
    Ok(Json(DataResponse { data }))
}

/// DELETE /api/v1/conversations/{id}
pub async fn delete_conversation(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<StatusCode> {
    if !ConversationRepo::delete(&state.pool, id, auth.user_id).await? {
        return Err(AppError::not_found("Conversation", id));
    }
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/v1/conversations/{id}/messages
pub async fn list_messages(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<Json<DataResponse<Vec<ConversationMessage>>>> {
    owned(&state, id, auth.user_id).await?;
    let data = ConversationRepo::list_messages(&state.pool, id).await?;
    Ok(Json(DataResponse { data }))
}

/// POST /api/v1/conversations/{id}/messages
///
/// Clients store their own side of the chat here; assistant replies from
/// `/ai/stream` are saved by the server.
pub async fn append_message(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
    Json(input): Json<AppendMessageRequest>,
) -> AppResult<(StatusCode, Json<DataResponse<ConversationMessage>>)> {
    if input.role != ROLE_USER && input.role != ROLE_ASSISTANT {
        return Err(AppError::BadRequest(
            "role must be user or assistant".into(),
        ));
    }
    if input.content.trim().is_empty() {
        return Err(AppError::BadRequest("content is required".into()));
    }
    input.validate()?;
    owned(&state, id, auth.user_id).await?;

    let data = ConversationRepo::append_message(&state.pool, id, &input.role, &input.content).await?;
    Ok((StatusCode::CREATED, Json(DataResponse { data })))
}

async fn owned(state: &AppState, id: DbId, user_id: DbId) -> AppResult<Conversation> {
    ConversationRepo::find_for_user(&state.pool, id, user_id)
        .await?
        .ok_or_else(|| AppError::not_found("Conversation", id))
}
