//! Handler for the assistant chat stream.

use std::convert::Infallible;

use agora_core::chat::{build_chat_messages, ChatMessage, ROLE_ASSISTANT};
use agora_core::types::DbId;
use agora_db::repositories::ConversationRepo;
use axum::body::Body;
use axum::extract::State;
use axum::http::header;
use axum::response::Response;
use axum::Json;
use futures::StreamExt;
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::error::{AppError, AppResult};
use crate::middleware::auth::AuthUser;
use crate::services::chat::pipeline::{self, TurnContext};
use crate::services::chat::Emitter;
use crate::state::AppState;

/// Frames buffered between the turn and the response body.
const STREAM_BUFFER: usize = 64;

const APOLOGY: &str = "Sorry, something went wrong. Please try again.";

#[derive(Debug, Deserialize)]
pub struct StreamRequest {
    pub prompt: Option<String>,
    pub messages: Option<Vec<ChatMessage>>,
    pub conversation_id: Option<DbId>,
}

/// POST /api/v1/ai/stream
///
/// The orchestrator decides before the stream opens, so a provider rate
/// limit can still answer 429 JSON. Everything after that is SSE frames
/// ending in `[DONE]`.
pub async fn stream_chat(
    auth: AuthUser,
    State(state): State<AppState>,
    Json(input): Json<StreamRequest>,
) -> AppResult<Response> {
    let messages = build_chat_messages(input.messages, input.prompt.as_deref()).ok_or_else(|| {
        AppError::BadRequest("Either 'prompt' or 'messages' is required".into())
    })?;

    if let Some(id) = input.conversation_id {
        ConversationRepo::find_for_user(&state.pool, id, auth.user_id)
            .await?
            .ok_or_else(|| AppError::not_found("Conversation", id))?;
    }

    let ai = state.ai()?.clone();
    let decision = pipeline::decide(ai.as_ref(), &messages).await?;
    tracing::debug!(
        user_id = auth.user_id,
        tool = decision.action.as_ref().map(|a| a.tool.name()),
        "Orchestrator decided"
    );

    let ctx = TurnContext {
        pool: state.pool.clone(),
        ai,
        runner: state.integrations.runner.clone(),
        drive: state.integrations.drive.clone(),
        encryptor: state.integrations.encryptor.clone(),
        user_id: auth.user_id,
    };
    let (tx, rx) = mpsc::channel(STREAM_BUFFER);
    let conversation_id = input.conversation_id;

    tokio::spawn(async move {
        let mut emitter = Emitter::new(tx);
        let closed = emitter.closed();

        let turn = tokio::select! {
            result = pipeline::run_turn(&ctx, &messages, decision, &mut emitter) => result,
            _ = closed => return,
        };
        if turn.is_err() {
            tracing::debug!(user_id = ctx.user_id, "Chat client disconnected");
            return;
        }

        if let Some(id) = conversation_id {
            let text = emitter.transcript().trim().to_string();
            if !text.is_empty() {
                if let Err(e) =
                    ConversationRepo::append_message(&ctx.pool, id, ROLE_ASSISTANT, &text).await
                {
                    tracing::error!(conversation_id = id, error = %e, "Failed to save reply");
                    let _ = emitter.say(APOLOGY).await;
                }
            }
        }
        let _ = emitter.done().await;
    });

    let body = Body::from_stream(ReceiverStream::new(rx).map(Ok::<_, Infallible>));
    Response::builder()
        .header(header::CONTENT_TYPE, "text/event-stream")
        .header(header::CACHE_CONTROL, "no-cache")
        .header(header::CONNECTION, "keep-alive")
        .body(body)
        .map_err(|e| AppError::InternalError(e.to_string()))
}
