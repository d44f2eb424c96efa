//! Route definitions for the `/conversations` resource.

use axum::routing::get;
use axum::Router;

use crate::handlers::conversations;
use crate::state::AppState;

/// Routes mounted at `/conversations`.
///
/// ```text
/// GET    /                 -> list_conversations
/// POST   /                 -> create_conversation
/// GET    /{id}             -> get_conversation
/// DELETE /{id}             -> delete_conversation
/// GET    /{id}/messages    -> list_messages
/// POST   /{id}/messages    -> append_message
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/",
            get(conversations::list_conversations).post(conversations::create_conversation),
        )
        .route(
            "/{id}",
            get(conversations::get_conversation).delete(conversations::delete_conversation),
        )
        .route(
            "/{id}/messages",
            get(conversations::list_messages).post(conversations::append_message),
        )
}
