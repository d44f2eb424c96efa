//! Route definitions for the `/ai` resource.

use axum::routing::post;
use axum::Router;

use crate::handlers::ai;
use crate::state::AppState;

/// Routes mounted at `/ai`.
///
/// ```text
/// POST /stream   -> stream_chat (text/event-stream)
/// ```
pub fn router() -> Router<AppState> {
    Router::new().route("/stream", post(ai::stream_chat))
}
