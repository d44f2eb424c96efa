//! Route definitions for the `/user` resource.
//!
//! All endpoints act on the signed-in account.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::user;
use crate::state::AppState;

/// Routes mounted at `/user`.
///
/// ```text
/// GET  /profile        -> profile
/// GET  /storage        -> storage
/// POST /storage/check  -> check_storage
/// GET  /earnings       -> earnings
/// GET  /purchases      -> purchases
/// GET  /models         -> models
/// GET  /automations    -> automations
/// POST /connections     -> connect_account
/// GET  /connections/{provider} -> connection
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/profile", get(user::profile))
        .route("/storage", get(user::storage))
        .route("/storage/check", post(user::check_storage))
        .route("/earnings", get(user::earnings))
        .route("/purchases", get(user::purchases))
        .route("/models", get(user::models))
        .route("/automations", get(user::automations))
        .route("/connections", post(user::connect_account))
        .route("/connections/{provider}", get(user::connection))
}
