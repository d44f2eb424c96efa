//! Route definitions for the `/admin` resource.
//!
//! All endpoints require the admin role.

use axum::routing::{get, patch, put};
use axum::Router;

use crate::handlers::admin;
use crate::state::AppState;

/// Routes mounted at `/admin`.
///
/// ```text
/// GET   /models             -> list_pending_models
/// PATCH /models/{id}        -> moderate_model
/// GET   /withdrawals        -> list_withdrawals
/// PUT   /withdrawals/{id}   -> decide_withdrawal
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/models", get(admin::list_pending_models))
        .route("/models/{id}", patch(admin::moderate_model))
        .route("/withdrawals", get(admin::list_withdrawals))
        .route("/withdrawals/{id}", put(admin::decide_withdrawal))
}
