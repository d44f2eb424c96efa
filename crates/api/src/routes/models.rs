//! Route definitions for the `/models` resource.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::models;
use crate::state::AppState;

/// Routes mounted at `/models`.
///
/// ```text
/// GET    /                -> list_models
/// POST   /                -> create_model (multipart)
/// GET    /options         -> upload_options
/// GET    /{id}            -> get_model
/// DELETE /{id}            -> delete_model (author only)
/// POST   /{id}/like       -> toggle_like
/// GET    /{id}/download   -> download_model (buyers and author)
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(models::list_models).post(models::create_model))
        .route("/options", get(models::upload_options))
        .route("/{id}", get(models::get_model).delete(models::delete_model))
        .route("/{id}/like", post(models::toggle_like))
        .route("/{id}/download", get(models::download_model))
}
