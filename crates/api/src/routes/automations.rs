//! Route definitions for the `/automations` resource.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::automations;
use crate::state::AppState;

/// Routes mounted at `/automations`.
///
/// ```text
/// GET  /                   -> list_automations
/// POST /                   -> create_automation (multipart)
/// GET  /search             -> search_automations
/// GET  /stats              -> stats
/// POST /execute            -> execute_automation
/// POST /activate           -> activate_automation
/// GET  /{id}               -> get_automation
/// POST /{id}/toggle        -> toggle_automation
/// POST /{id}/activate-background -> activate_background
/// POST /{id}/files         -> upload_file (multipart)
/// POST /{id}/n8n/import    -> import_to_n8n (owner only)
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/",
            get(automations::list_automations).post(automations::create_automation),
        )
        .route("/search", get(automations::search_automations))
        .route("/stats", get(automations::stats))
        .route("/execute", post(automations::execute_automation))
        .route("/activate", post(automations::activate_automation))
        .route("/{id}", get(automations::get_automation))
        .route("/{id}/toggle", post(automations::toggle_automation))
        .route(
            "/{id}/activate-background",
            post(automations::activate_background),
        )
        .route("/{id}/files", post(automations::upload_file))
        .route("/{id}/n8n/import", post(automations::import_to_n8n))
}
