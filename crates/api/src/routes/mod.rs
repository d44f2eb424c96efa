pub mod admin;
pub mod ai;
pub mod auth;
pub mod automations;
pub mod conversations;
pub mod health;
pub mod models;
pub mod notifications;
pub mod payments;
pub mod user;
pub mod withdrawals;

use axum::Router;

use crate::state::AppState;

/// Build the `/api/v1` route tree.
///
/// Route hierarchy:
///
/// ```text
/// /auth/signup                         signup (public)
/// /auth/signin                         request a sign-in code (public)
/// /auth/verify-otp                     exchange a code for tokens (public)
/// /auth/refresh                        refresh (public)
/// /auth/logout                         logout (requires auth)
/// /auth/check-username                 availability check (public)
///
/// /user/profile                        profile and plan features
/// /user/storage                        storage usage
/// /user/storage/check                  upload dry run (POST)
/// /user/earnings                       balance and earnings
/// /user/purchases                      purchased models
/// /user/models                         own listings
/// /user/automations                    own automations
/// /user/connections                    store connected-account tokens
/// /user/connections/{provider}         connection status
///
/// /models                              list (public), upload
/// /models/options                      wizard price tiers and tags (public)
/// /models/{id}                         get (public), delete
/// /models/{id}/like                    toggle like
/// /models/{id}/download                download archive
///
/// /automations                         list (public), publish
/// /automations/search                  search (public)
/// /automations/stats                   run statistics
/// /automations/execute                 run an automation
/// /automations/activate                install and switch on
/// /automations/{id}                    get (public)
/// /automations/{id}/toggle             enable or disable
/// /automations/{id}/activate-background  keep running on the runner
/// /automations/{id}/files              upload into automation storage
/// /automations/{id}/n8n/import         push the workflow to n8n
///
/// /withdraw                            list, request
/// /withdraw/available-balance          balance
///
/// /admin/models                        pending listings (admin only)
/// /admin/models/{id}                   approve or reject
/// /admin/withdrawals                   list payout requests
/// /admin/withdrawals/{id}              decide a payout request
///
/// /checkout                            model checkout
/// /checkout/subscription               plan checkout
/// /webhooks/lemon                      order webhook (signed)
/// /webhooks/lemon/subscription         subscription webhook (signed)
/// /webhooks/automation-complete        runner completion report (signed)
///
/// /notifications                       list, delete
/// /notifications/read-all              mark all read
/// /notifications/unread-count          unread count
/// /notifications/{id}/read             mark read
///
/// /conversations                       list, create
/// /conversations/{id}                  get, delete
/// /conversations/{id}/messages         list, append
///
/// /ai/stream                           assistant chat (SSE)
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .nest("/auth", auth::router())
        .nest("/user", user::router())
        .nest("/models", models::router())
        .nest("/automations", automations::router())
        .nest("/withdraw", withdrawals::router())
        .nest("/admin", admin::router())
        .nest("/checkout", payments::checkout_router())
        .nest("/webhooks", payments::webhook_router())
        .nest("/notifications", notifications::router())
        .nest("/conversations", conversations::router())
        .nest("/ai", ai::router())
}
