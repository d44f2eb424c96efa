//! Route definitions for checkouts and payment webhooks.

use axum::routing::post;
use axum::Router;

use crate::handlers::{automations, payments};
use crate::state::AppState;

/// Routes mounted at `/checkout`.
///
/// ```text
/// POST /               -> create_checkout (requires auth)
/// POST /subscription   -> create_subscription_checkout
/// ```
pub fn checkout_router() -> Router<AppState> {
    Router::new()
        .route("/", post(payments::create_checkout))
        .route("/subscription", post(payments::create_subscription_checkout))
}

/// Routes mounted at `/webhooks`. Authenticated by signature, not token.
///
/// ```text
/// POST /lemon                -> order_webhook
/// POST /lemon/subscription   -> subscription_webhook
/// POST /automation-complete  -> automations::completion_webhook
/// ```
pub fn webhook_router() -> Router<AppState> {
    Router::new()
        .route("/lemon", post(payments::order_webhook))
        .route("/lemon/subscription", post(payments::subscription_webhook))
        .route("/automation-complete", post(automations::completion_webhook))
}
