//! Route definitions for the `/auth` resource.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::auth;
use crate::state::AppState;

/// Routes mounted at `/auth`.
///
/// ```text
/// POST /signup          -> signup
/// POST /signin          -> signin
/// POST /verify-otp      -> verify_otp
/// POST /refresh         -> refresh
/// POST /logout          -> logout (requires auth)
/// GET  /check-username  -> check_username
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/signup", post(auth::signup))
        .route("/signin", post(auth::signin))
        .route("/verify-otp", post(auth::verify_otp))
        .route("/refresh", post(auth::refresh))
        .route("/logout", post(auth::logout))
        .route("/check-username", get(auth::check_username))
}
