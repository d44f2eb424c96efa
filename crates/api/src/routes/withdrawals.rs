//! Route definitions for the `/withdraw` resource.

use axum::routing::get;
use axum::Router;

use crate::handlers::withdrawals;
use crate::state::AppState;

/// Routes mounted at `/withdraw`.
///
/// ```text
/// GET  /                    -> list_withdrawals
/// POST /                    -> create_withdrawal
/// GET  /available-balance   -> available_balance
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/",
            get(withdrawals::list_withdrawals).post(withdrawals::create_withdrawal),
        )
        .route("/available-balance", get(withdrawals::available_balance))
}
