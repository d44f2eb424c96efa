//! Handlers for the `/withdraw` resource: seller payout requests.

use agora_core::error::CoreError;
use agora_core::payouts::{format_currency, validate_withdrawal, Balance};
use agora_core::types::DbId;
use agora_db::models::withdrawal::WithdrawalRequest;
use agora_db::repositories::{EarningRepo, WithdrawalRepo};
use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

use super::user::{balance_for, load_user};
use crate::error::{AppError, AppResult};
use crate::middleware::auth::AuthUser;
use crate::response::DataResponse;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateWithdrawalRequest {
    pub paypal_email: Option<String>,
    /// Amount in cents.
    pub amount: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct WithdrawalCreated {
    pub request_id: DbId,
    pub message: String,
}

/// GET /api/v1/withdraw/available-balance
pub async fn available_balance(
    auth: AuthUser,
    State(state): State<AppState>,
) -> AppResult<Json<DataResponse<Balance>>> {
    let user = load_user(&state, auth.user_id).await?;
    let data = balance_for(&state, &user).await?;
    Ok(Json(DataResponse { data }))
}

/// GET /api/v1/withdraw
///
/// The caller's own requests, newest first.
pub async fn list_withdrawals(
    auth: AuthUser,
    State(state): State<AppState>,
) -> AppResult<Json<DataResponse<Vec<WithdrawalRequest>>>> {
    let data = WithdrawalRepo::list_for_user(&state.pool, auth.user_id).await?;
    Ok(Json(DataResponse { data }))
}

/// POST /api/v1/withdraw
///
/// The balance is checked twice: up front for a friendly message, then
/// again under a row lock when the request is written.
pub async fn create_withdrawal(
    auth: AuthUser,
    State(state): State<AppState>,
    Json(input): Json<CreateWithdrawalRequest>,
) -> AppResult<(StatusCode, Json<WithdrawalCreated>)> {
    let user = load_user(&state, auth.user_id).await?;
    let balance = balance_for(&state, &user).await?;
    let (paypal_email, amount) =
        validate_withdrawal(input.paypal_email.as_deref(), input.amount, balance.available)?;

    let released = EarningRepo::released_total(&state.pool, user.id).await?;
    let request =
        WithdrawalRepo::create_within_balance(&state.pool, user.id, &paypal_email, amount, released)
            .await?
            .ok_or_else(|| {
                AppError::Core(CoreError::Validation(
                    "Amount exceeds available balance".into(),
                ))
            })?;

    tracing::info!(
        request_id = request.id,
        user_id = user.id,
        amount_cents = amount,
        "Withdrawal requested"
    );
    Ok((
        StatusCode::CREATED,
        Json(WithdrawalCreated {
            request_id: request.id,
            message: format!(
                "Withdrawal request for {} submitted",
                format_currency(amount)
            ),
        }),
    ))
}
