//! Handlers for the `/admin` resource: listing moderation and payouts.
//!
//! Every endpoint requires the admin role via [`RequireAdmin`].

use agora_core::error::CoreError;
use agora_core::listing::{ListingStatus, ModerationAction};
use agora_core::payouts::{WithdrawalDecision, WithdrawalStatus};
use agora_core::types::DbId;
use agora_db::models::model::{Model, ModelSummary};
use agora_db::models::withdrawal::WithdrawalRequest;
use agora_db::repositories::{ModelRepo, WithdrawalRepo, WithdrawalUpdate};
use agora_events::bus::{MODEL_APPROVED, MODEL_REJECTED, WITHDRAWAL_DECIDED};
use agora_events::PlatformEvent;
use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::models::remove_stored_files;
use crate::error::{AppError, AppResult};
use crate::middleware::rbac::RequireAdmin;
use crate::response::DataResponse;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct ModerateModelRequest {
    pub action: String,
    pub rejection_reason: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ModerationResult {
    pub id: DbId,
    pub status: &'static str,
    /// The listing as approved; rejected listings are deleted.
    pub model: Option<Model>,
}

#[derive(Debug, Deserialize)]
pub struct WithdrawalListQuery {
    pub status: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DecideWithdrawalRequest {
    pub status: String,
    pub rejected_reason: Option<String>,
}

// ---------------------------------------------------------------------------
// Moderation
// ---------------------------------------------------------------------------

/// GET /api/v1/admin/models
///
/// Listings waiting for review, oldest first.
pub async fn list_pending_models(
    RequireAdmin(_admin): RequireAdmin,
    State(state): State<AppState>,
) -> AppResult<Json<DataResponse<Vec<ModelSummary>>>> {
    let data = ModelRepo::list_pending(&state.pool).await?;
    Ok(Json(DataResponse { data }))
}

/// PATCH /api/v1/admin/models/{id}
///
/// `approve` publishes the listing. `reject` requires a reason, deletes the
/// listing with its files, and tells the author why. Approved listings
/// cannot be rejected.
pub async fn moderate_model(
    RequireAdmin(admin): RequireAdmin,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
    Json(input): Json<ModerateModelRequest>,
) -> AppResult<Json<DataResponse<ModerationResult>>> {
    let action = ModerationAction::parse(&input.action, input.rejection_reason.as_deref())?;
    if ModelRepo::find_by_id(&state.pool, id).await?.is_none() {
        return Err(AppError::not_found("Model", id));
    }

    let result = match action {
        ModerationAction::Approve => {
            let approved = ModelRepo::approve(&state.pool, id).await?.ok_or_else(|| {
                AppError::Core(CoreError::Conflict("Model is already approved".into()))
            })?;
            state.event_bus.publish(
                PlatformEvent::new(MODEL_APPROVED)
                    .with_source("model", id)
                    .with_actor(approved.author_id)
                    .with_payload(json!({ "name": approved.name })),
            );
            tracing::info!(model_id = id, admin_id = admin.user_id, "Model approved");
            ModerationResult {
                id,
                status: ListingStatus::Approved.name(),
                model: Some(approved),
            }
        }
        ModerationAction::Reject { reason } => {
            let model = ModelRepo::delete_unapproved(&state.pool, id).await?.ok_or_else(|| {
                AppError::Core(CoreError::Conflict("Approved listings cannot be rejected".into()))
            })?;
            remove_stored_files(&state, &model).await;
            state.event_bus.publish(
                PlatformEvent::new(MODEL_REJECTED)
                    .with_source("model", id)
                    .with_actor(model.author_id)
                    .with_payload(json!({ "name": model.name, "reason": reason })),
            );
            tracing::info!(model_id = id, admin_id = admin.user_id, %reason, "Model rejected");
            ModerationResult {
                id,
                status: ListingStatus::Rejected.name(),
                model: None,
            }
        }
    };

    Ok(Json(DataResponse { data: result }))
}

// ---------------------------------------------------------------------------
// Withdrawals
// ---------------------------------------------------------------------------

/// GET /api/v1/admin/withdrawals?status=
pub async fn list_withdrawals(
    RequireAdmin(_admin): RequireAdmin,
    State(state): State<AppState>,
    Query(query): Query<WithdrawalListQuery>,
) -> AppResult<Json<DataResponse<Vec<WithdrawalRequest>>>> {
    let status = query
        .status
        .as_deref()
        .filter(|s| !s.is_empty() && *s != "all")
        .map(WithdrawalStatus::parse)
        .transpose()?;
    let data = WithdrawalRepo::list_all(&state.pool, status).await?;
    Ok(Json(DataResponse { data }))
}

/// PUT /api/v1/admin/withdrawals/{id}
///
/// Approving adds the amount to the seller's withdrawn total. Requests that
/// were already decided answer 409.
pub async fn decide_withdrawal(
    RequireAdmin(admin): RequireAdmin,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
    Json(input): Json<DecideWithdrawalRequest>,
) -> AppResult<Json<DataResponse<WithdrawalRequest>>> {
    let requested = WithdrawalStatus::parse(&input.status)?;

    let update = WithdrawalRepo::decide(
        &state.pool,
        id,
        admin.user_id,
        requested,
        input.rejected_reason.as_deref(),
    )
    .await?;

    let (request, decision) = match update {
        WithdrawalUpdate::NotFound => return Err(AppError::not_found("WithdrawalRequest", id)),
        WithdrawalUpdate::Invalid(e) => return Err(e.into()),
        WithdrawalUpdate::Applied { request, decision } => (request, decision),
    };

    if decision != WithdrawalDecision::Unchanged {
        state.event_bus.publish(
            PlatformEvent::new(WITHDRAWAL_DECIDED)
                .with_source("withdrawal_request", id)
                .with_actor(request.user_id)
                .with_payload(json!({
                    "status": request.status,
                    "amount_cents": request.amount_cents,
                    "reason": request.rejected_reason,
                })),
        );
        tracing::info!(
            request_id = id,
            admin_id = admin.user_id,
            status = %request.status,
            "Withdrawal decided"
        );
    }

    Ok(Json(DataResponse { data: request }))
}
