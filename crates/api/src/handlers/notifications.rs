//! Handlers for the `/notifications` inbox.
//!
//! Rows are written by the event notifier; users can only read, mark and
//! delete their own.

use agora_core::search::{clamp_limit, clamp_offset};
use agora_core::types::DbId;
use agora_db::models::notification::Notification;
use agora_db::repositories::NotificationRepo;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};
use crate::middleware::auth::AuthUser;
use crate::response::DataResponse;
use crate::state::AppState;

const INBOX_PAGE: i64 = 50;
const INBOX_PAGE_MAX: i64 = 100;

#[derive(Debug, Deserialize)]
pub struct InboxQuery {
    #[serde(default)]
    pub unread_only: bool,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct DeleteNotifications {
    pub ids: Vec<DbId>,
}

#[derive(Debug, Serialize)]
pub struct MarkedRead {
    pub marked_read: u64,
}

#[derive(Debug, Serialize)]
pub struct UnreadCount {
    pub count: i64,
}

#[derive(Debug, Serialize)]
pub struct Deleted {
    pub deleted: u64,
}

/// GET /api/v1/notifications?unread_only=&limit=&offset=
///
/// Newest first.
pub async fn list_notifications(
    auth: AuthUser,
    State(state): State<AppState>,
    Query(query): Query<InboxQuery>,
) -> AppResult<Json<DataResponse<Vec<Notification>>>> {
    let data = NotificationRepo::list_for_user(
        &state.pool,
        auth.user_id,
        query.unread_only,
        clamp_limit(query.limit, INBOX_PAGE, INBOX_PAGE_MAX),
        clamp_offset(query.offset),
    )
    .await?;
    Ok(Json(DataResponse { data }))
}

/// POST /api/v1/notifications/{id}/read
///
/// Someone else's notification answers 404.
pub async fn mark_read(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<StatusCode> {
    if NotificationRepo::mark_read(&state.pool, id, auth.user_id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::not_found("Notification", id))
    }
}

/// POST /api/v1/notifications/read-all
pub async fn mark_all_read(
    auth: AuthUser,
    State(state): State<AppState>,
) -> AppResult<Json<DataResponse<MarkedRead>>> {
    let marked_read = NotificationRepo::mark_all_read(&state.pool, auth.user_id).await?;
    Ok(Json(DataResponse {
        data: MarkedRead { marked_read },
    }))
}

/// GET /api/v1/notifications/unread-count
pub async fn unread_count(
    auth: AuthUser,
    State(state): State<AppState>,
) -> AppResult<Json<DataResponse<UnreadCount>>> {
    let count = NotificationRepo::unread_count(&state.pool, auth.user_id).await?;
    Ok(Json(DataResponse {
        data: UnreadCount { count },
    }))
}

/// DELETE /api/v1/notifications
///
/// Ids owned by other users are skipped.
pub async fn delete_notifications(
    auth: AuthUser,
    State(state): State<AppState>,
    Json(input): Json<DeleteNotifications>,
) -> AppResult<Json<DataResponse<Deleted>>> {
    if input.ids.is_empty() {
        return Err(AppError::BadRequest("No notification ids given".into()));
    }
    let deleted = NotificationRepo::delete_many(&state.pool, &input.ids, auth.user_id).await?;
    Ok(Json(DataResponse {
        data: Deleted { deleted },
    }))
}
