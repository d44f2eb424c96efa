//! Handlers for the `/models` resource: the model marketplace.
//!
//! Browsing is public. Uploading, liking, deleting and downloading need a
//! signed-in user.

use agora_core::automation::sanitize_file_name;
use agora_core::error::CoreError;
use agora_core::listing::{
    normalize_tags, validate_image_file, validate_model_form, ListingStatus, ModelDraft, PriceTier,
    MAX_TAGS, PREDEFINED_TAGS, PRICE_TIERS,
};
use agora_core::payments::variant_for_price;
use agora_core::roles::is_admin;
use agora_core::search::{clamp_limit, clamp_offset, like_pattern, DEFAULT_LIMIT, MAX_LIMIT};
use agora_core::storage::{calculate_storage_validation, validate_model_file, StorageWarning};
use agora_core::types::DbId;
use agora_db::models::model::{CreateModel, LikeState, Model, ModelSummary};
use agora_db::repositories::{ModelRepo, PurchaseRepo};
use axum::body::Body;
use axum::extract::{Multipart, Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::Response;
use axum::Json;
use chrono::Utc;
use serde::Serialize;

use super::form::{UploadForm, UploadedFile};
use super::user::{load_user, storage_usage};
use crate::error::{AppError, AppResult};
use crate::middleware::auth::AuthUser;
use crate::query::SearchParams;
use crate::response::DataResponse;
use crate::services::file_store::{IMAGES_BUCKET, MODELS_BUCKET};
use crate::services::validator::{ValidationOutcome, ValidationSubmission};
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct UploadOptions {
    pub price_tiers: &'static [PriceTier],
    pub tags: &'static [&'static str],
    pub max_tags: usize,
}

// ---------------------------------------------------------------------------
// Browsing
// ---------------------------------------------------------------------------

/// GET /api/v1/models/options
///
/// Choices offered by the upload wizard.
pub async fn upload_options() -> Json<DataResponse<UploadOptions>> {
    Json(DataResponse {
        data: UploadOptions {
            price_tiers: &PRICE_TIERS,
            tags: &PREDEFINED_TAGS,
            max_tags: MAX_TAGS,
        },
    })
}

/// GET /api/v1/models?q=&limit=&offset=
///
/// Approved listings, newest first. `q` matches name, description and tags.
pub async fn list_models(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> AppResult<Json<DataResponse<Vec<ModelSummary>>>> {
    let pattern = params
        .q
        .as_deref()
        .map(str::trim)
        .filter(|q| !q.is_empty())
        .map(like_pattern);
    let data = ModelRepo::list_approved(
        &state.pool,
        pattern.as_deref(),
        clamp_limit(params.limit, DEFAULT_LIMIT, MAX_LIMIT),
        clamp_offset(params.offset),
    )
    .await?;
    Ok(Json(DataResponse { data }))
}

/// GET /api/v1/models/{id}
///
/// Listings awaiting moderation are hidden from the public.
pub async fn get_model(
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<Json<DataResponse<Model>>> {
    let model = ModelRepo::find_by_id(&state.pool, id)
        .await?
        .filter(|m| m.status == ListingStatus::Approved.name())
        .ok_or_else(|| AppError::not_found("Model", id))?;
    Ok(Json(DataResponse { data: model }))
}

// ---------------------------------------------------------------------------
// Upload
// ---------------------------------------------------------------------------

/// POST /api/v1/models
///
/// Multipart form: `name`, `description`, `price` (cents), `tags`,
/// `features`, `use_cases`, `setup`, the archive in `model_file` and an
/// optional cover `image`. The listing starts out pending moderation.
pub async fn create_model(
    auth: AuthUser,
    State(state): State<AppState>,
    multipart: Multipart,
) -> AppResult<(StatusCode, Json<DataResponse<Model>>)> {
    let user = load_user(&state, auth.user_id).await?;
    let mut form = UploadForm::read(multipart).await?;

    let archive = form.take_file("model_file").or_else(|| form.take_file("file"));
    let image = form.take_file("image");

    let draft = ModelDraft {
        name: form.text("name").trim().to_string(),
        description: form.text("description").trim().to_string(),
        price: form.integer("price"),
        tags: normalize_tags(&form.list("tags")),
        features: form.list("features"),
        use_cases: form.list("use_cases"),
        setup: form.text("setup").trim().to_string(),
        has_file: archive.is_some(),
    };

    let mut errors = validate_model_form(&draft);
    if let Some(archive) = &archive {
        if let Err(msg) = validate_model_file(Some(archive.size()), &archive.content_type, user.plan()) {
            errors.insert("model_file", msg);
        }
    }
    if let Some(image) = &image {
        if let Err(msg) = validate_image_file(Some(&image.meta())) {
            errors.insert("image", msg);
        }
    }
    if !errors.is_empty() {
        return Err(AppError::fields(errors));
    }
    let (Some(archive), Some(price_cents)) = (archive, draft.price) else {
        return Err(AppError::BadRequest("Model file is required".into()));
    };

    let usage = storage_usage(&state, &user).await?;
    let quota = calculate_storage_validation(archive.size(), Some(&usage));
    if quota.warning == Some(StorageWarning::Exceeds) {
        let detail = quota
            .breakdown
            .map(|b| {
                format!(
                    " Using {:.2} MB of {} on the {} plan.",
                    b.current_usage_mb, b.storage_cap_str, b.plan_name
                )
            })
            .unwrap_or_default();
        return Err(AppError::PayloadTooLarge(format!(
            "This upload would exceed your storage limit.{detail}"
        )));
    }

    let validation_result = validate_archive(&state, &draft, &archive).await?;

    let millis = Utc::now().timestamp_millis();
    let file_name = sanitize_file_name(&archive.file_name);
    let file_path = format!("{}/{millis}_{file_name}", user.id);
    state.files.put(MODELS_BUCKET, &file_path, &archive.bytes).await?;

    let image_path = match &image {
        Some(image) => {
            let key = format!(
                "{}/{millis}_{}",
                user.id,
                sanitize_file_name(&image.file_name)
            );
            if let Err(e) = state.files.put(IMAGES_BUCKET, &key, &image.bytes).await {
                discard_upload(&state, &file_path, None).await;
                return Err(e.into());
            }
            Some(key)
        }
        None => None,
    };

    let created = ModelRepo::create(
        &state.pool,
        &CreateModel {
            author_id: user.id,
            name: draft.name,
            description: draft.description,
            price_cents,
            variant_id: variant_for_price(price_cents).to_string(),
            tags: draft.tags,
            features: draft.features,
            use_cases: draft.use_cases,
            setup: draft.setup,
            file_path: file_path.clone(),
            file_name,
            file_size_bytes: archive.size() as i64,
            image_path: image_path.clone(),
            validation_result,
        },
    )
    .await;
    let model = match created {
        Ok(model) => model,
        Err(e) => {
            discard_upload(&state, &file_path, image_path.as_deref()).await;
            return Err(e.into());
        }
    };

    tracing::info!(
        model_id = model.id,
        author_id = user.id,
        size_bytes = model.file_size_bytes,
        near_limit = quota.warning == Some(StorageWarning::NearLimit),
        "Model submitted for review"
    );
    Ok((StatusCode::CREATED, Json(DataResponse { data: model })))
}

// ---------------------------------------------------------------------------
// Owner and buyer actions
// ---------------------------------------------------------------------------

/// DELETE /api/v1/models/{id}
///
/// Authors only. The stored archive and image go with the listing.
pub async fn delete_model(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<StatusCode> {
    let model = ModelRepo::find_by_id(&state.pool, id)
        .await?
        .ok_or_else(|| AppError::not_found("Model", id))?;
    if model.author_id != auth.user_id {
        return Err(CoreError::Forbidden("You can only delete your own models".into()).into());
    }

    ModelRepo::delete(&state.pool, id).await?;
    remove_stored_files(&state, &model).await;
    tracing::info!(model_id = id, "Model deleted by author");
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/v1/models/{id}/like
///
/// Toggles the caller's like. Only published listings can be liked.
pub async fn toggle_like(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<Json<DataResponse<LikeState>>> {
    ModelRepo::find_by_id(&state.pool, id)
        .await?
        .filter(|m| m.status == ListingStatus::Approved.name())
        .ok_or_else(|| AppError::not_found("Model", id))?;
    let data = ModelRepo::toggle_like(&state.pool, id, auth.user_id).await?;
    Ok(Json(DataResponse { data }))
}

/// GET /api/v1/models/{id}/download
///
/// Streams the archive to its author, an admin, or someone who bought it.
pub async fn download_model(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<Response> {
    let model = ModelRepo::find_by_id(&state.pool, id)
        .await?
        .ok_or_else(|| AppError::not_found("Model", id))?;

    let allowed = model.author_id == auth.user_id
        || is_admin(&auth.role)
        || {
            let user = load_user(&state, auth.user_id).await?;
            PurchaseRepo::has_purchased(&state.pool, id, user.id, &user.email).await?
        };
    if !allowed {
        return Err(
            CoreError::Forbidden("Purchase this model to download it".into()).into(),
        );
    }

    let bytes = state.files.get(MODELS_BUCKET, &model.file_path).await?;
    ModelRepo::increment_downloads(&state.pool, id).await?;
    tracing::info!(model_id = id, user_id = auth.user_id, "Model downloaded");

    Response::builder()
        .header(header::CONTENT_TYPE, "application/zip")
        .header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", model.file_name.replace('"', "")),
        )
        .body(Body::from(bytes))
        .map_err(|e| AppError::InternalError(e.to_string()))
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Ask the validation service about the archive. Without a service the
/// listing goes straight to manual review.
async fn validate_archive(
    state: &AppState,
    draft: &ModelDraft,
    archive: &UploadedFile,
) -> AppResult<Option<serde_json::Value>> {
    let Some(validator) = state.integrations.validator.as_ref() else {
        return Ok(None);
    };
    let outcome = validator
        .validate(ValidationSubmission {
            file_name: &archive.file_name,
            bytes: archive.bytes.clone(),
            model_name: &draft.name,
            setup: &draft.setup,
            description: &draft.description,
        })
        .await?;
    match outcome {
        ValidationOutcome::Valid { report } => Ok(Some(report)),
        ValidationOutcome::Invalid { reason, .. } => Err(AppError::BadRequest(format!(
            "Model validation failed: {reason}"
        ))),
    }
}

/// Remove files stored for an upload whose listing was never created.
async fn discard_upload(state: &AppState, file_path: &str, image_path: Option<&str>) {
    if let Err(e) = state.files.delete(MODELS_BUCKET, file_path).await {
        tracing::warn!(file_path, error = %e, "Failed to discard uploaded model file");
    }
    if let Some(image) = image_path {
        if let Err(e) = state.files.delete(IMAGES_BUCKET, image).await {
            tracing::warn!(image_path = image, error = %e, "Failed to discard uploaded image");
        }
    }
}

/// Failures are logged and otherwise ignored.
pub(crate) async fn remove_stored_files(state: &AppState, model: &Model) {
    if let Err(e) = state.files.delete(MODELS_BUCKET, &model.file_path).await {
        tracing::warn!(model_id = model.id, error = %e, "Failed to delete model file");
    }
    if let Some(image) = &model.image_path {
        if let Err(e) = state.files.delete(IMAGES_BUCKET, image).await {
            tracing::warn!(model_id = model.id, error = %e, "Failed to delete model image");
        }
    }
}
