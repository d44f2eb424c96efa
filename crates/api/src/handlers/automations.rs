//! Handlers for the `/automations` resource: n8n workflow listings, user
//! installs and runs.

use std::collections::BTreeMap;

use agora_core::automation::{
    find_storage_bucket, normalize_run_config, parse_system_config, sanitize_file_name,
    upload_object_key, FALLBACK_AUTOMATION_NAME, MAX_AUTOMATION_UPLOAD_BYTES,
};
use agora_core::chat::events::Config;
use agora_core::error::CoreError;
use agora_core::hashing::verify_hmac_sha256_hex;
use agora_core::listing::{validate_automation_form, validate_image_file, AutomationDraft};
use agora_core::search::{clamp_limit, clamp_offset, like_pattern, DEFAULT_LIMIT, MAX_LIMIT};
use agora_core::types::DbId;
use agora_core::workflow::{analyze_workflow, n8n_import_payload};
use agora_db::models::automation::{Automation, CreateAutomation, DailyRunStats};
use agora_db::repositories::{AutomationRepo, UserAutomationRepo, UserRepo};
use agora_events::bus::AUTOMATION_COMPLETED;
use agora_events::PlatformEvent;
use axum::body::Bytes;
use axum::extract::{Multipart, Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::form::UploadForm;
use crate::error::{AppError, AppResult};
use crate::middleware::auth::AuthUser;
use crate::query::SearchParams;
use crate::response::DataResponse;
use crate::services::execution::{run_and_record, RunOutcome};
use crate::services::file_store::IMAGES_BUCKET;
use crate::state::AppState;

const DEFAULT_STATS_DAYS: i32 = 7;
const MAX_STATS_DAYS: i32 = 90;
const SIGNATURE_HEADER: &str = "x-signature";

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct ToggleRequest {
    pub enabled: bool,
}

#[derive(Debug, Serialize)]
pub struct ToggleResponse {
    pub automation_id: DbId,
    pub enabled: bool,
}

#[derive(Debug, Deserialize)]
pub struct ExecuteRequest {
    pub automation_id: Option<DbId>,
    pub config: Option<Config>,
}

#[derive(Debug, Serialize)]
pub struct ExecuteResponse {
    pub success: bool,
    pub message: &'static str,
    pub result: Value,
}

#[derive(Debug, Deserialize)]
pub struct ActivateRequest {
    pub automation_id: Option<DbId>,
    #[serde(default)]
    pub parameters: Config,
}

#[derive(Debug, Deserialize)]
pub struct BackgroundRequest {
    #[serde(default)]
    pub config: Config,
}

#[derive(Debug, Serialize)]
pub struct ActivateResponse {
    pub success: bool,
    pub message: &'static str,
    pub automation_name: String,
}

/// Callback the runner sends when a background or scheduled run ends.
#[derive(Debug, Deserialize)]
pub struct CompletionReport {
    pub automation_id: Option<DbId>,
    pub user_id: Option<DbId>,
    pub status: Option<String>,
    #[serde(default)]
    pub result: Value,
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct UploadedObject {
    pub bucket: String,
    pub path: String,
    pub file_name: String,
    pub mime_type: String,
    pub size: u64,
}

#[derive(Debug, Deserialize)]
pub struct StatsQuery {
    pub days: Option<i32>,
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub daily_runs: Vec<DailyRunStats>,
    pub total_runs: i64,
    pub total_earnings_cents: i64,
    /// Percentage of successful runs, rounded.
    pub success_rate: i64,
}

#[derive(Debug, Serialize)]
pub struct N8nImportResponse {
    pub workflow_id: String,
}

// ---------------------------------------------------------------------------
// Browsing
// ---------------------------------------------------------------------------

/// GET /api/v1/automations
pub async fn list_automations(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> AppResult<Json<DataResponse<Vec<Automation>>>> {
    let data = AutomationRepo::search(
        &state.pool,
        None,
        clamp_limit(params.limit, DEFAULT_LIMIT, MAX_LIMIT),
        clamp_offset(params.offset),
    )
    .await?;
    Ok(Json(DataResponse { data }))
}

/// GET /api/v1/automations/search?q=
///
/// Blank queries list everything active.
pub async fn search_automations(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> AppResult<Json<DataResponse<Vec<Automation>>>> {
    let pattern = params
        .q
        .as_deref()
        .map(str::trim)
        .filter(|q| !q.is_empty())
        .map(like_pattern);
    let data = AutomationRepo::search(
        &state.pool,
        pattern.as_deref(),
        clamp_limit(params.limit, DEFAULT_LIMIT, MAX_LIMIT),
        clamp_offset(params.offset),
    )
    .await?;
    Ok(Json(DataResponse { data }))
}

/// GET /api/v1/automations/{id}
pub async fn get_automation(
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<Json<DataResponse<Automation>>> {
    let data = find_active(&state, id).await?;
    Ok(Json(DataResponse { data }))
}

// ---------------------------------------------------------------------------
// Publishing
// ---------------------------------------------------------------------------

/// POST /api/v1/automations
///
/// Multipart form: `name`, `description`, `price` (cents), the n8n export in
/// `json`, optional `image`, optional `developer_keys` (a JSON object of key
/// name to secret) and optional `system_config` (a JSON array).
pub async fn create_automation(
    auth: AuthUser,
    State(state): State<AppState>,
    multipart: Multipart,
) -> AppResult<(StatusCode, Json<DataResponse<Automation>>)> {
    let mut form = UploadForm::read(multipart).await?;
    let export = form.take_file("json");
    let image = form.take_file("image");

    let draft = AutomationDraft {
        name: form.text("name").trim().to_string(),
        description: form.text("description").trim().to_string(),
        price: form.integer("price"),
        json_file: export.as_ref().map(|f| f.meta()),
    };
    let mut errors = validate_automation_form(&draft);
    if let Some(image) = &image {
        if let Err(msg) = validate_image_file(Some(&image.meta())) {
            errors.insert("image", msg);
        }
    }
    if !errors.is_empty() {
        return Err(AppError::fields(errors));
    }
    let (Some(export), Some(price_cents)) = (export, draft.price) else {
        return Err(AppError::BadRequest("Automation JSON file is required".into()));
    };

    let analysis = analyze_workflow(&export.bytes)?;

    let supplied = parse_json_field::<BTreeMap<String, String>>(&form, "developer_keys")?;
    let developer_keys = seal_developer_keys(&state, &analysis.developer_keys, supplied)?;
    let system_config = parse_json_field::<Value>(&form, "system_config")?
        .filter(Value::is_array)
        .unwrap_or_else(|| Value::Array(Vec::new()));

    let image_path = match &image {
        Some(image) => {
            let key = format!(
                "{}/{}_{}",
                auth.user_id,
                Utc::now().timestamp_millis(),
                sanitize_file_name(&image.file_name)
            );
            state.files.put(IMAGES_BUCKET, &key, &image.bytes).await?;
            Some(key)
        }
        None => None,
    };

    let automation = AutomationRepo::create(
        &state.pool,
        &CreateAutomation {
            developer_id: auth.user_id,
            name: draft.name,
            description: draft.description,
            price_cents,
            google_scopes: serde_json::to_value(&analysis.google)
                .map_err(|e| AppError::InternalError(e.to_string()))?,
            workflow: analysis.workflow,
            user_inputs: analysis.user_inputs,
            required_inputs: analysis.required_inputs,
            required_connectors: analysis.required_connectors,
            developer_keys,
            system_config,
            image_path,
        },
    )
    .await?;

    tracing::info!(
        automation_id = automation.id,
        developer_id = auth.user_id,
        inputs = automation.required_inputs.len(),
        "Automation published"
    );
    Ok((StatusCode::CREATED, Json(DataResponse { data: automation })))
}

/// POST /api/v1/automations/{id}/n8n/import
///
/// Owner only. Creates the stored workflow in n8n, inactive, and remembers
/// the id n8n assigned.
pub async fn import_to_n8n(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<Json<DataResponse<N8nImportResponse>>> {
    let automation = AutomationRepo::find_by_id(&state.pool, id)
        .await?
        .ok_or_else(|| AppError::not_found("Automation", id))?;
    if automation.developer_id != auth.user_id {
        return Err(CoreError::Forbidden("Only the developer can import this workflow".into()).into());
    }

    let payload = n8n_import_payload(&automation.workflow, &automation.name)?;
    let workflow_id = state.n8n()?.create_workflow(&payload).await?;
    AutomationRepo::set_n8n_workflow_id(&state.pool, id, &workflow_id).await?;

    tracing::info!(automation_id = id, %workflow_id, "Workflow imported into n8n");
    Ok(Json(DataResponse {
        data: N8nImportResponse { workflow_id },
    }))
}

// ---------------------------------------------------------------------------
// Installs and runs
// ---------------------------------------------------------------------------

/// POST /api/v1/automations/{id}/toggle
///
/// Enable or pause the caller's install of an automation.
pub async fn toggle_automation(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
    Json(input): Json<ToggleRequest>,
) -> AppResult<Json<DataResponse<ToggleResponse>>> {
    if !UserAutomationRepo::set_enabled(&state.pool, auth.user_id, id, input.enabled).await? {
        return Err(AppError::NotFound("Automation instance not found".into()));
    }
    Ok(Json(DataResponse {
        data: ToggleResponse {
            automation_id: id,
            enabled: input.enabled,
        },
    }))
}

/// POST /api/v1/automations/execute
pub async fn execute_automation(
    auth: AuthUser,
    State(state): State<AppState>,
    Json(input): Json<ExecuteRequest>,
) -> AppResult<Json<ExecuteResponse>> {
    let (Some(automation_id), Some(config)) = (input.automation_id, input.config) else {
        return Err(AppError::BadRequest(
            "automation_id and config are required".into(),
        ));
    };
    let automation = find_active(&state, automation_id).await?;
    let runner = state.runner()?;

    match run_and_record(&state.pool, runner.as_ref(), &automation, auth.user_id, &config).await? {
        RunOutcome::Succeeded(result) => Ok(Json(ExecuteResponse {
            success: true,
            message: "Automation executed successfully",
            result,
        })),
        RunOutcome::Failed(error) => Err(AppError::Upstream(format!(
            "Automation runner failed: {error}"
        ))),
    }
}

/// POST /api/v1/automations/activate
///
/// Install an automation for the caller, or update the parameters of an
/// existing install, and switch it on.
pub async fn activate_automation(
    auth: AuthUser,
    State(state): State<AppState>,
    Json(input): Json<ActivateRequest>,
) -> AppResult<Json<ActivateResponse>> {
    let automation_id = input
        .automation_id
        .ok_or_else(|| AppError::BadRequest("automation_id is required".into()))?;
    let automation = AutomationRepo::find_by_id(&state.pool, automation_id)
        .await?
        .filter(|a| a.is_active)
        .ok_or_else(|| AppError::NotFound("Automation template not found".into()))?;

    UserAutomationRepo::activate(
        &state.pool,
        auth.user_id,
        automation.id,
        &Value::Object(input.parameters),
        false,
    )
    .await?;

    tracing::info!(user_id = auth.user_id, automation_id, "Automation activated");
    Ok(Json(ActivateResponse {
        success: true,
        message: "Automation activated successfully!",
        automation_name: automation.name,
    }))
}

/// POST /api/v1/automations/{id}/activate-background
///
/// Keep the automation running on the runner with `config`. Only
/// automations flagged for background execution accept this.
pub async fn activate_background(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
    Json(input): Json<BackgroundRequest>,
) -> AppResult<Json<ActivateResponse>> {
    let automation = find_active(&state, id).await?;
    if !automation.requires_background {
        return Err(AppError::BadRequest(
            "This automation does not require background execution".into(),
        ));
    }

    let config = normalize_run_config(&input.config);
    UserAutomationRepo::activate(&state.pool, auth.user_id, id, &Value::Object(config), true)
        .await?;

    tracing::info!(user_id = auth.user_id, automation_id = id, "Background execution activated");
    Ok(Json(ActivateResponse {
        success: true,
        message: "Background execution activated successfully",
        automation_name: automation.name,
    }))
}

/// POST /api/v1/webhooks/automation-complete
///
/// Signed by the runner with `AUTOMATION_WEBHOOK_SECRET` in `X-Signature`.
/// Publishes the outcome so the user gets a notification.
pub async fn completion_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> AppResult<Json<Value>> {
    let secret = state
        .config
        .integrations
        .runner_webhook_secret
        .as_deref()
        .ok_or_else(|| CoreError::Unavailable("Automation webhooks are not configured".into()))?;
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if !verify_hmac_sha256_hex(secret.as_bytes(), &body, signature) {
        tracing::warn!("Automation webhook signature mismatch");
        return Err(CoreError::Unauthorized("Invalid webhook signature".into()).into());
    }

    let report: CompletionReport = serde_json::from_slice(&body)
        .map_err(|e| AppError::BadRequest(format!("Invalid webhook payload: {e}")))?;
    let (Some(automation_id), Some(user_id), Some(status)) = (
        report.automation_id,
        report.user_id,
        report.status.filter(|s| !s.trim().is_empty()),
    ) else {
        return Err(AppError::BadRequest(
            "Missing required fields: automation_id, user_id, status".into(),
        ));
    };

    if UserRepo::find_by_id(&state.pool, user_id).await?.is_none() {
        return Err(AppError::NotFound("User not found".into()));
    }
    let name = AutomationRepo::find_by_id(&state.pool, automation_id)
        .await?
        .map(|a| a.name)
        .unwrap_or_else(|| FALLBACK_AUTOMATION_NAME.to_string());

    state.event_bus.publish(
        PlatformEvent::new(AUTOMATION_COMPLETED)
            .with_source("automation", automation_id)
            .with_actor(user_id)
            .with_payload(json!({
                "name": name,
                "status": status,
                "result": report.result,
                "error": report.error,
            })),
    );
    tracing::info!(automation_id, user_id, %status, "Automation run reported");

    Ok(Json(json!({ "received": true })))
}

/// POST /api/v1/automations/{id}/files
///
/// Multipart `file` stored in the automation's storage folder for the
/// caller, where the runner picks it up.
pub async fn upload_file(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
    multipart: Multipart,
) -> AppResult<(StatusCode, Json<DataResponse<UploadedObject>>)> {
    let mut form = UploadForm::read(multipart).await?;
    let file = form
        .take_file("file")
        .ok_or_else(|| AppError::BadRequest("No file provided".into()))?;

    let automation = find_active(&state, id).await?;
    let target = find_storage_bucket(&parse_system_config(&automation.system_config))
        .ok_or_else(|| {
            AppError::BadRequest("This automation does not have storage configured".into())
        })?;

    if file.size() > MAX_AUTOMATION_UPLOAD_BYTES {
        return Err(AppError::PayloadTooLarge(
            "Your file is too large to upload. Please use a smaller file.".into(),
        ));
    }

    let path = upload_object_key(
        auth.user_id,
        id,
        Utc::now().timestamp_millis(),
        &file.file_name,
    );
    state.files.put(&target.bucket, &path, &file.bytes).await?;
    tracing::info!(automation_id = id, user_id = auth.user_id, %path, "Automation file uploaded");

    Ok((
        StatusCode::CREATED,
        Json(DataResponse {
            data: UploadedObject {
                bucket: target.bucket,
                file_name: sanitize_file_name(&file.file_name),
                mime_type: target.mime_type,
                size: file.size(),
                path,
            },
        }),
    ))
}

/// GET /api/v1/automations/stats?days=
///
/// Daily run counts across the caller's published automations.
pub async fn stats(
    auth: AuthUser,
    State(state): State<AppState>,
    Query(query): Query<StatsQuery>,
) -> AppResult<Json<DataResponse<StatsResponse>>> {
    let days = query
        .days
        .unwrap_or(DEFAULT_STATS_DAYS)
        .clamp(1, MAX_STATS_DAYS);
    let daily_runs = AutomationRepo::daily_stats(&state.pool, auth.user_id, days).await?;

    let total_runs: i64 = daily_runs.iter().map(|d| d.runs).sum();
    let successes: i64 = daily_runs.iter().map(|d| d.success).sum();
    let total_earnings_cents = daily_runs.iter().map(|d| d.earnings_cents).sum();
    let success_rate = if total_runs == 0 {
        0
    } else {
        ((successes as f64 / total_runs as f64) * 100.0).round() as i64
    };

    Ok(Json(DataResponse {
        data: StatsResponse {
            daily_runs,
            total_runs,
            total_earnings_cents,
            success_rate,
        },
    }))
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

async fn find_active(state: &AppState, id: DbId) -> AppResult<Automation> {
    AutomationRepo::find_by_id(&state.pool, id)
        .await?
        .filter(|a| a.is_active)
        .ok_or_else(|| AppError::not_found("Automation", id))
}

fn parse_json_field<T: serde::de::DeserializeOwned>(
    form: &UploadForm,
    name: &str,
) -> AppResult<Option<T>> {
    let raw = form.text(name);
    if raw.trim().is_empty() {
        return Ok(None);
    }
    serde_json::from_str(&raw)
        .map(Some)
        .map_err(|_| AppError::BadRequest(format!("{name} must be valid JSON")))
}

/// One entry per detected key, encrypted. Keys the developer left blank are
/// stored empty.
fn seal_developer_keys(
    state: &AppState,
    detected: &[String],
    supplied: Option<BTreeMap<String, String>>,
) -> AppResult<Value> {
    let supplied = supplied.unwrap_or_default();
    let values: BTreeMap<String, String> = detected
        .iter()
        .map(|key| {
            let value = supplied.get(key).map(|v| v.trim().to_string()).unwrap_or_default();
            (key.clone(), value)
        })
        .collect();

    let sealed = if values.values().all(String::is_empty) {
        values
    } else {
        state.encryptor()?.encrypt_map(&values)?
    };
    serde_json::to_value(sealed).map_err(|e| AppError::InternalError(e.to_string()))
}
