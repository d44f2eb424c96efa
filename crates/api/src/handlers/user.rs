//! Handlers for the `/user` resource: the signed-in account's profile,
//! storage, earnings, listings and connected accounts.

use agora_core::payouts::Balance;
use agora_core::plans::{parse_size_mb, PlanFeatures};
use agora_core::storage::{
    calculate_storage_validation, total_storage_used_mb, RecordedSize, StorageUsage,
    StorageValidation,
};
use agora_core::types::{DbId, Timestamp};
use agora_db::models::automation::{Automation, ConnectAccount, UserAutomation};
use agora_db::models::earning::Earning;
use agora_db::models::model::ModelSummary;
use agora_db::models::purchase::Purchase;
use agora_db::models::user::User;
use agora_db::repositories::{
    AutomationRepo, EarningRepo, ModelRepo, PurchaseRepo, UserAutomationRepo, UserRepo,
    WithdrawalRepo,
};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};
use crate::middleware::auth::AuthUser;
use crate::response::DataResponse;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct ProfileResponse {
    pub user: User,
    pub features: PlanFeatures,
}

#[derive(Debug, Serialize)]
pub struct StorageResponse {
    #[serde(flatten)]
    pub usage: StorageUsage,
    pub storage_cap: &'static str,
    pub storage_cap_mb: f64,
}

#[derive(Debug, Deserialize)]
pub struct StorageCheckRequest {
    /// Size of the file about to be uploaded, in bytes.
    pub file_size: u64,
}

#[derive(Debug, Serialize)]
pub struct EarningsResponse {
    pub balance: Balance,
    pub earnings: Vec<Earning>,
}

/// Tokens from a completed OAuth consent.
#[derive(Debug, Deserialize)]
pub struct ConnectRequest {
    pub provider: String,
    pub automation_id: DbId,
    pub access_token: String,
    pub refresh_token: Option<String>,
    /// Lifetime of the access token in seconds.
    pub expires_in: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct ConnectionQuery {
    pub automation_id: Option<DbId>,
}

/// A stored connection. Tokens never leave the server.
#[derive(Debug, Serialize)]
pub struct ConnectionStatus {
    pub provider: String,
    pub automation_id: DbId,
    pub token_expiry: Option<Timestamp>,
    pub expired: bool,
    pub has_refresh_token: bool,
}

impl From<UserAutomation> for ConnectionStatus {
    fn from(install: UserAutomation) -> Self {
        Self {
            provider: install.provider.unwrap_or_default(),
            automation_id: install.automation_id,
            expired: install.token_expiry.is_some_and(|t| t <= Utc::now()),
            token_expiry: install.token_expiry,
            has_refresh_token: install.refresh_token.is_some(),
        }
    }
}

/// Accounts the runner knows how to use.
const PROVIDERS: [&str; 2] = ["google", "tiktok"];

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// GET /api/v1/user/profile
pub async fn profile(
    auth: AuthUser,
    State(state): State<AppState>,
) -> AppResult<Json<DataResponse<ProfileResponse>>> {
    let user = load_user(&state, auth.user_id).await?;
    let features = user.plan().features();
    Ok(Json(DataResponse {
        data: ProfileResponse { user, features },
    }))
}

/// GET /api/v1/user/storage
pub async fn storage(
    auth: AuthUser,
    State(state): State<AppState>,
) -> AppResult<Json<DataResponse<StorageResponse>>> {
    let user = load_user(&state, auth.user_id).await?;
    let usage = storage_usage(&state, &user).await?;
    let storage_cap = usage.plan.features().active_storage;
    Ok(Json(DataResponse {
        data: StorageResponse {
            storage_cap,
            storage_cap_mb: parse_size_mb(storage_cap),
            usage,
        },
    }))
}

/// POST /api/v1/user/storage/check
///
/// Dry run of the quota check an upload of `file_size` bytes would face.
pub async fn check_storage(
    auth: AuthUser,
    State(state): State<AppState>,
    Json(input): Json<StorageCheckRequest>,
) -> AppResult<Json<DataResponse<StorageValidation>>> {
    let user = load_user(&state, auth.user_id).await?;
    let usage = storage_usage(&state, &user).await?;
    Ok(Json(DataResponse {
        data: calculate_storage_validation(input.file_size, Some(&usage)),
    }))
}

/// GET /api/v1/user/earnings
pub async fn earnings(
    auth: AuthUser,
    State(state): State<AppState>,
) -> AppResult<Json<DataResponse<EarningsResponse>>> {
    let user = load_user(&state, auth.user_id).await?;
    let balance = balance_for(&state, &user).await?;
    let earnings = EarningRepo::list_for_seller(&state.pool, user.id).await?;
    Ok(Json(DataResponse {
        data: EarningsResponse { balance, earnings },
    }))
}

/// GET /api/v1/user/purchases
///
/// Includes purchases made before sign-up with the same email.
pub async fn purchases(
    auth: AuthUser,
    State(state): State<AppState>,
) -> AppResult<Json<DataResponse<Vec<Purchase>>>> {
    let user = load_user(&state, auth.user_id).await?;
    let data = PurchaseRepo::list_for_buyer(&state.pool, user.id, &user.email).await?;
    Ok(Json(DataResponse { data }))
}

/// GET /api/v1/user/models
///
/// The caller's own listings in every moderation state.
pub async fn models(
    auth: AuthUser,
    State(state): State<AppState>,
) -> AppResult<Json<DataResponse<Vec<ModelSummary>>>> {
    let data = ModelRepo::list_by_author(&state.pool, auth.user_id).await?;
    Ok(Json(DataResponse { data }))
}

/// GET /api/v1/user/automations
///
/// Automations the caller published, including deactivated ones.
pub async fn automations(
    auth: AuthUser,
    State(state): State<AppState>,
) -> AppResult<Json<DataResponse<Vec<Automation>>>> {
    let data = AutomationRepo::list_by_developer(&state.pool, auth.user_id).await?;
    Ok(Json(DataResponse { data }))
}

/// POST /api/v1/user/connections
///
/// Store the tokens of a connected account for one of the caller's
/// installs. Tokens are encrypted before they reach the database; a missing
/// refresh token keeps the one already stored.
pub async fn connect_account(
    auth: AuthUser,
    State(state): State<AppState>,
    Json(input): Json<ConnectRequest>,
) -> AppResult<(StatusCode, Json<DataResponse<ConnectionStatus>>)> {
    let provider = input.provider.trim().to_lowercase();
    if !PROVIDERS.contains(&provider.as_str()) {
        return Err(AppError::BadRequest(format!(
            "Unsupported provider: {}",
            input.provider
        )));
    }
    if input.access_token.trim().is_empty() {
        return Err(AppError::BadRequest("access_token is required".into()));
    }
    AutomationRepo::find_by_id(&state.pool, input.automation_id)
        .await?
        .ok_or_else(|| AppError::not_found("Automation", input.automation_id))?;

    let encryptor = state.encryptor()?;
    let account = ConnectAccount {
        provider,
        access_token: encryptor.encrypt(&input.access_token)?,
        refresh_token: input
            .refresh_token
            .as_deref()
            .filter(|t| !t.trim().is_empty())
            .map(|t| encryptor.encrypt(t))
            .transpose()?,
        token_expiry: input
            .expires_in
            .filter(|secs| *secs > 0)
            .map(|secs| Utc::now() + Duration::seconds(secs)),
    };
    let install =
        UserAutomationRepo::upsert_tokens(&state.pool, auth.user_id, input.automation_id, &account)
            .await?;

    tracing::info!(
        user_id = auth.user_id,
        automation_id = input.automation_id,
        provider = %account.provider,
        "Account connected"
    );
    Ok((
        StatusCode::CREATED,
        Json(DataResponse {
            data: install.into(),
        }),
    ))
}

/// GET /api/v1/user/connections/{provider}?automation_id=
///
/// Without `automation_id`, the most recent connection from any install.
pub async fn connection(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(provider): Path<String>,
    Query(query): Query<ConnectionQuery>,
) -> AppResult<Json<DataResponse<ConnectionStatus>>> {
    let provider = provider.to_lowercase();
    let install = match query.automation_id {
        Some(automation_id) => UserAutomationRepo::find(&state.pool, auth.user_id, automation_id)
            .await?
            .filter(|i| i.provider.as_deref() == Some(provider.as_str()))
            .filter(|i| i.access_token.is_some()),
        None => UserAutomationRepo::find_provider_token(&state.pool, auth.user_id, &provider).await?,
    };
    let install =
        install.ok_or_else(|| AppError::NotFound(format!("No {provider} connection found")))?;
    Ok(Json(DataResponse {
        data: install.into(),
    }))
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

pub(crate) async fn load_user(state: &AppState, user_id: DbId) -> AppResult<User> {
    UserRepo::find_by_id(&state.pool, user_id)
        .await?
        .ok_or_else(|| AppError::not_found("User", user_id))
}

/// Active storage of `user`, with legacy file sizes normalized.
pub(crate) async fn storage_usage(state: &AppState, user: &User) -> AppResult<StorageUsage> {
    let sizes = UserRepo::stored_file_sizes(&state.pool, user.id).await?;
    Ok(StorageUsage {
        plan: user.plan(),
        total_storage_used_mb: total_storage_used_mb(sizes.into_iter().map(|s| RecordedSize {
            value: s.file_size_bytes,
            legacy: s.size_is_legacy,
        })),
    })
}

/// Earnings, payouts and what is left to withdraw.
pub(crate) async fn balance_for(state: &AppState, user: &User) -> AppResult<Balance> {
    let totals = EarningRepo::totals(&state.pool, user.id).await?;
    let pending = WithdrawalRepo::pending_total(&state.pool, user.id).await?;
    Ok(Balance::compute(
        totals.total,
        totals.released,
        user.withdrawn_cents,
        pending,
    ))
}
