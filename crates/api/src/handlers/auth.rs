//! Handlers for the `/auth` resource: passcode sign-up and sign-in,
//! token refresh and logout.

use std::collections::BTreeMap;

use agora_core::account::{normalize_email, validate_email, validate_username};
use agora_core::error::CoreError;
use agora_core::otp::{
    can_resend, issue_code, verify_code, OtpPurpose, OtpRejection, RESEND_COOLDOWN_SECS,
};
use agora_core::roles::ROLE_USER;
use agora_core::types::DbId;
use agora_db::models::session::CreateSession;
use agora_db::models::user::{CreateUser, User};
use agora_db::repositories::{OtpRepo, SessionRepo, UserRepo};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::auth::jwt::{generate_access_token, generate_refresh_token, hash_refresh_token};
use crate::error::{AppError, AppResult};
use crate::middleware::auth::AuthUser;
use crate::state::AppState;

/// Where the client goes after a successful sign-in.
const POST_LOGIN_REDIRECT: &str = "/dashboard";

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct SignUpRequest {
    pub email: String,
    pub username: String,
}

#[derive(Debug, Deserialize)]
pub struct SignInRequest {
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct VerifyOtpRequest {
    pub email: String,
    /// The six-digit code from the email.
    pub token: String,
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Debug, Deserialize)]
pub struct UsernameQuery {
    pub username: String,
}

/// Returned when a code was emailed.
#[derive(Debug, Serialize)]
pub struct CodeSentResponse {
    pub message: String,
    pub email: String,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub access_token: String,
    pub refresh_token: String,
    /// Access token lifetime in seconds.
    pub expires_in: i64,
    pub user: UserInfo,
    pub redirect: &'static str,
}

#[derive(Debug, Serialize)]
pub struct UserInfo {
    pub id: DbId,
    pub username: String,
    pub email: String,
    pub role: String,
    pub plan: String,
}

#[derive(Debug, Serialize)]
pub struct UsernameAvailability {
    pub available: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// POST /api/v1/auth/signup
///
/// Register an unverified account and email a code. An unverified account
/// with the same email gets a fresh code instead.
pub async fn signup(
    State(state): State<AppState>,
    Json(input): Json<SignUpRequest>,
) -> AppResult<Json<CodeSentResponse>> {
    let username = input.username.trim();
    let email = normalize_email(&input.email);

    let mut fields = BTreeMap::new();
    if let Some(msg) = validate_email(&email).into_iter().next() {
        fields.insert("email".to_string(), msg);
    }
    if let Some(msg) = validate_username(username).into_iter().next() {
        fields.insert("username".to_string(), msg);
    }
    if !fields.is_empty() {
        return Err(AppError::FieldErrors(fields));
    }

    if let Some(existing) = UserRepo::find_by_email(&state.pool, &email).await? {
        if existing.email_verified {
            return Err(CoreError::Conflict(
                "An account with this email already exists. Please sign in.".into(),
            )
            .into());
        }
        send_code(&state, &email, OtpPurpose::SignUp).await?;
        return Ok(Json(code_sent(email)));
    }

    if UserRepo::find_by_username(&state.pool, username)
        .await?
        .is_some()
    {
        return Err(CoreError::Conflict("Username is already taken".into()).into());
    }

    let user = UserRepo::create(
        &state.pool,
        &CreateUser {
            email: email.clone(),
            username: username.to_string(),
            role: ROLE_USER.to_string(),
        },
    )
    .await?;
    tracing::info!(user_id = user.id, "Account created, awaiting verification");

    send_code(&state, &email, OtpPurpose::SignUp).await?;
    Ok(Json(code_sent(email)))
}

/// POST /api/v1/auth/signin
pub async fn signin(
    State(state): State<AppState>,
    Json(input): Json<SignInRequest>,
) -> AppResult<Json<CodeSentResponse>> {
    let email = normalize_email(&input.email);
    if let Some(msg) = validate_email(&email).into_iter().next() {
        return Err(AppError::FieldErrors(BTreeMap::from([(
            "email".to_string(),
            msg,
        )])));
    }

    if UserRepo::find_by_email(&state.pool, &email).await?.is_none() {
        return Err(AppError::NotFound(
            "No account found with this email. Please sign up.".into(),
        ));
    }

    send_code(&state, &email, OtpPurpose::SignIn).await?;
    Ok(Json(code_sent(email)))
}

/// POST /api/v1/auth/verify-otp
///
/// Exchange an emailed code for tokens. Wrong guesses count against the
/// code; it stops working after the attempt limit.
pub async fn verify_otp(
    State(state): State<AppState>,
    Json(input): Json<VerifyOtpRequest>,
) -> AppResult<Json<AuthResponse>> {
    let email = normalize_email(&input.email);

    let code = OtpRepo::find_outstanding(&state.pool, &email)
        .await?
        .ok_or_else(|| {
            AppError::BadRequest("No verification code found. Please request a new one.".into())
        })?;

    if let Err(rejection) = verify_code(&email, &input.token, &code.stored(), Utc::now()) {
        if rejection == OtpRejection::Mismatch {
            OtpRepo::record_failed_attempt(&state.pool, code.id).await?;
        }
        tracing::debug!(?rejection, "Verification code rejected");
        return Err(AppError::BadRequest(rejection.message().into()));
    }

    if !OtpRepo::consume(&state.pool, code.id).await? {
        return Err(AppError::BadRequest(
            OtpRejection::Expired.message().into(),
        ));
    }

    let user = UserRepo::find_by_email(&state.pool, &email)
        .await?
        .ok_or_else(|| AppError::NotFound("No account found with this email".into()))?;
    UserRepo::record_verified_login(&state.pool, user.id).await?;
    tracing::info!(user_id = user.id, purpose = %code.purpose, "Passcode verified");

    Ok(Json(create_auth_response(&state, &user).await?))
}

/// POST /api/v1/auth/refresh
///
/// Exchange a valid refresh token for new access + refresh tokens.
pub async fn refresh(
    State(state): State<AppState>,
    Json(input): Json<RefreshRequest>,
) -> AppResult<Json<AuthResponse>> {
    let token_hash = hash_refresh_token(&input.refresh_token);

    let session = SessionRepo::find_by_refresh_token_hash(&state.pool, &token_hash)
        .await?
        .ok_or_else(|| {
            AppError::Core(CoreError::Unauthorized(
                "Invalid or expired refresh token".into(),
            ))
        })?;

    // Rotation: the presented token is single-use. A concurrent refresh
    // that revoked it first wins.
    if !SessionRepo::revoke(&state.pool, session.id).await? {
        return Err(AppError::Core(CoreError::Unauthorized(
            "Invalid or expired refresh token".into(),
        )));
    }

    let user = UserRepo::find_by_id(&state.pool, session.user_id)
        .await?
        .ok_or_else(|| AppError::Core(CoreError::Unauthorized("User no longer exists".into())))?;

    Ok(Json(create_auth_response(&state, &user).await?))
}

/// POST /api/v1/auth/logout
///
/// Revoke all sessions for the authenticated user. Returns 204 No Content.
pub async fn logout(State(state): State<AppState>, auth_user: AuthUser) -> AppResult<StatusCode> {
    SessionRepo::revoke_all_for_user(&state.pool, auth_user.user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/v1/auth/check-username?username=
pub async fn check_username(
    State(state): State<AppState>,
    Query(query): Query<UsernameQuery>,
) -> AppResult<Json<UsernameAvailability>> {
    let username = query.username.trim();
    let errors = validate_username(username);
    if !errors.is_empty() {
        return Ok(Json(UsernameAvailability {
            available: false,
            errors,
        }));
    }
    let taken = UserRepo::find_by_username(&state.pool, username)
        .await?
        .is_some();
    Ok(Json(UsernameAvailability {
        available: !taken,
        errors: Vec::new(),
    }))
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn code_sent(email: String) -> CodeSentResponse {
    CodeSentResponse {
        message: "Verification code sent".to_string(),
        email,
    }
}

/// Issue, store and email a code, honoring the resend cooldown.
async fn send_code(state: &AppState, email: &str, purpose: OtpPurpose) -> AppResult<()> {
    let now = Utc::now();
    let last = OtpRepo::last_issued_at(&state.pool, email, purpose).await?;
    if !can_resend(last, now) {
        let waited = last.map(|at| (now - at).num_seconds()).unwrap_or_default();
        let retry_after_secs = (RESEND_COOLDOWN_SECS - waited).max(1) as u64;
        return Err(AppError::RateLimited {
            message: format!("Please wait {retry_after_secs} seconds before requesting another code."),
            retry_after_secs: Some(retry_after_secs),
        });
    }

    let issued = issue_code(email, now);
    OtpRepo::issue(&state.pool, email, purpose, &issued.code_hash, issued.expires_at).await?;

    state
        .mailer
        .send_code(email, &issued.code)
        .await
        .map_err(|e| AppError::InternalError(format!("Failed to send verification email: {e}")))?;

    tracing::info!(purpose = purpose.name(), "Verification code sent");
    Ok(())
}

/// Generate access + refresh tokens, persist a session row, and build the response.
async fn create_auth_response(state: &AppState, user: &User) -> AppResult<AuthResponse> {
    let access_token = generate_access_token(user.id, &user.role, &state.config.jwt)
        .map_err(|e| AppError::InternalError(format!("Token generation error: {e}")))?;

    let (refresh_plaintext, refresh_hash) = generate_refresh_token();

    let expires_at =
        Utc::now() + chrono::Duration::days(state.config.jwt.refresh_token_expiry_days);

    SessionRepo::create(
        &state.pool,
        &CreateSession {
            user_id: user.id,
            refresh_token_hash: refresh_hash,
            expires_at,
            user_agent: None,
            ip_address: None,
        },
    )
    .await?;

    Ok(AuthResponse {
        access_token,
        refresh_token: refresh_plaintext,
        expires_in: state.config.jwt.access_token_ttl_secs(),
        user: UserInfo {
            id: user.id,
            username: user.username.clone(),
            email: user.email.clone(),
            role: user.role.clone(),
            plan: user.plan.clone(),
        },
        redirect: POST_LOGIN_REDIRECT,
    })
}
