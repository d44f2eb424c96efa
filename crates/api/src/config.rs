use agora_events::EmailConfig;

use crate::auth::jwt::JwtConfig;

/// Server configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Parsed from comma-separated `CORS_ORIGINS`.
    pub cors_origins: Vec<String>,
    pub request_timeout_secs: u64,
    pub shutdown_timeout_secs: u64,
    /// Largest request body accepted by multipart upload routes.
    pub max_upload_bytes: usize,
    /// Root directory of the local file store.
    pub storage_root: String,
    pub jwt: JwtConfig,
    pub integrations: IntegrationsConfig,
    /// `None` when `SMTP_HOST` is unset; codes are then only logged.
    pub email: Option<EmailConfig>,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                | Default                    |
    /// |------------------------|----------------------------|
    /// | `HOST`                 | `0.0.0.0`                  |
    /// | `PORT`                 | `3000`                     |
    /// | `CORS_ORIGINS`         | `http://localhost:5173`    |
    /// | `REQUEST_TIMEOUT_SECS` | `30`                       |
    /// | `SHUTDOWN_TIMEOUT_SECS`| `30`                       |
    /// | `MAX_UPLOAD_BYTES`     | `157286400` (150 MB)       |
    /// | `STORAGE_ROOT`         | `./storage`                |
    pub fn from_env() -> Self {
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into());

        let port: u16 = std::env::var("PORT")
            .unwrap_or_else(|_| "3000".into())
            .parse()
            .expect("PORT must be a valid u16");

        let cors_origins: Vec<String> = std::env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:5173".into())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let request_timeout_secs: u64 = std::env::var("REQUEST_TIMEOUT_SECS")
            .unwrap_or_else(|_| "30".into())
            .parse()
            .expect("REQUEST_TIMEOUT_SECS must be a valid u64");

        let shutdown_timeout_secs: u64 = std::env::var("SHUTDOWN_TIMEOUT_SECS")
            .unwrap_or_else(|_| "30".into())
            .parse()
            .expect("SHUTDOWN_TIMEOUT_SECS must be a valid u64");

        let max_upload_bytes: usize = std::env::var("MAX_UPLOAD_BYTES")
            .unwrap_or_else(|_| DEFAULT_MAX_UPLOAD_BYTES.to_string())
            .parse()
            .expect("MAX_UPLOAD_BYTES must be a valid usize");

        let storage_root = std::env::var("STORAGE_ROOT").unwrap_or_else(|_| "./storage".into());

        Self {
            host,
            port,
            cors_origins,
            request_timeout_secs,
            shutdown_timeout_secs,
            max_upload_bytes,
            storage_root,
            jwt: JwtConfig::from_env(),
            integrations: IntegrationsConfig::from_env(),
            email: EmailConfig::from_env(),
        }
    }
}

/// Enterprise per-file limit plus room for the multipart envelope.
const DEFAULT_MAX_UPLOAD_BYTES: usize = 150 * 1024 * 1024;

/// Endpoints and credentials of external collaborators. Each one is
/// optional; a missing setting disables the feature that needs it.
#[derive(Debug, Clone, Default)]
pub struct IntegrationsConfig {
    pub model_validator_url: Option<String>,
    pub automation_runner_url: Option<String>,
    pub n8n: Option<N8nConfig>,
    pub lemon: Option<LemonConfig>,
    pub ai: Option<AiConfig>,
    /// 64 hex chars; enables encryption of third-party tokens and keys.
    pub encryption_key: Option<String>,
    /// Public URL of the web app, used for checkout redirects.
    pub app_url: String,
    /// Drive v3 API root; file lookups in chat are off without it.
    pub google_drive_url: Option<String>,
    /// Shared secret signing the runner's completion callbacks.
    pub runner_webhook_secret: Option<String>,
}

#[derive(Debug, Clone)]
pub struct N8nConfig {
    pub base_url: String,
    pub api_key: String,
}

#[derive(Debug, Clone)]
pub struct LemonConfig {
    pub api_key: String,
    pub store_id: String,
    pub webhook_secret: String,
}

#[derive(Debug, Clone)]
pub struct AiConfig {
    pub base_url: String,
    pub api_key: String,
    /// Model that decides what to say and which tool to run.
    pub orchestrator_model: String,
    /// Model that fills in tool arguments.
    pub tool_model: String,
}

const GOOGLE_DRIVE_URL: &str = "https://www.googleapis.com/drive/v3";

fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl IntegrationsConfig {
    /// | Env Var                        | Notes                              |
    /// |--------------------------------|------------------------------------|
    /// | `MODEL_VALIDATOR_URL`          | base URL of the ZIP validator      |
    /// | `AUTOMATION_RUNNER_URL`        | base URL of the workflow runner    |
    /// | `N8N_BASE_URL`, `N8N_API_KEY`  | both required to enable n8n        |
    /// | `LEMONSQUEEZY_API_KEY`, `LEMONSQUEEZY_STORE_ID`, `LEMONSQUEEZY_WEBHOOK_SECRET` | all three |
    /// | `AI_BASE_URL`, `AI_API_KEY`    | OpenAI-compatible endpoint         |
    /// | `AI_MODEL`, `AI_TOOL_MODEL`    | tool model defaults to `AI_MODEL`  |
    /// | `ENCRYPTION_KEY`               | 64 hex chars                       |
    /// | `APP_URL`                      | default `http://localhost:3000`    |
    /// | `GOOGLE_DRIVE_URL`             | default Google's Drive v3 endpoint |
    /// | `AUTOMATION_WEBHOOK_SECRET`    | HMAC key of runner callbacks       |
    pub fn from_env() -> Self {
        let n8n = match (non_empty_var("N8N_BASE_URL"), non_empty_var("N8N_API_KEY")) {
            (Some(base_url), Some(api_key)) => Some(N8nConfig {
                base_url: base_url.trim_end_matches('/').to_string(),
                api_key,
            }),
            _ => None,
        };

        let lemon = match (
            non_empty_var("LEMONSQUEEZY_API_KEY"),
            non_empty_var("LEMONSQUEEZY_STORE_ID"),
            non_empty_var("LEMONSQUEEZY_WEBHOOK_SECRET"),
        ) {
            (Some(api_key), Some(store_id), Some(webhook_secret)) => Some(LemonConfig {
                api_key,
                store_id,
                webhook_secret,
            }),
            _ => None,
        };

        let ai = match (non_empty_var("AI_BASE_URL"), non_empty_var("AI_API_KEY")) {
            (Some(base_url), Some(api_key)) => {
                let orchestrator_model =
                    non_empty_var("AI_MODEL").unwrap_or_else(|| "llama-3.3-70b-versatile".into());
                Some(AiConfig {
                    base_url: base_url.trim_end_matches('/').to_string(),
                    api_key,
                    tool_model: non_empty_var("AI_TOOL_MODEL")
                        .unwrap_or_else(|| orchestrator_model.clone()),
                    orchestrator_model,
                })
            }
            _ => None,
        };

        Self {
            model_validator_url: non_empty_var("MODEL_VALIDATOR_URL")
                .map(|u| u.trim_end_matches('/').to_string()),
            automation_runner_url: non_empty_var("AUTOMATION_RUNNER_URL")
                .map(|u| u.trim_end_matches('/').to_string()),
            n8n,
            lemon,
            ai,
            encryption_key: non_empty_var("ENCRYPTION_KEY"),
            app_url: non_empty_var("APP_URL").unwrap_or_else(|| "http://localhost:3000".into()),
            google_drive_url: Some(
                non_empty_var("GOOGLE_DRIVE_URL")
                    .map(|u| u.trim_end_matches('/').to_string())
                    .unwrap_or_else(|| GOOGLE_DRIVE_URL.into()),
            ),
            runner_webhook_secret: non_empty_var("AUTOMATION_WEBHOOK_SECRET"),
        }
    }
}
