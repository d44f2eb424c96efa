use std::sync::Arc;
use std::time::Duration;

use agora_core::crypto::Encryptor;
use agora_core::error::CoreError;
use agora_events::{EmailDelivery, EventBus};

use crate::config::ServerConfig;
use crate::error::AppResult;
use crate::services::ai::{AiProvider, OpenAiCompatible};
use crate::services::drive::{GoogleDrive, HttpGoogleDrive};
use crate::services::file_store::{FileStore, LocalFileStore};
use crate::services::http::build_http_client;
use crate::services::lemon::LemonClient;
use crate::services::mailer::{LogMailer, OtpMailer, SmtpMailer};
use crate::services::n8n::N8nClient;
use crate::services::runner::{AutomationRunner, HttpAutomationRunner};
use crate::services::validator::{HttpModelValidator, ModelValidator};

/// Outbound calls may take longer than the request timeout allows for local
/// work; the validator unpacks whole archives.
const OUTBOUND_TIMEOUT: Duration = Duration::from_secs(120);

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// Cheap to clone: everything is behind `Arc` or already `Clone`.
#[derive(Clone)]
pub struct AppState {
    pub pool: agora_db::DbPool,
    pub config: Arc<ServerConfig>,
    pub event_bus: Arc<EventBus>,
    pub files: Arc<dyn FileStore>,
    pub mailer: Arc<dyn OtpMailer>,
    pub integrations: Integrations,
}

/// Clients for the optional external services. `None` when the deployment
/// does not configure one.
#[derive(Clone, Default)]
pub struct Integrations {
    pub validator: Option<Arc<dyn ModelValidator>>,
    pub runner: Option<Arc<dyn AutomationRunner>>,
    pub n8n: Option<Arc<N8nClient>>,
    pub lemon: Option<Arc<LemonClient>>,
    pub ai: Option<Arc<dyn AiProvider>>,
    pub encryptor: Option<Arc<Encryptor>>,
    pub drive: Option<Arc<dyn GoogleDrive>>,
}

impl AppState {
    /// Build the state and every configured client from `config`.
    ///
    /// Panics when `ENCRYPTION_KEY` is set but malformed.
    pub fn new(pool: agora_db::DbPool, config: ServerConfig, event_bus: Arc<EventBus>) -> Self {
        let http = build_http_client(OUTBOUND_TIMEOUT);
        let settings = &config.integrations;

        let integrations = Integrations {
            validator: settings.model_validator_url.clone().map(|url| {
                Arc::new(HttpModelValidator::new(http.clone(), url)) as Arc<dyn ModelValidator>
            }),
            runner: settings.automation_runner_url.clone().map(|url| {
                Arc::new(HttpAutomationRunner::new(http.clone(), url)) as Arc<dyn AutomationRunner>
            }),
            n8n: settings.n8n.clone().map(|n8n| {
                Arc::new(N8nClient::new(http.clone(), n8n.base_url, n8n.api_key))
            }),
            lemon: settings
                .lemon
                .as_ref()
                .map(|lemon| Arc::new(LemonClient::new(http.clone(), lemon.api_key.clone()))),
            ai: settings.ai.clone().map(|ai| {
                Arc::new(OpenAiCompatible::new(http.clone(), ai)) as Arc<dyn AiProvider>
            }),
            encryptor: settings.encryption_key.as_deref().map(|key| {
                Arc::new(Encryptor::from_hex(key).expect("ENCRYPTION_KEY must be 64 hex chars"))
            }),
            drive: settings.google_drive_url.clone().map(|url| {
                Arc::new(HttpGoogleDrive::new(http.clone(), url)) as Arc<dyn GoogleDrive>
            }),
        };

        let mailer: Arc<dyn OtpMailer> = match config.email.clone() {
            Some(email) => Arc::new(SmtpMailer::new(EmailDelivery::new(email))),
            None => {
                tracing::warn!("SMTP_HOST not set, verification codes will only be logged");
                Arc::new(LogMailer)
            }
        };

        Self {
            pool,
            files: Arc::new(LocalFileStore::new(&config.storage_root)),
            config: Arc::new(config),
            event_bus,
            mailer,
            integrations,
        }
    }

    pub fn with_mailer(mut self, mailer: Arc<dyn OtpMailer>) -> Self {
        self.mailer = mailer;
        self
    }

    pub fn with_files(mut self, files: Arc<dyn FileStore>) -> Self {
        self.files = files;
        self
    }

    pub fn runner(&self) -> AppResult<&Arc<dyn AutomationRunner>> {
        unavailable(self.integrations.runner.as_ref(), "Automation runner is not configured")
    }

    pub fn n8n(&self) -> AppResult<&Arc<N8nClient>> {
        unavailable(self.integrations.n8n.as_ref(), "n8n is not configured")
    }

    /// The checkout client together with the store it sells from.
    pub fn lemon(&self) -> AppResult<(&Arc<LemonClient>, &crate::config::LemonConfig)> {
        let client = unavailable(self.integrations.lemon.as_ref(), "Payments are not configured")?;
        let settings = unavailable(
            self.config.integrations.lemon.as_ref(),
            "Payments are not configured",
        )?;
        Ok((client, settings))
    }

    pub fn ai(&self) -> AppResult<&Arc<dyn AiProvider>> {
        unavailable(self.integrations.ai.as_ref(), "AI assistant is not configured")
    }

    pub fn encryptor(&self) -> AppResult<&Arc<Encryptor>> {
        unavailable(
            self.integrations.encryptor.as_ref(),
            "ENCRYPTION_KEY is not configured",
        )
    }
}

fn unavailable<'a, T: ?Sized>(value: Option<&'a T>, message: &str) -> AppResult<&'a T> {
    value.ok_or_else(|| CoreError::Unavailable(message.to_string()).into())
}
