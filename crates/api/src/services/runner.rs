//! Client for the service that executes purchased automations.

use agora_core::automation::RunRequest;
use async_trait::async_trait;
use serde_json::Value;

use super::http::{send_json, UpstreamError};

const SERVICE: &str = "automation runner";

#[async_trait]
pub trait AutomationRunner: Send + Sync {
    /// Run one automation; returns the runner's result document.
    async fn run(&self, request: &RunRequest) -> Result<Value, UpstreamError>;
}

pub struct HttpAutomationRunner {
    client: reqwest::Client,
    base_url: String,
}

impl HttpAutomationRunner {
    pub fn new(client: reqwest::Client, base_url: String) -> Self {
        Self { client, base_url }
    }
}

#[async_trait]
impl AutomationRunner for HttpAutomationRunner {
    async fn run(&self, request: &RunRequest) -> Result<Value, UpstreamError> {
        tracing::debug!(
            automation_id = request.automation_id,
            user_id = request.user_id,
            "Submitting automation run"
        );
        send_json(
            SERVICE,
            self.client
                .post(format!("{}/api/automations/run", self.base_url))
                .json(request),
        )
        .await
    }
}
