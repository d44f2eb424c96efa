//! Client for the model archive validation service.
//!
//! Uploaded ZIPs are posted to `POST {base}/process-zip` together with the
//! listing's name, setup instructions and description. The service answers
//! with a `validation_status` and, on failure, a `validation_reason`.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use super::http::{send_json, UpstreamError};

const SERVICE: &str = "model validator";

/// Listing fields sent alongside the archive.
#[derive(Debug, Clone)]
pub struct ValidationSubmission<'a> {
    pub file_name: &'a str,
    pub bytes: Vec<u8>,
    pub model_name: &'a str,
    pub setup: &'a str,
    pub description: &'a str,
}

/// Outcome of validating one archive. `report` is the raw service response,
/// stored with the model.
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationOutcome {
    Valid { report: Value },
    Invalid { reason: String, report: Value },
}

#[derive(Deserialize)]
struct ValidationReport {
    #[serde(default)]
    validation_status: Option<String>,
    #[serde(default)]
    validation_reason: Option<String>,
}

impl ValidationOutcome {
    pub fn from_report(report: Value) -> Self {
        let parsed: ValidationReport =
            serde_json::from_value(report.clone()).unwrap_or(ValidationReport {
                validation_status: None,
                validation_reason: None,
            });
        let invalid = parsed
            .validation_status
            .as_deref()
            .is_some_and(|s| s.eq_ignore_ascii_case("INVALID"));
        if invalid {
            Self::Invalid {
                reason: parsed
                    .validation_reason
                    .unwrap_or_else(|| "Unknown reason".to_string()),
                report,
            }
        } else {
            Self::Valid { report }
        }
    }
}

#[async_trait]
pub trait ModelValidator: Send + Sync {
    async fn validate(
        &self,
        submission: ValidationSubmission<'_>,
    ) -> Result<ValidationOutcome, UpstreamError>;
}

pub struct HttpModelValidator {
    client: reqwest::Client,
    base_url: String,
}

impl HttpModelValidator {
    pub fn new(client: reqwest::Client, base_url: String) -> Self {
        Self { client, base_url }
    }
}

#[async_trait]
impl ModelValidator for HttpModelValidator {
    async fn validate(
        &self,
        submission: ValidationSubmission<'_>,
    ) -> Result<ValidationOutcome, UpstreamError> {
        let file = reqwest::multipart::Part::bytes(submission.bytes)
            .file_name(submission.file_name.to_string())
            .mime_str("application/zip")
            .map_err(UpstreamError::request(SERVICE))?;
        let form = reqwest::multipart::Form::new()
            .part("file", file)
            .text("model_name", submission.model_name.to_string())
            .text("model_setUp", submission.setup.to_string())
            .text("description", submission.description.to_string());

        let report = send_json(
            SERVICE,
            self.client
                .post(format!("{}/process-zip", self.base_url))
                .multipart(form),
        )
        .await?;

        let outcome = ValidationOutcome::from_report(report);
        if let ValidationOutcome::Invalid { reason, .. } = &outcome {
            tracing::info!(model_name = submission.model_name, %reason, "Model archive rejected by validator");
        }
        Ok(outcome)
    }
}
