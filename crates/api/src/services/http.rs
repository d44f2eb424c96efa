//! Shared plumbing for the outbound HTTP clients.

use std::time::Duration;

/// Failure talking to an external collaborator.
#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
    #[error("{service} request failed: {source}")]
    Request {
        service: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("{service} returned {status}: {body}")]
    Status {
        service: &'static str,
        status: u16,
        body: String,
    },

    #[error("rate limit reached")]
    RateLimited { retry_after_secs: Option<u64> },

    #[error("{service} returned an unexpected response: {detail}")]
    Malformed {
        service: &'static str,
        detail: String,
    },
}

impl UpstreamError {
    pub fn request(service: &'static str) -> impl FnOnce(reqwest::Error) -> Self {
        move |source| Self::Request { service, source }
    }

    pub fn malformed(service: &'static str, detail: impl Into<String>) -> Self {
        Self::Malformed {
            service,
            detail: detail.into(),
        }
    }
}

/// Client shared by every outbound integration.
pub fn build_http_client(timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
}

/// Pass 2xx responses through; turn anything else into an error carrying
/// the status and body. 429 becomes [`UpstreamError::RateLimited`].
pub async fn ensure_success(
    service: &'static str,
    response: reqwest::Response,
) -> Result<reqwest::Response, UpstreamError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        let retry_after_secs = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse().ok());
        return Err(UpstreamError::RateLimited { retry_after_secs });
    }
    let body = response
        .text()
        .await
        .unwrap_or_else(|e| format!("<failed to read body: {e}>"));
    Err(UpstreamError::Status {
        service,
        status: status.as_u16(),
        body,
    })
}

/// Send, check the status and decode a JSON body.
pub async fn send_json(
    service: &'static str,
    request: reqwest::RequestBuilder,
) -> Result<serde_json::Value, UpstreamError> {
    let response = request
        .send()
        .await
        .map_err(UpstreamError::request(service))?;
    ensure_success(service, response)
        .await?
        .json()
        .await
        .map_err(|e| UpstreamError::malformed(service, e.to_string()))
}
