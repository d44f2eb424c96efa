//! Lemon Squeezy checkout client.

use agora_core::payments::{checkout_payload, checkout_url, CheckoutRequest};

use super::http::{send_json, UpstreamError};

const SERVICE: &str = "Lemon Squeezy";
const CHECKOUTS_URL: &str = "https://api.lemonsqueezy.com/v1/checkouts";
const JSON_API: &str = "application/vnd.api+json";

pub struct LemonClient {
    client: reqwest::Client,
    api_key: String,
}

impl LemonClient {
    pub fn new(client: reqwest::Client, api_key: String) -> Self {
        Self { client, api_key }
    }

    /// Create a hosted checkout and return its URL.
    pub async fn create_checkout(&self, req: &CheckoutRequest<'_>) -> Result<String, UpstreamError> {
        let response = send_json(
            SERVICE,
            self.client
                .post(CHECKOUTS_URL)
                .header(reqwest::header::ACCEPT, JSON_API)
                .header(reqwest::header::CONTENT_TYPE, JSON_API)
                .bearer_auth(&self.api_key)
                .body(checkout_payload(req).to_string()),
        )
        .await?;

        checkout_url(&response)
            .map(str::to_string)
            .ok_or_else(|| UpstreamError::malformed(SERVICE, "checkout response has no url"))
    }
}
