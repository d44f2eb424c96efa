//! n8n REST API client used to import automation workflows.

use serde_json::Value;

use super::http::{send_json, UpstreamError};

const SERVICE: &str = "n8n";

pub struct N8nClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl N8nClient {
    pub fn new(client: reqwest::Client, base_url: String, api_key: String) -> Self {
        Self {
            client,
            base_url,
            api_key,
        }
    }

    /// `POST /api/v1/workflows`; returns the id n8n assigned.
    pub async fn create_workflow(&self, payload: &Value) -> Result<String, UpstreamError> {
        let created = send_json(
            SERVICE,
            self.client
                .post(format!("{}/api/v1/workflows", self.base_url))
                .header("X-N8N-API-KEY", &self.api_key)
                .json(payload),
        )
        .await?;

        workflow_id(&created)
            .ok_or_else(|| UpstreamError::malformed(SERVICE, "n8n did not return workflow id"))
    }
}

/// Ids come back as strings on current n8n and as numbers on older builds.
fn workflow_id(created: &Value) -> Option<String> {
    match created.get("id")? {
        Value::String(id) if !id.is_empty() => Some(id.clone()),
        Value::Number(id) => Some(id.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn accepts_string_and_numeric_ids() {
        assert_eq!(workflow_id(&json!({"id": "Ab12"})).as_deref(), Some("Ab12"));
        assert_eq!(workflow_id(&json!({"id": 42})).as_deref(), Some("42"));
        assert_eq!(workflow_id(&json!({"id": ""})), None);
        assert_eq!(workflow_id(&json!({"name": "x"})), None);
    }
}
