//! Chat completion provider behind the assistant.
//!
//! Two calls drive a turn: [`AiProvider::decide`] returns the orchestrator's
//! JSON decision, and [`AiProvider::tool_arguments`] forces a single tool
//! call to produce that tool's arguments. [`OpenAiCompatible`] speaks the
//! `/chat/completions` dialect shared by OpenAI, Groq and friends.

use agora_core::chat::ChatMessage;
use async_trait::async_trait;
use serde_json::{json, Value};

use super::http::{send_json, UpstreamError};
use crate::config::AiConfig;

const SERVICE: &str = "AI provider";

const TOOL_TEMPERATURE: f64 = 0.1;

#[async_trait]
pub trait AiProvider: Send + Sync {
    /// Raw JSON text of the orchestrator's decision.
    async fn decide(&self, messages: &[ChatMessage]) -> Result<String, UpstreamError>;

    /// Arguments for `tool`, given its function definition. `None` when the
    /// model declined to call it.
    async fn tool_arguments(
        &self,
        tool: &Value,
        messages: &[ChatMessage],
    ) -> Result<Option<Value>, UpstreamError>;
}

pub struct OpenAiCompatible {
    client: reqwest::Client,
    config: AiConfig,
}

impl OpenAiCompatible {
    pub fn new(client: reqwest::Client, config: AiConfig) -> Self {
        Self { client, config }
    }

    async fn complete(&self, body: Value) -> Result<Value, UpstreamError> {
        send_json(
            SERVICE,
            self.client
                .post(format!("{}/chat/completions", self.config.base_url))
                .bearer_auth(&self.config.api_key)
                .json(&body),
        )
        .await
    }
}

#[async_trait]
impl AiProvider for OpenAiCompatible {
    async fn decide(&self, messages: &[ChatMessage]) -> Result<String, UpstreamError> {
        let completion = self
            .complete(json!({
                "model": self.config.orchestrator_model,
                "messages": messages,
                "response_format": { "type": "json_object" },
            }))
            .await?;

        message_content(&completion)
            .map(str::to_string)
            .ok_or_else(|| UpstreamError::malformed(SERVICE, "completion has no message content"))
    }

    async fn tool_arguments(
        &self,
        tool: &Value,
        messages: &[ChatMessage],
    ) -> Result<Option<Value>, UpstreamError> {
        let name = tool
            .pointer("/function/name")
            .cloned()
            .unwrap_or(Value::Null);
        let completion = self
            .complete(json!({
                "model": self.config.tool_model,
                "messages": messages,
                "tools": [tool],
                "tool_choice": { "type": "function", "function": { "name": name } },
                "temperature": TOOL_TEMPERATURE,
            }))
            .await?;

        tool_call_arguments(&completion)
    }
}

fn message_content(completion: &Value) -> Option<&str> {
    completion
        .pointer("/choices/0/message/content")
        .and_then(Value::as_str)
}

/// Arguments of the first tool call. Providers send them as a JSON string.
fn tool_call_arguments(completion: &Value) -> Result<Option<Value>, UpstreamError> {
    let Some(arguments) = completion.pointer("/choices/0/message/tool_calls/0/function/arguments")
    else {
        return Ok(None);
    };
    match arguments {
        Value::String(raw) => serde_json::from_str(raw)
            .map(Some)
            .map_err(|e| UpstreamError::malformed(SERVICE, format!("tool arguments: {e}"))),
        Value::Object(_) => Ok(Some(arguments.clone())),
        _ => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_stringified_tool_arguments() {
        let completion = json!({
            "choices": [{"message": {"tool_calls": [{
                "function": {"name": "search_automations", "arguments": "{\"query\":\"invoices\"}"}
            }]}}]
        });
        assert_eq!(
            tool_call_arguments(&completion).unwrap(),
            Some(json!({"query": "invoices"}))
        );
    }

    #[test]
    fn missing_tool_call_is_none() {
        let completion = json!({"choices": [{"message": {"content": "no"}}]});
        assert_eq!(tool_call_arguments(&completion).unwrap(), None);
        assert_eq!(message_content(&completion), Some("no"));
    }

    #[test]
    fn garbled_arguments_are_malformed() {
        let completion = json!({
            "choices": [{"message": {"tool_calls": [{"function": {"arguments": "{oops"}}]}}]
        });
        assert!(matches!(
            tool_call_arguments(&completion),
            Err(UpstreamError::Malformed { .. })
        ));
    }
}
