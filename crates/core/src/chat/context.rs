//! Recover the automation setup in progress from the conversation text.
//!
//! Tool handlers leave markers in the transcript through `hidden_context`
//! events. They are searched in priority order: a background-execution
//! prompt, then a ready-to-run marker, then any `automation_id=` mention
//! with an optional `existing_config=` object.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use super::events::Config;
use super::ChatMessage;
use crate::types::DbId;

static BACKGROUND_PROMPT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\[BACKGROUND_PROMPT automation_id="(\d+)" config="#).expect("valid regex")
});

static READY_TO_RUN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\[READY_TO_RUN automation_id="(\d+)" config="#).expect("valid regex")
});

static AUTOMATION_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?i)automation_id[=:]\s*"?(\d+)"?"#).expect("valid regex"));

static AUTOMATION_NAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)(?:Setting up |automation_name[=:]\s*)"([^"]+)""#).expect("valid regex")
});

static EXISTING_CONFIG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"existing_config[=:]\s*").expect("valid regex"));

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SetupContext {
    pub automation_id: DbId,
    pub automation_name: Option<String>,
    pub collected_config: Config,
    pub is_background_prompt: bool,
    pub ready_to_execute: bool,
}

/// Marker asking the assistant to offer background execution.
pub fn background_prompt_marker(automation_id: DbId, config: &Config) -> String {
    format!(
        "[BACKGROUND_PROMPT automation_id=\"{automation_id}\" config={}]",
        serde_json::Value::Object(config.clone())
    )
}

/// Marker recording a fully collected configuration.
pub fn ready_to_run_marker(automation_id: DbId, config: &Config) -> String {
    format!(
        "[READY_TO_RUN automation_id=\"{automation_id}\" config={}]",
        serde_json::Value::Object(config.clone())
    )
}

/// Parse the JSON object starting at `text`, ignoring whatever follows it.
fn leading_object(text: &str) -> Option<Config> {
    serde_json::Deserializer::from_str(text)
        .into_iter::<Config>()
        .next()?
        .ok()
}

fn marker(re: &Regex, text: &str) -> Option<(DbId, Config)> {
    re.captures_iter(text).find_map(|caps| {
        let id = caps[1].parse().ok()?;
        let end = caps.get(0)?.end();
        Some((id, leading_object(&text[end..])?))
    })
}

pub fn extract_setup_context(messages: &[ChatMessage]) -> Option<SetupContext> {
    let all = messages
        .iter()
        .map(|m| m.content.as_str())
        .collect::<Vec<_>>()
        .join("\n");

    let automation_name = AUTOMATION_NAME_RE
        .captures_iter(&all)
        .last()
        .map(|caps| caps[1].to_string());

    if let Some((automation_id, collected_config)) = marker(&BACKGROUND_PROMPT_RE, &all) {
        return Some(SetupContext {
            automation_id,
            automation_name,
            collected_config,
            is_background_prompt: true,
            ready_to_execute: false,
        });
    }

    if let Some((automation_id, collected_config)) = marker(&READY_TO_RUN_RE, &all) {
        return Some(SetupContext {
            automation_id,
            automation_name,
            collected_config,
            is_background_prompt: false,
            ready_to_execute: true,
        });
    }

    // The latest mention describes the setup in progress.
    let automation_id = AUTOMATION_ID_RE.captures_iter(&all).last()?[1].parse().ok()?;
    let collected_config = EXISTING_CONFIG_RE
        .find_iter(&all)
        .filter_map(|m| leading_object(&all[m.end()..]))
        .last()
        .unwrap_or_default();

    Some(SetupContext {
        automation_id,
        automation_name,
        collected_config,
        ..Default::default()
    })
}
