//! Helpers for running purchased automations and storing their input files.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::types::DbId;

/// Largest file accepted into an automation's storage folder.
pub const MAX_AUTOMATION_UPLOAD_BYTES: u64 = 50 * 1024 * 1024;

pub const DEFAULT_UPLOAD_MIME: &str = "video/mp4";

/// Workflows read webhook body fields in lowercase while configs are
/// collected under their UPPER_SNAKE input names.
pub fn normalize_run_config(config: &Map<String, Value>) -> Map<String, Value> {
    config
        .iter()
        .map(|(k, v)| (k.to_lowercase(), v.clone()))
        .collect()
}

/// Body posted to the automation runner.
#[derive(Debug, Clone, Serialize)]
pub struct RunRequest {
    pub automation_id: DbId,
    pub user_id: DbId,
    pub config: Map<String, Value>,
}

impl RunRequest {
    pub fn new(automation_id: DbId, user_id: DbId, config: &Map<String, Value>) -> Self {
        Self {
            automation_id,
            user_id,
            config: normalize_run_config(config),
        }
    }
}

/// Folder holding one user's files for one automation.
pub fn storage_path(user_id: DbId, automation_id: DbId) -> String {
    format!("{user_id}_{automation_id}/")
}

/// Object key for an uploaded file: `<folder><unix-millis>_<name>`.
pub fn upload_object_key(user_id: DbId, automation_id: DbId, millis: i64, name: &str) -> String {
    let name = sanitize_file_name(name);
    format!("{}{millis}_{name}", storage_path(user_id, automation_id))
}

/// Strip path separators and control characters from a client file name.
pub fn sanitize_file_name(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or_default();
    let cleaned: String = base
        .chars()
        .filter(|c| !c.is_control())
        .collect::<String>()
        .trim()
        .trim_start_matches('.')
        .to_string();
    if cleaned.is_empty() {
        "upload.bin".into()
    } else {
        cleaned
    }
}

/// One entry of an automation's `system_config` list.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemConfigEntry {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub bucket: Option<String>,
    #[serde(default)]
    pub mime_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageTarget {
    pub bucket: String,
    pub mime_type: String,
}

/// First storage-path entry that names a bucket.
pub fn find_storage_bucket(system_config: &[SystemConfigEntry]) -> Option<StorageTarget> {
    system_config.iter().find_map(|entry| {
        let name = entry.name.to_uppercase();
        if !(name.contains("STORAGE_PATH") || name.contains("STORAGE_FOLDER")) {
            return None;
        }
        let bucket = entry.bucket.as_deref().filter(|b| !b.is_empty())?;
        Some(StorageTarget {
            bucket: bucket.to_string(),
            mime_type: entry
                .mime_type
                .clone()
                .unwrap_or_else(|| DEFAULT_UPLOAD_MIME.to_string()),
        })
    })
}

/// Parse a stored `system_config` column; anything but an array is empty.
pub fn parse_system_config(value: &Value) -> Vec<SystemConfigEntry> {
    serde_json::from_value(value.clone()).unwrap_or_default()
}

/// Required inputs that the config does not yet provide a non-empty value for.
pub fn missing_inputs(required: &[String], config: &Map<String, Value>) -> Vec<String> {
    required
        .iter()
        .filter(|field| {
            !config.get(field.as_str()).is_some_and(|v| match v {
                Value::Null => false,
                Value::String(s) => !s.trim().is_empty(),
                _ => true,
            })
        })
        .cloned()
        .collect()
}

/// Status a runner reports for a finished run.
pub const RUN_SUCCESS: &str = "success";

/// Name shown when a completion report does not carry one.
pub const FALLBACK_AUTOMATION_NAME: &str = "Automation";

/// Notification text for a run the runner finished in the background.
pub fn completion_message(name: &str, succeeded: bool, result: &Value, error: Option<&str>) -> String {
    let name = if name.trim().is_empty() {
        FALLBACK_AUTOMATION_NAME
    } else {
        name.trim()
    };
    if !succeeded {
        return match error.map(str::trim).filter(|e| !e.is_empty()) {
            Some(error) => format!("❌ {name} failed: {error}"),
            None => format!("❌ {name} failed"),
        };
    }

    let mut message = format!("✅ {name} completed successfully");
    if let Some(detail) = result.get("message").and_then(Value::as_str) {
        message.push_str(&format!(": {detail}"));
    } else if let Some(posts) = result.get("postsCreated").and_then(Value::as_i64) {
        message.push_str(&format!(" - {posts} posts created"));
    }
    message
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn run_config_keys_are_lowercased() {
        let cfg = json!({"TIKTOK_URL": "https://x", "Topic": "ai"});
        let out = normalize_run_config(cfg.as_object().unwrap());
        assert_eq!(Value::Object(out), json!({"tiktok_url": "https://x", "topic": "ai"}));
    }

    #[test]
    fn storage_paths() {
        assert_eq!(storage_path(7, 42), "7_42/");
        assert_eq!(upload_object_key(7, 42, 1000, "../clip.mp4"), "7_42/1000_clip.mp4");
        assert_eq!(sanitize_file_name(""), "upload.bin");
    }

    #[test]
    fn bucket_lookup() {
        let entries = parse_system_config(&json!([
            {"name": "OPENAI_API_KEY"},
            {"name": "video_storage_path"},
            {"name": "VIDEO_STORAGE_FOLDER", "bucket": "clips", "mimeType": "video/webm"},
            {"name": "OTHER_STORAGE_PATH", "bucket": "late"}
        ]));
        assert_eq!(
            find_storage_bucket(&entries),
            Some(StorageTarget {
                bucket: "clips".into(),
                mime_type: "video/webm".into()
            })
        );

        let defaulted = parse_system_config(&json!([{"name": "STORAGE_PATH", "bucket": "b"}]));
        assert_eq!(find_storage_bucket(&defaulted).unwrap().mime_type, "video/mp4");
        assert!(find_storage_bucket(&parse_system_config(&json!({"x": 1}))).is_none());
    }

    #[test]
    fn missing_inputs_ignore_blank_values() {
        let cfg = json!({"TOPIC": "ai", "EMAIL": "  ", "COUNT": 3});
        let missing = missing_inputs(
            &["TOPIC".into(), "EMAIL".into(), "COUNT".into(), "URL".into()],
            cfg.as_object().unwrap(),
        );
        assert_eq!(missing, vec!["EMAIL", "URL"]);
    }

    #[test]
    fn completion_messages() {
        assert_eq!(
            completion_message("Invoice Bot", true, &json!({"message": "3 invoices filed"}), None),
            "✅ Invoice Bot completed successfully: 3 invoices filed"
        );
        assert_eq!(
            completion_message("Poster", true, &json!({"postsCreated": 4}), None),
            "✅ Poster completed successfully - 4 posts created"
        );
        assert_eq!(
            completion_message(" ", false, &Value::Null, Some("quota exceeded")),
            "❌ Automation failed: quota exceeded"
        );
        assert_eq!(completion_message("X", false, &Value::Null, None), "❌ X failed");
    }
}
