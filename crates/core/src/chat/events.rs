//! The tagged JSON envelope carried by each SSE frame of the chat stream.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::types::{DbId, Timestamp};

/// Terminal frame of every chat stream.
pub const DONE_FRAME: &str = "data: [DONE]\n\n";

/// Size of the content deltas the server emits.
pub const CONTENT_CHUNK_CHARS: usize = 10;

pub type Config = Map<String, Value>;

/// One frame of the chat stream.
///
/// Typed events carry a `type` tag. Plain text deltas are `{"content": ".."}`
/// with no tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StreamEvent {
    Typed(ChatEvent),
    Content { content: String },
}

impl StreamEvent {
    pub fn content(text: impl Into<String>) -> Self {
        Self::Content {
            content: text.into(),
        }
    }

    /// Text a tool contributed to the visible answer, if any.
    pub fn text(&self) -> Option<&str> {
        match self {
            Self::Content { content } => Some(content),
            Self::Typed(_) => None,
        }
    }
}

impl From<ChatEvent> for StreamEvent {
    fn from(event: ChatEvent) -> Self {
        Self::Typed(event)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchStatus {
    Start,
    End,
}

/// A search hit rendered as a card in the chat.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutomationCard {
    pub index: usize,
    pub name: String,
    pub price: String,
    pub description: String,
    pub requires: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatEvent {
    Automations {
        automations: Vec<Value>,
    },
    AutomationList {
        automations: Vec<AutomationCard>,
    },
    ConnectRequest {
        provider: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        automation_id: Option<DbId>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
    ConfigRequest {
        automation_id: DbId,
        required_inputs: Vec<String>,
    },
    AutomationContext {
        context: String,
    },
    Searching {
        status: SearchStatus,
    },
    SetupStarted {
        automation_id: DbId,
        automation_name: String,
        required_inputs: Vec<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        collected_fields: Option<Config>,
    },
    FileSearchResults {
        files: Vec<Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        query: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        field_name: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        automation_id: Option<DbId>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        automation_name: Option<String>,
    },
    FieldCollected {
        field_name: String,
        value: Value,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        display_value: Option<String>,
    },
    AutomationComplete {
        #[serde(default, skip_serializing_if = "Value::is_null")]
        result: Value,
    },
    ReadyToExecute {
        automation_id: DbId,
        automation_name: String,
        config: Config,
    },
    AwaitingInput {
        automation_id: DbId,
        automation_name: String,
        missing_fields: Vec<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        collected_config: Option<Config>,
    },
    AutomationInstances {
        instances: Vec<Value>,
    },
    /// Kept in the transcript for the assistant's memory, never displayed.
    HiddenContext {
        context: String,
    },
    /// Everything a tool wrote, replayed so the client can persist it.
    ToolOutput {
        content: String,
        tool: String,
    },
    UploadRequest {
        automation_id: DbId,
        field_name: String,
        accept: String,
    },
    ScheduleCreated {
        automation_id: DbId,
        /// `recurring` or `one_time`.
        schedule_type: String,
        description: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        cron: Option<String>,
        next_run: Timestamp,
    },
}

/// `data: <json>\n\n`.
pub fn encode_frame(event: &StreamEvent) -> String {
    // Every payload is a tree of string-keyed maps, which always serializes.
    let json = serde_json::to_string(event).unwrap_or_else(|_| String::from("{}"));
    format!("data: {json}\n\n")
}

/// Split `text` into pieces of at most `size` chars without breaking a char.
pub fn chunk_text(text: &str, size: usize) -> Vec<&str> {
    let size = size.max(1);
    let mut chunks = Vec::new();
    let mut start = 0;
    let mut count = 0;
    for (idx, _) in text.char_indices() {
        if count == size {
            chunks.push(&text[start..idx]);
            start = idx;
            count = 0;
        }
        count += 1;
    }
    if start < text.len() {
        chunks.push(&text[start..]);
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn content_frames_have_no_type() {
        let frame = encode_frame(&StreamEvent::content("hi"));
        assert_eq!(frame, "data: {\"content\":\"hi\"}\n\n");
    }

    #[test]
    fn typed_frames_are_tagged() {
        let event: StreamEvent = ChatEvent::ConnectRequest {
            provider: "google".into(),
            automation_id: Some(4),
            reason: None,
        }
        .into();
        let v = serde_json::to_value(&event).unwrap();
        assert_eq!(
            v,
            json!({"type": "connect_request", "provider": "google", "automation_id": 4})
        );
    }

    #[test]
    fn tool_output_parses_as_typed_not_content() {
        let raw = r#"{"type":"tool_output","content":"done","tool":"search_automations"}"#;
        let event: StreamEvent = serde_json::from_str(raw).unwrap();
        assert!(matches!(event, StreamEvent::Typed(ChatEvent::ToolOutput { .. })));
        assert_eq!(event.text(), None);
    }

    #[test]
    fn searching_status() {
        let event: StreamEvent =
            serde_json::from_str(r#"{"type":"searching","status":"end"}"#).unwrap();
        assert_eq!(
            event,
            StreamEvent::Typed(ChatEvent::Searching {
                status: SearchStatus::End
            })
        );
    }

    #[test]
    fn chunking_respects_char_boundaries() {
        assert_eq!(chunk_text("abcdefghijklm", 10), vec!["abcdefghij", "klm"]);
        assert_eq!(chunk_text("", 10), Vec::<&str>::new());
        let emoji = "ééééééééééé✓";
        let chunks = chunk_text(emoji, 10);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[1], "é✓");
        assert_eq!(chunk_text("line\nnext", 4), vec!["line", "\nnex", "t"]);
    }
}
