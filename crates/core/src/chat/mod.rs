//! AI chat: the SSE stream protocol and the state built from it.

pub mod context;
pub mod decision;
pub mod events;
pub mod session;
pub mod sse;

use serde::{Deserialize, Serialize};

pub use context::{extract_setup_context, SetupContext};
pub use decision::{OrchestratorDecision, ToolAction, ToolName};
pub use events::{
    chunk_text, encode_frame, AutomationCard, ChatEvent, StreamEvent, CONTENT_CHUNK_CHARS, DONE_FRAME,
};
pub use session::{ChatTurn, SetupPhase, SetupState, Typewriter, TurnPhase};
pub use sse::{SseDecoder, SseFrame};

pub const ROLE_USER: &str = "user";
pub const ROLE_ASSISTANT: &str = "assistant";
pub const ROLE_SYSTEM: &str = "system";

/// One message of a conversation, in the provider's wire shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    #[serde(default)]
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: &str, content: impl Into<String>) -> Self {
        Self {
            role: role.to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(ROLE_USER, content)
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(ROLE_SYSTEM, content)
    }
}

/// Conversation for a request: explicit history wins over a single prompt.
pub fn build_chat_messages(
    messages: Option<Vec<ChatMessage>>,
    prompt: Option<&str>,
) -> Option<Vec<ChatMessage>> {
    match (messages, prompt.map(str::trim).filter(|p| !p.is_empty())) {
        (Some(history), _) if !history.is_empty() => Some(history),
        (_, Some(prompt)) => Some(vec![ChatMessage::user(prompt)]),
        _ => None,
    }
}

/// Content of the most recent user message.
pub fn last_user_message(messages: &[ChatMessage]) -> &str {
    messages
        .iter()
        .rev()
        .find(|m| m.role == ROLE_USER)
        .map(|m| m.content.as_str())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn history_or_prompt() {
        assert_eq!(build_chat_messages(None, Some("  ")), None);
        assert_eq!(
            build_chat_messages(None, Some("hi")),
            Some(vec![ChatMessage::user("hi")])
        );
        let history = vec![ChatMessage::user("a"), ChatMessage::new(ROLE_ASSISTANT, "b")];
        assert_eq!(
            build_chat_messages(Some(history.clone()), Some("ignored")),
            Some(history.clone())
        );
        assert_eq!(last_user_message(&history), "a");
    }
}
