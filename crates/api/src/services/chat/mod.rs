//! Server side of the assistant: one chat turn streamed as SSE frames.
//!
//! The handler asks the orchestrator for a decision, then hands the turn to
//! [`pipeline::run_turn`], which writes frames through an [`Emitter`] into a
//! channel backing the response body. When the client goes away the channel
//! closes and the turn stops at its next send.

pub mod pipeline;
pub mod prompts;
pub mod tools;

use agora_core::chat::{chunk_text, encode_frame, ChatEvent, StreamEvent, CONTENT_CHUNK_CHARS, DONE_FRAME};
use tokio::sync::mpsc;

/// The client dropped the stream.
#[derive(Debug, Clone, Copy, thiserror::Error)]
#[error("chat client disconnected")]
pub struct Disconnected;

/// Writes encoded frames to the response and keeps the text a turn produced.
pub struct Emitter {
    tx: mpsc::Sender<String>,
    transcript: String,
    capture: Option<String>,
}

impl Emitter {
    pub fn new(tx: mpsc::Sender<String>) -> Self {
        Self {
            tx,
            transcript: String::new(),
            capture: None,
        }
    }

    pub async fn send(&mut self, event: impl Into<StreamEvent>) -> Result<(), Disconnected> {
        let event = event.into();
        match &event {
            StreamEvent::Content { content } => {
                self.transcript.push_str(content);
                if let Some(capture) = self.capture.as_mut() {
                    capture.push_str(content);
                }
            }
            // Markers stay in the saved transcript so later turns can
            // recover the setup in progress.
            StreamEvent::Typed(ChatEvent::HiddenContext { context })
            | StreamEvent::Typed(ChatEvent::AutomationContext { context }) => {
                self.transcript.push('\n');
                self.transcript.push_str(context);
            }
            StreamEvent::Typed(_) => {}
        }
        self.tx
            .send(encode_frame(&event))
            .await
            .map_err(|_| Disconnected)
    }

    /// One `content` frame.
    pub async fn say(&mut self, text: impl Into<String>) -> Result<(), Disconnected> {
        self.send(StreamEvent::content(text)).await
    }

    /// Text split into short deltas.
    pub async fn stream_text(&mut self, text: &str) -> Result<(), Disconnected> {
        for chunk in chunk_text(text, CONTENT_CHUNK_CHARS) {
            self.say(chunk).await?;
        }
        Ok(())
    }

    pub async fn done(&mut self) -> Result<(), Disconnected> {
        self.tx
            .send(DONE_FRAME.to_string())
            .await
            .map_err(|_| Disconnected)
    }

    /// Start collecting content written by a tool.
    pub fn begin_capture(&mut self) {
        self.capture = Some(String::new());
    }

    pub fn take_capture(&mut self) -> String {
        self.capture.take().unwrap_or_default()
    }

    /// Everything shown to the user in this turn, plus context markers.
    pub fn transcript(&self) -> &str {
        &self.transcript
    }

    /// Resolves once the client is gone.
    pub fn closed(&self) -> impl std::future::Future<Output = ()> + 'static {
        let tx = self.tx.clone();
        async move { tx.closed().await }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn text_is_chunked_and_captured() {
        let (tx, mut rx) = mpsc::channel(16);
        let mut emitter = Emitter::new(tx);

        emitter.stream_text("Hello there!").await.unwrap();
        emitter.begin_capture();
        emitter.say(" Done.").await.unwrap();
        emitter
            .send(ChatEvent::HiddenContext {
                context: "[READY_TO_RUN automation_id=\"3\" config={}]".into(),
            })
            .await
            .unwrap();

        assert_eq!(emitter.take_capture(), " Done.");
        assert!(emitter.transcript().starts_with("Hello there! Done.\n[READY_TO_RUN"));

        assert_eq!(rx.recv().await.unwrap(), "data: {\"content\":\"Hello ther\"}\n\n");
        assert_eq!(rx.recv().await.unwrap(), "data: {\"content\":\"e!\"}\n\n");
    }

    #[tokio::test]
    async fn dropped_receiver_reports_disconnect() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let mut emitter = Emitter::new(tx);
        assert!(emitter.say("hi").await.is_err());
    }
}
