//! Incremental decoder for the chat stream.
//!
//! Reads arrive in arbitrary pieces. The decoder buffers partial lines,
//! groups `data:` lines into events at each blank line and turns every
//! event into an [`SseFrame`].

use super::events::StreamEvent;

#[derive(Debug, Clone, PartialEq)]
pub enum SseFrame {
    Event(StreamEvent),
    Done,
    /// A data payload that is neither `[DONE]` nor a known envelope.
    Malformed(String),
}

#[derive(Debug, Default)]
pub struct SseDecoder {
    pending: Vec<u8>,
    data: Vec<String>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one read and collect every frame it completes.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseFrame> {
        self.pending.extend_from_slice(chunk);
        let mut frames = Vec::new();
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let mut line: Vec<u8> = self.pending.drain(..=pos).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            if let Some(frame) = self.process_line(&String::from_utf8_lossy(&line)) {
                frames.push(frame);
            }
        }
        frames
    }

    /// Flush a trailing event that was not followed by a blank line.
    pub fn finish(mut self) -> Option<SseFrame> {
        if !self.pending.is_empty() {
            let rest = std::mem::take(&mut self.pending);
            let line = String::from_utf8_lossy(&rest).into_owned();
            if let Some(frame) = self.process_line(line.trim_end_matches('\r')) {
                return Some(frame);
            }
        }
        self.dispatch()
    }

    fn process_line(&mut self, line: &str) -> Option<SseFrame> {
        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            return None;
        }
        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        if field == "data" {
            self.data.push(value.to_string());
        }
        None
    }

    fn dispatch(&mut self) -> Option<SseFrame> {
        if self.data.is_empty() {
            return None;
        }
        let payload = std::mem::take(&mut self.data).join("\n");
        if payload.trim() == "[DONE]" {
            return Some(SseFrame::Done);
        }
        Some(match serde_json::from_str::<StreamEvent>(&payload) {
            Ok(event) => SseFrame::Event(event),
            Err(_) => SseFrame::Malformed(payload),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::events::{encode_frame, ChatEvent, SearchStatus, DONE_FRAME};

    #[test]
    fn frames_split_across_reads() {
        let mut dec = SseDecoder::new();
        let wire = format!(
            "{}{}{}",
            encode_frame(&StreamEvent::content("Hello")),
            encode_frame(
                &ChatEvent::Searching {
                    status: SearchStatus::Start
                }
                .into()
            ),
            DONE_FRAME
        );
        let bytes = wire.as_bytes();
        let mut frames = dec.push(&bytes[..7]);
        assert!(frames.is_empty());
        frames.extend(dec.push(&bytes[7..30]));
        frames.extend(dec.push(&bytes[30..]));
        assert_eq!(
            frames,
            vec![
                SseFrame::Event(StreamEvent::content("Hello")),
                SseFrame::Event(
                    ChatEvent::Searching {
                        status: SearchStatus::Start
                    }
                    .into()
                ),
                SseFrame::Done,
            ]
        );
    }

    #[test]
    fn comments_crlf_and_multiline_data() {
        let mut dec = SseDecoder::new();
        let frames = dec.push(b": keep-alive\r\nevent: x\r\ndata: {\"content\":\r\ndata: \"a\"}\r\n\r\n");
        assert_eq!(frames, vec![SseFrame::Event(StreamEvent::content("a"))]);
    }

    #[test]
    fn malformed_payloads_are_reported() {
        let mut dec = SseDecoder::new();
        let frames = dec.push(b"data: not json\n\n");
        assert_eq!(frames, vec![SseFrame::Malformed("not json".into())]);
    }

    #[test]
    fn multibyte_chars_split_between_reads() {
        let mut dec = SseDecoder::new();
        let wire = encode_frame(&StreamEvent::content("✓ ok"));
        let bytes = wire.as_bytes();
        let split = wire.find('✓').unwrap() + 1;
        assert!(dec.push(&bytes[..split]).is_empty());
        assert_eq!(
            dec.push(&bytes[split..]),
            vec![SseFrame::Event(StreamEvent::content("✓ ok"))]
        );
    }

    #[test]
    fn finish_flushes_unterminated_event() {
        let mut dec = SseDecoder::new();
        assert!(dec.push(b"data: [DONE]").is_empty());
        assert_eq!(dec.finish(), Some(SseFrame::Done));
    }
}
