//! Normalized Event Codec
//!
//! The wire unit between relay and client. Each event travels as one
//! `text/event-stream` record: `data: {"content":"..."}` for a fragment, or the
//! literal `data: [DONE]` for the terminal event, followed by a blank line.

use serde::Deserialize;
use serde_json::json;

/// The payload of the terminal event.
pub const DONE_TOKEN: &str = "[DONE]";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NormalizedEvent {
    /// One fragment of assistant text.
    Content(String),
    /// The end of the turn. Sent exactly once, always last.
    Done,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("malformed event payload: {0}")]
pub struct EventDecodeError(pub String);

#[derive(Deserialize)]
#[serde(untagged)]
enum EventPayload {
    Content { content: String },
    Done { done: bool },
}

impl NormalizedEvent {
    pub fn content(text: impl Into<String>) -> Self {
        NormalizedEvent::Content(text.into())
    }

    pub fn is_done(&self) -> bool {
        matches!(self, NormalizedEvent::Done)
    }

    /// The `data:` field value of this event.
    pub fn data(&self) -> String {
        match self {
            NormalizedEvent::Content(text) => json!({ "content": text }).to_string(),
            NormalizedEvent::Done => DONE_TOKEN.to_string(),
        }
    }

    /// The complete `text/event-stream` record, including the blank-line terminator.
    pub fn to_wire(&self) -> String {
        format!("data: {}\n\n", self.data())
    }

    /// Parses a `data:` field value back into an event.
    ///
    /// Besides the `[DONE]` token, a JSON `{"done": true}` object is also read
    /// as the terminal event.
    pub fn from_data(data: &str) -> Result<Self, EventDecodeError> {
        let data = data.trim();
        if data == DONE_TOKEN {
            return Ok(NormalizedEvent::Done);
        }
        match serde_json::from_str::<EventPayload>(data) {
            Ok(EventPayload::Content { content }) => Ok(NormalizedEvent::Content(content)),
            Ok(EventPayload::Done { done: true }) => Ok(NormalizedEvent::Done),
            Ok(EventPayload::Done { done: false }) => {
                Err(EventDecodeError("`done` must be true".to_string()))
            }
            Err(e) => Err(EventDecodeError(e.to_string())),
        }
    }
}

/// Splits a `text/event-stream` byte stream into the `data` payload of each
/// complete record.
///
/// Records end at a blank line. Multiple `data:` lines in one record are joined
/// with `\n`; comment lines and other fields are ignored. Bytes after the last
/// complete line stay buffered until more input arrives.
#[derive(Debug, Default)]
pub struct EventStreamDecoder {
    carry: Vec<u8>,
    data: String,
    has_data: bool,
}

impl EventStreamDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.carry.extend_from_slice(chunk);
        let Some(last_newline) = self.carry.iter().rposition(|b| *b == b'\n') else {
            return Vec::new();
        };
        let complete: Vec<u8> = self.carry.drain(..=last_newline).collect();

        let mut records = Vec::new();
        // The final split element is the empty remainder after the last '\n'.
        let lines: Vec<&[u8]> = complete.split(|b| *b == b'\n').collect();
        for line in &lines[..lines.len() - 1] {
            let decoded = String::from_utf8_lossy(line);
            let line: &str = &decoded;
            self.process_line(line.strip_suffix('\r').unwrap_or(line), &mut records);
        }
        records
    }

    /// Dispatches a record left open when the stream ended without its blank line.
    pub fn finish(&mut self) -> Option<String> {
        let tail = std::mem::take(&mut self.carry);
        let mut records = Vec::new();
        if !tail.is_empty() {
            let decoded = String::from_utf8_lossy(&tail);
            let line: &str = &decoded;
            self.process_line(line.strip_suffix('\r').unwrap_or(line), &mut records);
        }
        self.process_line("", &mut records);
        records.pop()
    }

    fn process_line(&mut self, line: &str, records: &mut Vec<String>) {
        if line.is_empty() {
            if self.has_data {
                records.push(std::mem::take(&mut self.data));
                self.has_data = false;
            }
            return;
        }
        if line.starts_with(':') {
            return;
        }
        if let Some(value) = line.strip_prefix("data:") {
            let value = value.strip_prefix(' ').unwrap_or(value);
            if self.has_data {
                self.data.push('\n');
            }
            self.data.push_str(value);
            self.has_data = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_event_wire_format() {
        let event = NormalizedEvent::content("Olá \"aluno\"\n");
        assert_eq!(
            event.to_wire(),
            "data: {\"content\":\"Olá \\\"aluno\\\"\\n\"}\n\n"
        );
    }

    #[test]
    fn test_done_event_wire_format() {
        assert_eq!(NormalizedEvent::Done.to_wire(), "data: [DONE]\n\n");
        assert!(NormalizedEvent::Done.is_done());
    }

    #[test]
    fn test_from_data_accepts_both_terminal_forms() {
        assert_eq!(NormalizedEvent::from_data("[DONE]"), Ok(NormalizedEvent::Done));
        assert_eq!(
            NormalizedEvent::from_data(r#"{"done": true}"#),
            Ok(NormalizedEvent::Done)
        );
        assert!(NormalizedEvent::from_data(r#"{"done": false}"#).is_err());
    }

    #[test]
    fn test_from_data_rejects_malformed_payloads() {
        assert!(NormalizedEvent::from_data("{\"content\": ").is_err());
        assert!(NormalizedEvent::from_data(r#"{"text": "x"}"#).is_err());
        assert!(NormalizedEvent::from_data(r#"{"content": 5}"#).is_err());
    }

    #[test]
    fn test_stream_decoder_reassembles_split_records() {
        let wire = format!(
            "{}{}{}",
            NormalizedEvent::content("Olá").to_wire(),
            NormalizedEvent::content(" tudo bem?").to_wire(),
            NormalizedEvent::Done.to_wire()
        );
        let bytes = wire.as_bytes();
        for split in 0..=bytes.len() {
            let mut decoder = EventStreamDecoder::new();
            let mut records = decoder.push(&bytes[..split]);
            records.extend(decoder.push(&bytes[split..]));
            assert_eq!(
                records,
                vec![
                    "{\"content\":\"Olá\"}",
                    "{\"content\":\" tudo bem?\"}",
                    "[DONE]"
                ],
                "split at byte {split}"
            );
        }
    }

    #[test]
    fn test_stream_decoder_handles_crlf_comments_and_multiline_data() {
        let mut decoder = EventStreamDecoder::new();
        let records =
            decoder.push(b": keep-alive\r\n\r\nevent: message\r\ndata: a\r\ndata: b\r\n\r\n");
        assert_eq!(records, vec!["a\nb"]);
    }

    #[test]
    fn test_stream_decoder_finish_flushes_open_record() {
        let mut decoder = EventStreamDecoder::new();
        assert!(decoder.push(b"data: [DONE]").is_empty());
        assert_eq!(decoder.finish(), Some("[DONE]".to_string()));
        assert_eq!(decoder.finish(), None);
    }
}
